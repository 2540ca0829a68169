//! Invocation log codec.
//!
//! One log records one command's full, unfiltered, untruncated execution so
//! it can be replayed and re-filtered later without re-running the command.
//! The format is line-oriented on purpose: the same Unix tools the sandbox
//! exposes can grep it.
//!
//! There is no escaping for stdout/stderr content that itself contains the
//! literal marker lines; such content breaks the round-trip guarantee. That
//! ambiguity is inherited from the format and left as-is.

use chrono::{SecondsFormat, Utc};

use cellbox_core::{Error, Result};

/// Line opening the stdout section.
pub const STDOUT_MARKER: &str = "---STDOUT---";
/// Line opening the stderr section.
pub const STDERR_MARKER: &str = "---STDERR---";
/// File extension marking a file as an invocation log.
pub const LOG_EXTENSION: &str = "invocation";

/// Replayable record of one command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationLog {
    /// ISO-8601 timestamp of the invocation.
    pub timestamp: String,
    /// Raw command text as executed.
    pub command: String,
    /// Exit code of the command.
    pub exit_code: i64,
    /// Full stdout, verbatim.
    pub stdout: String,
    /// Full stderr, verbatim.
    pub stderr: String,
    /// Output filter applied at invocation time, if any.
    pub output_filter: Option<String>,
}

impl InvocationLog {
    /// Current ISO-8601 timestamp.
    pub fn timestamp_now() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Log file name for a timestamp: colons replaced to stay
    /// filesystem-safe, `.invocation` extension.
    pub fn file_name(timestamp: &str) -> String {
        format!("{}.{}", timestamp.replace(':', "-"), LOG_EXTENSION)
    }

    /// Serialize to the line-oriented text format. Deterministic; the
    /// `outputFilter` header is omitted entirely when unset.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# timestamp: {}\n", self.timestamp));
        out.push_str(&format!("# command: {}\n", self.command));
        out.push_str(&format!("# exitCode: {}\n", self.exit_code));
        if let Some(filter) = &self.output_filter {
            out.push_str(&format!("# outputFilter: {filter}\n"));
        }
        out.push_str(STDOUT_MARKER);
        out.push('\n');
        out.push_str(&self.stdout);
        out.push('\n');
        out.push_str(STDERR_MARKER);
        out.push('\n');
        out.push_str(&self.stderr);
        out
    }

    /// Parse the text format. Header lines may appear in any order; a
    /// missing section marker is a hard failure, since a log without its
    /// markers cannot be told apart from unrelated text.
    pub fn decode(text: &str) -> Result<Self> {
        let stdout_open = format!("{STDOUT_MARKER}\n");
        let header_end = if text.starts_with(&stdout_open) {
            0
        } else {
            text.find(&format!("\n{stdout_open}"))
                .map(|i| i + 1)
                .ok_or_else(|| Error::log_format(format!("missing {STDOUT_MARKER} marker")))?
        };

        let body_start = header_end + stdout_open.len();
        let stderr_sep = format!("\n{STDERR_MARKER}\n");
        let sep = text[body_start..]
            .find(&stderr_sep)
            .map(|i| body_start + i)
            .ok_or_else(|| Error::log_format(format!("missing {STDERR_MARKER} marker")))?;

        let stdout = text[body_start..sep].to_string();
        let stderr = text[sep + stderr_sep.len()..].to_string();

        let mut timestamp = None;
        let mut command = None;
        let mut exit_code = None;
        let mut output_filter = None;
        for line in text[..header_end].lines() {
            if let Some(rest) = line.strip_prefix("# timestamp: ") {
                timestamp = Some(rest.to_string());
            } else if let Some(rest) = line.strip_prefix("# command: ") {
                command = Some(rest.to_string());
            } else if let Some(rest) = line.strip_prefix("# exitCode: ") {
                let code = rest
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| Error::log_format(format!("invalid exitCode `{rest}`")))?;
                exit_code = Some(code);
            } else if let Some(rest) = line.strip_prefix("# outputFilter: ") {
                output_filter = Some(rest.to_string());
            }
        }

        Ok(Self {
            timestamp: timestamp.ok_or_else(|| Error::log_format("missing timestamp header"))?,
            command: command.ok_or_else(|| Error::log_format("missing command header"))?,
            exit_code: exit_code.ok_or_else(|| Error::log_format("missing exitCode header"))?,
            stdout,
            stderr,
            output_filter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InvocationLog {
        InvocationLog {
            timestamp: "2026-08-07T10:30:00.123Z".into(),
            command: "ls -la /workspace".into(),
            exit_code: 0,
            stdout: "total 4\nfile.txt\n".into(),
            stderr: String::new(),
            output_filter: None,
        }
    }

    #[test]
    fn test_round_trip_without_filter() {
        let log = sample();
        let encoded = log.encode();
        assert!(!encoded.contains("outputFilter"));
        assert_eq!(InvocationLog::decode(&encoded).unwrap(), log);
    }

    #[test]
    fn test_round_trip_with_filter_and_failure() {
        let log = InvocationLog {
            command: "cat data.csv".into(),
            exit_code: 2,
            stdout: String::new(),
            stderr: "cat: data.csv: No such file or directory".into(),
            output_filter: Some("head -5".into()),
            ..sample()
        };
        assert_eq!(InvocationLog::decode(&log.encode()).unwrap(), log);
    }

    #[test]
    fn test_headers_tolerate_reordering() {
        let text = format!(
            "# exitCode: 7\n# command: make test\n# timestamp: 2026-01-01T00:00:00Z\n{STDOUT_MARKER}\nok\n{STDERR_MARKER}\n"
        );
        let log = InvocationLog::decode(&text).unwrap();
        assert_eq!(log.exit_code, 7);
        assert_eq!(log.command, "make test");
        assert_eq!(log.stdout, "ok");
        assert_eq!(log.stderr, "");
    }

    #[test]
    fn test_missing_markers_are_hard_failures() {
        let no_stdout = "# timestamp: t\n# command: c\n# exitCode: 0\noops\n";
        assert!(matches!(
            InvocationLog::decode(no_stdout),
            Err(cellbox_core::Error::LogFormat(_))
        ));

        let no_stderr =
            format!("# timestamp: t\n# command: c\n# exitCode: 0\n{STDOUT_MARKER}\nout\n");
        assert!(matches!(
            InvocationLog::decode(&no_stderr),
            Err(cellbox_core::Error::LogFormat(_))
        ));
    }

    #[test]
    fn test_empty_sections_survive_round_trip() {
        let log = InvocationLog {
            stdout: String::new(),
            stderr: String::new(),
            ..sample()
        };
        let decoded = InvocationLog::decode(&log.encode()).unwrap();
        assert_eq!(decoded.stdout, "");
        assert_eq!(decoded.stderr, "");
    }

    #[test]
    fn test_file_name_is_filesystem_safe() {
        let name = InvocationLog::file_name("2026-08-07T10:30:00.123Z");
        assert_eq!(name, "2026-08-07T10-30-00.123Z.invocation");
        assert!(!name.contains(':'));
    }
}
