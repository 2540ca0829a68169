//! Shell command and script construction.
//!
//! Everything interpolated into a quoted position goes through [`quote`];
//! building these strings is injection-sensitive, so the construction is
//! kept free of I/O and unit-tested as plain text.

use crate::invocation::{STDERR_MARKER, STDOUT_MARKER};

/// Single-quote `text` for a POSIX shell, escaping embedded quotes.
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "'\\''"))
}

/// The effective form of a direct (unfiltered) command: the destination is
/// always injected as the working directory.
pub fn direct_command(destination: &str, command: &str) -> String {
    format!("cd {} && {}", quote(destination), command)
}

/// Command extracting the stdout section of an invocation log on the
/// backend itself, optionally piped straight into an output filter.
pub fn extract_stdout_command(log_path: &str, filter: Option<&str>) -> String {
    let extract = format!(
        "sed -n '/^{STDOUT_MARKER}$/,/^{STDERR_MARKER}$/p' {} | sed '1d;$d'",
        quote(log_path)
    );
    match filter {
        Some(filter) => format!("{extract} | {filter}"),
        None => extract,
    }
}

/// Command streaming a regular file through an output filter on the backend.
pub fn filtered_read_command(path: &str, filter: &str) -> String {
    format!("cat {} | {}", quote(path), filter)
}

/// Invocation log parameters for a [`FilterScript`].
pub struct FilterScriptLog<'a> {
    /// ISO-8601 timestamp recorded in the log header.
    pub timestamp: &'a str,
    /// Absolute log directory, created if missing.
    pub log_dir: &'a str,
    /// Absolute log file path.
    pub log_path: &'a str,
}

/// A combined script that runs a command and filters its stdout entirely on
/// the backend, so unfiltered output never crosses back to the caller.
///
/// The script redirects the command's streams to temp files, captures its
/// exit code, writes the invocation log in one pass when asked to, pipes the
/// stdout temp file through the filter as its own stdout, re-emits the
/// original stderr followed by the filter's stderr, removes the temp files,
/// and exits with the filter's code when the filter failed, the command's
/// otherwise.
pub struct FilterScript<'a> {
    /// Working directory injected before the command runs.
    pub destination: &'a str,
    /// Raw command text.
    pub command: &'a str,
    /// Filter pipeline applied to the command's stdout.
    pub filter: &'a str,
    /// Invocation log parameters, when logging is enabled.
    pub log: Option<FilterScriptLog<'a>>,
}

impl FilterScript<'_> {
    /// Render the script text.
    pub fn render(&self) -> String {
        let mut script = String::new();
        script.push_str("__cb_out=$(mktemp)\n");
        script.push_str("__cb_err=$(mktemp)\n");
        script.push_str("__cb_ferr=$(mktemp)\n");
        script.push_str(&format!(
            "cd {} && ( {} ) >\"$__cb_out\" 2>\"$__cb_err\"\n",
            quote(self.destination),
            self.command
        ));
        script.push_str("__cb_code=$?\n");

        if let Some(log) = &self.log {
            script.push_str(&format!("mkdir -p {}\n", quote(log.log_dir)));
            script.push_str("{\n");
            script.push_str(&format!(
                "  printf '%s\\n' {}\n",
                quote(&format!("# timestamp: {}", log.timestamp))
            ));
            script.push_str(&format!(
                "  printf '%s\\n' {}\n",
                quote(&format!("# command: {}", self.command))
            ));
            script.push_str("  printf '# exitCode: %s\\n' \"$__cb_code\"\n");
            script.push_str(&format!(
                "  printf '%s\\n' {}\n",
                quote(&format!("# outputFilter: {}", self.filter))
            ));
            script.push_str(&format!("  printf '%s\\n' {}\n", quote(STDOUT_MARKER)));
            script.push_str("  cat \"$__cb_out\"\n");
            script.push_str(&format!("  printf '\\n%s\\n' {}\n", quote(STDERR_MARKER)));
            script.push_str("  cat \"$__cb_err\"\n");
            script.push_str(&format!("}} > {}\n", quote(log.log_path)));
        }

        script.push_str(&format!(
            "cat \"$__cb_out\" | {{ {} ; }} 2>\"$__cb_ferr\"\n",
            self.filter
        ));
        script.push_str("__cb_filter_code=$?\n");
        script.push_str("cat \"$__cb_err\" >&2\n");
        script.push_str("cat \"$__cb_ferr\" >&2\n");
        script.push_str("rm -f \"$__cb_out\" \"$__cb_err\" \"$__cb_ferr\"\n");
        script.push_str("if [ \"$__cb_filter_code\" -ne 0 ]; then\n");
        script.push_str("  exit \"$__cb_filter_code\"\n");
        script.push_str("fi\n");
        script.push_str("exit \"$__cb_code\"\n");
        script
    }
}
