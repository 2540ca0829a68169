//! Command execution pipeline.
//!
//! One linear flow per invocation: before-hook, working-directory
//! injection, execution (direct, or through a generated filter script that
//! keeps unfiltered output on the backend), truncation, after-hook,
//! response assembly.

use std::sync::Arc;
use std::time::Duration;

use cellbox_core::{path, Error, Result};
use cellbox_sandbox::{CommandResult, FileEntry, Sandbox};

use crate::invocation::InvocationLog;
use crate::script::{self, FilterScript, FilterScriptLog};

/// Before-hook: may substitute the command to actually run. `None` proceeds
/// with the original.
pub type BeforeHook = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// After-hook: observes the already-truncated result and may substitute a
/// replacement. `None` proceeds unchanged.
pub type AfterHook = Arc<dyn Fn(&str, &CommandResult) -> Option<CommandResult> + Send + Sync>;

/// Result returned to callers. The invocation log path is present iff
/// logging was enabled for the call.
#[derive(Debug, Clone)]
pub struct ExecResponse {
    /// Possibly filtered, possibly truncated stdout.
    pub stdout: String,
    /// Possibly truncated stderr.
    pub stderr: String,
    /// Exit code: the filter's when a filter failed, the command's
    /// otherwise.
    pub exit_code: i64,
    /// Path of the persisted invocation log, when logging was enabled.
    pub invocation_log_path: Option<String>,
}

/// Pipeline configuration, fixed per toolkit instance.
pub struct PipelineConfig {
    /// Working directory injected into every command.
    pub destination: String,
    /// Per-stream truncation limit in characters; 0 disables truncation.
    pub max_output_length: usize,
    /// Whether to persist an invocation log per command.
    pub log_invocations: bool,
    /// Log directory, relative to the destination unless absolute.
    pub invocation_log_dir: String,
    /// Caller-level timeout wrapping each backend call.
    pub command_timeout: Option<Duration>,
    /// Optional command-substitution hook.
    pub before_command: Option<BeforeHook>,
    /// Optional result-substitution hook.
    pub after_command: Option<AfterHook>,
}

/// Executes commands against one sandbox under one destination.
pub struct CommandPipeline {
    sandbox: Arc<dyn Sandbox>,
    config: PipelineConfig,
}

impl CommandPipeline {
    /// Create a pipeline over a shared sandbox.
    pub fn new(sandbox: Arc<dyn Sandbox>, config: PipelineConfig) -> Self {
        Self { sandbox, config }
    }

    /// The destination every command runs under.
    pub fn destination(&self) -> &str {
        &self.config.destination
    }

    /// Run one command, optionally filtering its stdout on the backend.
    pub async fn run(&self, command: &str, output_filter: Option<&str>) -> Result<ExecResponse> {
        let command = match &self.config.before_command {
            Some(hook) => hook(command).unwrap_or_else(|| command.to_string()),
            None => command.to_string(),
        };

        let log = self.config.log_invocations.then(|| {
            let timestamp = InvocationLog::timestamp_now();
            let dir = path::resolve(&self.config.destination, &self.config.invocation_log_dir);
            let file = InvocationLog::file_name(&timestamp);
            let log_path = path::join(&[dir.as_str(), file.as_str()]);
            (timestamp, dir, log_path)
        });

        tracing::debug!(
            command = %command,
            filtered = output_filter.is_some(),
            "executing sandbox command"
        );

        let result = match output_filter {
            None => {
                let effective = script::direct_command(&self.config.destination, &command);
                let result = self.execute(&effective).await?;
                if let Some((timestamp, _, log_path)) = &log {
                    let record = InvocationLog {
                        timestamp: timestamp.clone(),
                        command: command.clone(),
                        exit_code: result.exit_code,
                        stdout: result.stdout.clone(),
                        stderr: result.stderr.clone(),
                        output_filter: None,
                    };
                    self.sandbox
                        .write_files(&[FileEntry::text(log_path.clone(), &record.encode())])
                        .await?;
                }
                result
            }
            Some(filter) => {
                // The backend does the filtering; the full output never
                // reaches this process.
                let script = FilterScript {
                    destination: &self.config.destination,
                    command: &command,
                    filter,
                    log: log.as_ref().map(|(timestamp, dir, log_path)| FilterScriptLog {
                        timestamp: timestamp.as_str(),
                        log_dir: dir.as_str(),
                        log_path: log_path.as_str(),
                    }),
                }
                .render();
                self.execute(&script).await?
            }
        };

        let result = CommandResult {
            stdout: truncate_output(&result.stdout, self.config.max_output_length),
            stderr: truncate_output(&result.stderr, self.config.max_output_length),
            exit_code: result.exit_code,
        };

        let result = match &self.config.after_command {
            Some(hook) => hook(&command, &result).unwrap_or(result),
            None => result,
        };

        Ok(ExecResponse {
            stdout: result.stdout,
            stderr: result.stderr,
            exit_code: result.exit_code,
            invocation_log_path: log.map(|(_, _, log_path)| log_path),
        })
    }

    async fn execute(&self, command: &str) -> Result<CommandResult> {
        match self.config.command_timeout {
            Some(limit) => tokio::time::timeout(limit, self.sandbox.execute_command(command))
                .await
                .map_err(|_| {
                    Error::timeout(format!("command did not finish within {limit:?}"))
                })?,
            None => self.sandbox.execute_command(command).await,
        }
    }
}

/// Cap a stream at `limit` characters, keeping the head and appending a
/// notice naming how many characters were removed. Output at exactly the
/// limit is returned unchanged; 0 disables the cap.
pub fn truncate_output(text: &str, limit: usize) -> String {
    if limit == 0 {
        return text.to_string();
    }
    let total = text.chars().count();
    if total <= limit {
        return text.to_string();
    }
    let head: String = text.chars().take(limit).collect();
    format!("{head}\n\n[output truncated: {} characters removed]", total - limit)
}
