//! Toolkit orchestration.
//!
//! A `Toolkit` fixes one destination over one backend, populates the
//! sandbox from the configured file sources, and answers repeated
//! command/read/write requests through the pipeline and accessors.

use std::sync::Arc;
use std::time::Duration;

use cellbox_core::{path, Error, Result};
use cellbox_sandbox::{Backend, FileEntry, Sandbox};

use crate::ingest::{self, IngestSources};
use crate::invocation::{InvocationLog, LOG_EXTENSION};
use crate::pipeline::{AfterHook, BeforeHook, CommandPipeline, ExecResponse, PipelineConfig};
use crate::script;

/// Files per batched write. A transport concern only: batch boundaries
/// never affect ingestion ordering or precedence.
pub const WRITE_BATCH_SIZE: usize = 20;

/// Default cap on the number of uploaded files.
pub const DEFAULT_MAX_FILES: usize = 1000;

/// Default per-stream output cap in characters.
pub const DEFAULT_MAX_OUTPUT_LENGTH: usize = 30_000;

/// Default invocation log directory under the destination.
pub const DEFAULT_LOG_DIR: &str = ".invocations";

/// Toolkit configuration.
pub struct ToolkitOptions {
    /// Upload prefix and command working directory. Defaults to the
    /// backend's own default when unset.
    pub destination: Option<String>,
    /// Files to upload before the first command runs.
    pub sources: IngestSources,
    /// Per-stream output cap in characters; 0 disables truncation.
    pub max_output_length: usize,
    /// Maximum upload file count; 0 disables the check.
    pub max_files: usize,
    /// Persist an invocation log per executed command.
    pub log_invocations: bool,
    /// Invocation log directory, resolved against the destination.
    pub invocation_log_dir: String,
    /// Caller-level timeout wrapping each backend call.
    pub command_timeout: Option<Duration>,
    /// Optional command-substitution hook.
    pub before_command: Option<BeforeHook>,
    /// Optional result-substitution hook.
    pub after_command: Option<AfterHook>,
}

impl Default for ToolkitOptions {
    fn default() -> Self {
        Self {
            destination: None,
            sources: IngestSources::default(),
            max_output_length: DEFAULT_MAX_OUTPUT_LENGTH,
            max_files: DEFAULT_MAX_FILES,
            log_invocations: false,
            invocation_log_dir: DEFAULT_LOG_DIR.to_string(),
            command_timeout: None,
            before_command: None,
            after_command: None,
        }
    }
}

/// One destination over one backend, ready to serve requests.
pub struct Toolkit {
    sandbox: Arc<dyn Sandbox>,
    pipeline: CommandPipeline,
    destination: String,
}

impl std::fmt::Debug for Toolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolkit")
            .field("destination", &self.destination)
            .finish_non_exhaustive()
    }
}

impl Toolkit {
    /// Resolve configuration, populate the sandbox, and wire the pipeline.
    /// Fails before any write when the upload exceeds `max_files`.
    pub async fn new(backend: impl Into<Backend>, options: ToolkitOptions) -> Result<Self> {
        let backend = backend.into();
        let destination = match &options.destination {
            Some(dest) => path::normalize(dest),
            None => backend.default_destination(),
        };
        if !destination.starts_with('/') {
            return Err(Error::configuration(format!(
                "destination must be an absolute path, got `{destination}`"
            )));
        }

        let sandbox: Arc<dyn Sandbox> = Arc::new(backend);
        populate(sandbox.as_ref(), &destination, &options.sources, options.max_files).await?;

        let pipeline = CommandPipeline::new(
            sandbox.clone(),
            PipelineConfig {
                destination: destination.clone(),
                max_output_length: options.max_output_length,
                log_invocations: options.log_invocations,
                invocation_log_dir: options.invocation_log_dir,
                command_timeout: options.command_timeout,
                before_command: options.before_command,
                after_command: options.after_command,
            },
        );

        tracing::info!(destination = %destination, "toolkit ready");
        Ok(Self {
            sandbox,
            pipeline,
            destination,
        })
    }

    /// The fixed destination of this toolkit.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Shared handle to the underlying sandbox.
    pub fn sandbox(&self) -> Arc<dyn Sandbox> {
        self.sandbox.clone()
    }

    /// Execute a command through the pipeline.
    pub async fn run_command(
        &self,
        command: &str,
        output_filter: Option<&str>,
    ) -> Result<ExecResponse> {
        self.pipeline.run(command, output_filter).await
    }

    /// Read a file, resolved against the destination. Invocation logs yield
    /// only their stdout section; an optional filter streams through the
    /// backend exactly as it does for command execution.
    pub async fn read_file(
        &self,
        file_path: &str,
        output_filter: Option<&str>,
    ) -> Result<String> {
        let target = path::resolve(&self.destination, file_path);
        if target.ends_with(&format!(".{LOG_EXTENSION}")) {
            return self.read_invocation_log(&target, output_filter).await;
        }

        match output_filter {
            Some(filter) => {
                let command = script::filtered_read_command(&target, filter);
                let result = self.sandbox.execute_command(&command).await?;
                if result.success() {
                    Ok(result.stdout)
                } else {
                    Err(Error::backend("read", target, result.stderr.trim_end()))
                }
            }
            None => {
                let bytes = self.sandbox.read_file(&target).await?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
        }
    }

    /// Write text to a file resolved against the destination.
    pub async fn write_file(&self, file_path: &str, content: &str) -> Result<()> {
        let target = path::resolve(&self.destination, file_path);
        self.sandbox
            .write_files(&[FileEntry::text(target, content)])
            .await
    }

    /// Extract an invocation log's stdout section, preferring the backend's
    /// own text tools and falling back to an in-process decode. A malformed
    /// log degrades to its raw content.
    async fn read_invocation_log(
        &self,
        target: &str,
        output_filter: Option<&str>,
    ) -> Result<String> {
        let command = script::extract_stdout_command(target, output_filter);
        if let Ok(result) = self.sandbox.execute_command(&command).await {
            if result.success() {
                return Ok(result.stdout);
            }
        }

        let bytes = self.sandbox.read_file(target).await?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let stdout = match InvocationLog::decode(&text) {
            Ok(log) => log.stdout,
            Err(_) => return Ok(text),
        };

        match output_filter {
            Some(filter) => {
                let command = format!("printf '%s' {} | {}", script::quote(&stdout), filter);
                let result = self.sandbox.execute_command(&command).await?;
                if result.success() {
                    Ok(result.stdout)
                } else {
                    Err(Error::backend("filter", target.to_string(), result.stderr.trim_end()))
                }
            }
            None => Ok(stdout),
        }
    }
}

async fn populate(
    sandbox: &dyn Sandbox,
    destination: &str,
    sources: &IngestSources,
    max_files: usize,
) -> Result<()> {
    if sources.is_empty() {
        return Ok(());
    }

    let planned = ingest::plan(sources)?;
    if max_files > 0 && planned.len() > max_files {
        return Err(Error::TooManyFiles {
            count: planned.len(),
            limit: max_files,
        });
    }

    for chunk in planned.chunks(WRITE_BATCH_SIZE) {
        let mut batch = Vec::with_capacity(chunk.len());
        for file in chunk {
            batch.push(ingest::load(destination, file).await?);
        }
        sandbox.write_files(&batch).await?;
    }

    tracing::debug!(files = planned.len(), destination = %destination, "sandbox populated");
    Ok(())
}
