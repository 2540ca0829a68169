//! Sandbox tools implementing the `Tool` trait.
//!
//! These wrappers turn a shared [`Toolkit`] into callable agent tools:
//! execute a command, read a file, write a file, each with the optional
//! output filter the pipeline supports.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use cellbox_core::{Error, Result, Tool, ToolOutput};

use crate::toolkit::Toolkit;

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::configuration(format!("{key} is required")))
}

// =============================================================================
// Run Command Tool
// =============================================================================

/// Tool executing a shell command inside the sandbox.
pub struct RunCommandTool {
    toolkit: Arc<Toolkit>,
}

impl RunCommandTool {
    /// Create a new run-command tool.
    pub fn new(toolkit: Arc<Toolkit>) -> Self {
        Self { toolkit }
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command inside the isolated sandbox. Commands run \
         in the sandbox working directory. An optional output_filter shell \
         pipeline bounds how much stdout is returned; the full output stays \
         recoverable from the invocation log when logging is enabled."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "output_filter": {
                    "type": "string",
                    "description": "Optional shell pipeline applied to stdout on the backend (e.g. 'tail -20')"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let command = required_str(&args, "command")?;
        let filter = args.get("output_filter").and_then(|v| v.as_str());

        let response = self.toolkit.run_command(command, filter).await?;

        let mut output = String::new();
        if !response.stdout.is_empty() {
            output.push_str(&response.stdout);
        }
        if !response.stderr.is_empty() {
            if !output.is_empty() {
                output.push_str("\n--- stderr ---\n");
            }
            output.push_str(&response.stderr);
        }
        if output.is_empty() {
            output = format!("Command completed with exit code {}", response.exit_code);
        }

        let data = json!({
            "exit_code": response.exit_code,
            "invocation_log_path": response.invocation_log_path,
        });

        if response.exit_code == 0 {
            Ok(ToolOutput::text(output).with_data(data))
        } else {
            Ok(ToolOutput::error(format!(
                "Command failed (exit code {}):\n{}",
                response.exit_code, output
            ))
            .with_data(data))
        }
    }
}

// =============================================================================
// Read File Tool
// =============================================================================

/// Tool reading a file from the sandbox.
pub struct ReadFileTool {
    toolkit: Arc<Toolkit>,
}

impl ReadFileTool {
    /// Create a new read-file tool.
    pub fn new(toolkit: Arc<Toolkit>) -> Self {
        Self { toolkit }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file from the sandbox. Paths resolve against the sandbox \
         working directory. Invocation log files yield the recorded stdout, \
         which an optional output_filter can re-filter without re-running \
         the command."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path, relative to the working directory or absolute"
                },
                "output_filter": {
                    "type": "string",
                    "description": "Optional shell pipeline applied to the content on the backend"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let path = required_str(&args, "path")?;
        let filter = args.get("output_filter").and_then(|v| v.as_str());

        let content = self.toolkit.read_file(path, filter).await?;
        Ok(ToolOutput::text(content))
    }
}

// =============================================================================
// Write File Tool
// =============================================================================

/// Tool writing a file into the sandbox.
pub struct WriteFileTool {
    toolkit: Arc<Toolkit>,
}

impl WriteFileTool {
    /// Create a new write-file tool.
    pub fn new(toolkit: Arc<Toolkit>) -> Self {
        Self { toolkit }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write text content to a file in the sandbox. Paths resolve against \
         the sandbox working directory."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path, relative to the working directory or absolute"
                },
                "content": {
                    "type": "string",
                    "description": "The file content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let path = required_str(&args, "path")?;
        let content = required_str(&args, "content")?;

        self.toolkit.write_file(path, content).await?;
        Ok(ToolOutput::text(format!(
            "File written: {} ({} bytes)",
            path,
            content.len()
        )))
    }
}
