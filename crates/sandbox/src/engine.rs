//! The `Sandbox` contract and backend classification.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use cellbox_core::{Error, Result};

use crate::overlay::VirtualSandbox;
use crate::remote::RemoteSandbox;

/// Shell interpreter every backend is assumed to provide.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Default working directory and upload prefix for backends that do not
/// supply their own (the virtual backend supplies its mount point instead).
pub const DEFAULT_DESTINATION: &str = "/workspace";

// =============================================================================
// Contract Types
// =============================================================================

/// Result of executing one command in a sandbox.
///
/// Immutable once produced. Transformations downstream (truncation,
/// filtering) build new values rather than mutating this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Exit code of the command (0 = success on every backend).
    pub exit_code: i64,
}

impl CommandResult {
    /// Whether the command exited successfully.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One file bound for a sandbox, identified by its path.
///
/// Content is opaque bytes. Text becomes UTF-8 bytes at construction time;
/// content that is already binary passes through unchanged.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Destination path (joined against the toolkit destination upstream).
    pub path: String,
    /// Raw file content.
    pub content: Vec<u8>,
}

impl FileEntry {
    /// Create an entry from raw bytes.
    pub fn new(path: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            content,
        }
    }

    /// Create an entry from text, encoding it as UTF-8.
    pub fn text(path: impl Into<String>, text: &str) -> Self {
        Self {
            path: path.into(),
            content: text.as_bytes().to_vec(),
        }
    }
}

// =============================================================================
// Sandbox Contract
// =============================================================================

/// The three-operation execution backend contract.
///
/// Every operation is asynchronous; callers await completion before issuing a
/// dependent operation. An operation that cannot complete surfaces as a typed
/// error carrying the operation name and target; backends never substitute
/// empty results for failures.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Run a shell command and capture its output and exit code.
    async fn execute_command(&self, command: &str) -> Result<CommandResult>;

    /// Read a file's bytes. A missing file is [`Error::NotFound`], which is
    /// distinguishable from a file that exists but is empty.
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Write a batch of files. All members of the batch are written before
    /// the call returns; ordering within the batch is unspecified.
    async fn write_files(&self, files: &[FileEntry]) -> Result<()>;
}

// =============================================================================
// Backend Classification
// =============================================================================

/// Which shape a backend was classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    /// Network-addressable machine with a stable identifier and a generic
    /// command runner.
    Remote,
    /// In-process scratch filesystem with a host shell.
    Virtual,
    /// Caller-supplied object already conforming to [`Sandbox`].
    Custom,
}

/// An execution backend handed to a toolkit.
///
/// The source system classified backends structurally, checking the remote
/// signature (stable machine identifier + generic command runner + file
/// read/write-batch) before the virtual one (a single execute entry point)
/// and treating anything else as already conforming to the contract. In a
/// statically typed host that priority chain becomes this tagged enum: a
/// value that could satisfy both native shapes must be constructed as
/// [`Backend::Remote`], and [`Backend::Custom`] is never re-classified even
/// when it wraps a native backend.
pub enum Backend {
    /// Remote container-backed sandbox.
    Remote(RemoteSandbox),
    /// Local scratch-directory sandbox.
    Virtual(VirtualSandbox),
    /// Caller-supplied implementation.
    Custom(Arc<dyn Sandbox>),
}

impl Backend {
    /// The shape this backend was classified as.
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Remote(_) => BackendKind::Remote,
            Backend::Virtual(_) => BackendKind::Virtual,
            Backend::Custom(_) => BackendKind::Custom,
        }
    }

    /// Default destination when the caller does not configure one. The
    /// virtual backend's default is its own mount point, not the generic
    /// workspace path.
    pub fn default_destination(&self) -> String {
        match self {
            Backend::Virtual(sandbox) => sandbox.mount_point().to_string_lossy().into_owned(),
            Backend::Remote(_) | Backend::Custom(_) => DEFAULT_DESTINATION.to_string(),
        }
    }
}

impl From<RemoteSandbox> for Backend {
    fn from(sandbox: RemoteSandbox) -> Self {
        Backend::Remote(sandbox)
    }
}

impl From<VirtualSandbox> for Backend {
    fn from(sandbox: VirtualSandbox) -> Self {
        Backend::Virtual(sandbox)
    }
}

impl From<Arc<dyn Sandbox>> for Backend {
    fn from(sandbox: Arc<dyn Sandbox>) -> Self {
        Backend::Custom(sandbox)
    }
}

#[async_trait]
impl Sandbox for Backend {
    async fn execute_command(&self, command: &str) -> Result<CommandResult> {
        match self {
            Backend::Remote(sandbox) => sandbox.execute_command(command).await,
            Backend::Virtual(sandbox) => sandbox.execute_command(command).await,
            Backend::Custom(sandbox) => sandbox.execute_command(command).await,
        }
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        match self {
            Backend::Remote(sandbox) => sandbox.read_file(path).await,
            Backend::Virtual(sandbox) => sandbox.read_file(path).await,
            Backend::Custom(sandbox) => sandbox.read_file(path).await,
        }
    }

    async fn write_files(&self, files: &[FileEntry]) -> Result<()> {
        match self {
            Backend::Remote(sandbox) => sandbox.write_files(files).await,
            Backend::Virtual(sandbox) => sandbox.write_files(files).await,
            Backend::Custom(sandbox) => sandbox.write_files(files).await,
        }
    }
}

// =============================================================================
// Mock Sandbox (for deterministic tests)
// =============================================================================

/// In-memory scripted sandbox for unit testing.
///
/// Pops one canned [`CommandResult`] per `execute_command` call and records
/// every command and every write batch size, so tests can assert on the
/// exact traffic a pipeline generated.
#[derive(Default)]
pub struct MockSandbox {
    responses: tokio::sync::Mutex<Vec<CommandResult>>,
    files: tokio::sync::Mutex<HashMap<String, Vec<u8>>>,
    commands: tokio::sync::Mutex<Vec<String>>,
    write_batches: tokio::sync::Mutex<Vec<usize>>,
}

impl MockSandbox {
    /// Create a mock with predefined exec responses, consumed in order.
    pub fn new(responses: Vec<CommandResult>) -> Self {
        Self {
            responses: tokio::sync::Mutex::new(responses),
            ..Default::default()
        }
    }

    /// Every command executed so far, in order.
    pub async fn commands(&self) -> Vec<String> {
        self.commands.lock().await.clone()
    }

    /// The size of each write batch issued so far, in order.
    pub async fn write_batch_sizes(&self) -> Vec<usize> {
        self.write_batches.lock().await.clone()
    }

    /// Look up a file previously written into the mock.
    pub async fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().await.get(path).cloned()
    }

    /// Seed a file without going through `write_files`.
    pub async fn insert_file(&self, path: impl Into<String>, content: Vec<u8>) {
        self.files.lock().await.insert(path.into(), content);
    }
}

#[async_trait]
impl Sandbox for MockSandbox {
    async fn execute_command(&self, command: &str) -> Result<CommandResult> {
        self.commands.lock().await.push(command.to_string());
        let mut responses = self.responses.lock().await;
        if responses.is_empty() {
            Ok(CommandResult {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
            })
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.files
            .lock()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| Error::not_found(path))
    }

    async fn write_files(&self, files: &[FileEntry]) -> Result<()> {
        self.write_batches.lock().await.push(files.len());
        let mut map = self.files.lock().await;
        for entry in files {
            map.insert(entry.path.clone(), entry.content.clone());
        }
        Ok(())
    }
}
