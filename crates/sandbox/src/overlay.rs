//! Local sandbox backed by a private scratch directory.
//!
//! Commands run through the host `/bin/sh` with the scratch root as working
//! directory; the scratch directory is the backend's mount point and is
//! removed when the sandbox is dropped. In overlay mode the scratch is
//! seeded from a real directory, reads fall through to that directory for
//! paths the scratch does not hold, and sandbox writes land only in the
//! scratch, so the source directory is never mutated.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

use cellbox_core::{Error, Result};

use crate::engine::{CommandResult, FileEntry, Sandbox, DEFAULT_SHELL};

/// Directory names skipped when scanning a real directory tree: version
/// control metadata and dependency caches.
pub const EXCLUDED_SCAN_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "__pycache__",
    ".venv",
];

/// Hermetic local sandbox: a scratch mount point plus the host shell.
pub struct VirtualSandbox {
    scratch: TempDir,
    source: Option<PathBuf>,
    shell: String,
}

impl VirtualSandbox {
    /// Create an empty sandbox.
    pub fn new() -> Result<Self> {
        let scratch = TempDir::new()?;
        tracing::debug!(mount = %scratch.path().display(), "virtual sandbox created");
        Ok(Self {
            scratch,
            source: None,
            shell: DEFAULT_SHELL.to_string(),
        })
    }

    /// Create a sandbox seeded with the given files, paths taken relative to
    /// the mount point.
    pub fn with_files(seed: &[FileEntry]) -> Result<Self> {
        let sandbox = Self::new()?;
        for entry in seed {
            let target = sandbox.scratch.path().join(entry.path.trim_start_matches('/'));
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, &entry.content)?;
        }
        Ok(sandbox)
    }

    /// Create a sandbox overlaying a real directory. The tree is copied into
    /// the scratch (version-control and dependency-cache directories
    /// skipped) so commands observe it; reads fall through to the source for
    /// paths absent from the scratch; writes never touch the source.
    pub fn overlay(source: impl AsRef<Path>) -> Result<Self> {
        let source = source.as_ref();
        let mut sandbox = Self::new()?;
        copy_tree(source, sandbox.scratch.path())?;
        sandbox.source = Some(source.to_path_buf());
        tracing::debug!(
            source = %source.display(),
            mount = %sandbox.scratch.path().display(),
            "virtual sandbox overlaying directory"
        );
        Ok(sandbox)
    }

    /// The scratch root. This is also the backend's default working
    /// directory.
    pub fn mount_point(&self) -> &Path {
        self.scratch.path()
    }

    /// Map a sandbox path to a host path. Absolute paths are taken as-is
    /// (the toolkit resolves against the mount point before calling in);
    /// relative paths are anchored at the mount point.
    fn host_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.scratch.path().join(p)
        }
    }

    /// Source-directory counterpart of a scratch path, when overlaying.
    fn fallthrough_path(&self, host: &Path) -> Option<PathBuf> {
        let source = self.source.as_deref()?;
        let rel = host.strip_prefix(self.scratch.path()).ok()?;
        Some(source.join(rel))
    }
}

fn copy_tree(source: &Path, dest: &Path) -> Result<()> {
    let walker = WalkDir::new(source).into_iter().filter_entry(|entry| {
        !(entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .map(|name| EXCLUDED_SCAN_DIRS.contains(&name))
                .unwrap_or(false))
    });
    for entry in walker {
        let entry = entry.map_err(|e| Error::backend("overlay", source.display().to_string(), e))?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| Error::backend("overlay", entry.path().display().to_string(), e))?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[async_trait]
impl Sandbox for VirtualSandbox {
    async fn execute_command(&self, command: &str) -> Result<CommandResult> {
        let output = tokio::process::Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .current_dir(self.scratch.path())
            .output()
            .await
            .map_err(|e| Error::backend("execute", command, e))?;

        Ok(CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().map(i64::from).unwrap_or(-1),
        })
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let host = self.host_path(path);
        match tokio::fs::read(&host).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(fallback) = self.fallthrough_path(&host) {
                    match tokio::fs::read(&fallback).await {
                        Ok(bytes) => return Ok(bytes),
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(Error::backend("read", path, e)),
                    }
                }
                Err(Error::not_found(path))
            }
            Err(e) => Err(Error::backend("read", path, e)),
        }
    }

    async fn write_files(&self, files: &[FileEntry]) -> Result<()> {
        for entry in files {
            let host = self.host_path(&entry.path);
            if let Some(parent) = host.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::backend("write", entry.path.clone(), e))?;
            }
            tokio::fs::write(&host, &entry.content)
                .await
                .map_err(|e| Error::backend("write", entry.path.clone(), e))?;
        }
        Ok(())
    }
}
