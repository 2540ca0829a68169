//! Remote sandbox backend driven over the Docker API.
//!
//! The backend is a network-addressable machine identified by a container
//! id. Commands are handed to the machine's shell interpreter as a single
//! argument and both output streams are drained to completion before the
//! result is assembled, whatever the exit code. File content crosses the
//! wire as tar archives, so binary payloads pass through unchanged.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::io::Read;

use cellbox_core::{Error, Result};

use crate::engine::{CommandResult, FileEntry, Sandbox, DEFAULT_SHELL};

/// Provisioning parameters for a fresh sandbox container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Docker image to run.
    pub image: String,
    /// Maximum memory in bytes.
    pub memory_limit: i64,
    /// CPU quota against a 100ms period.
    pub cpu_quota: i64,
    /// Writable workspace path inside the container.
    pub workdir: String,
    /// Whether the container gets bridge networking. Off by default.
    pub network_enabled: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            image: "cellbox-sandbox:latest".to_string(),
            memory_limit: 512 * 1024 * 1024,
            cpu_quota: 100_000,
            workdir: "/workspace".to_string(),
            network_enabled: false,
        }
    }
}

/// Container-backed remote sandbox.
pub struct RemoteSandbox {
    docker: bollard::Docker,
    container_id: String,
    shell: String,
}

impl RemoteSandbox {
    /// Attach to an already-running container via the local Docker daemon.
    pub fn attach(container_id: impl Into<String>) -> Result<Self> {
        let container_id = container_id.into();
        let docker = bollard::Docker::connect_with_local_defaults()
            .map_err(|e| Error::backend("connect", container_id.clone(), e))?;
        Ok(Self::from_client(docker, container_id))
    }

    /// Attach to a container through an existing client.
    pub fn from_client(docker: bollard::Docker, container_id: impl Into<String>) -> Self {
        Self {
            docker,
            container_id: container_id.into(),
            shell: DEFAULT_SHELL.to_string(),
        }
    }

    /// Provision a new hardened container and attach to it: tmpfs workspace,
    /// read-only rootfs, no capabilities, bounded pids, no network unless
    /// asked for.
    pub async fn provision(config: &RemoteConfig) -> Result<Self> {
        let docker = bollard::Docker::connect_with_local_defaults()
            .map_err(|e| Error::backend("connect", config.image.clone(), e))?;
        Self::provision_with(docker, config).await
    }

    /// Provision through an existing client.
    pub async fn provision_with(docker: bollard::Docker, config: &RemoteConfig) -> Result<Self> {
        use bollard::container::{Config, CreateContainerOptions};
        use bollard::models::{HostConfig, Mount, MountTypeEnum};

        let name = format!("cellbox-{}", uuid::Uuid::new_v4());

        let host_config = HostConfig {
            memory: Some(config.memory_limit),
            cpu_quota: Some(config.cpu_quota),
            cpu_period: Some(100_000),
            network_mode: Some(if config.network_enabled {
                "bridge".to_string()
            } else {
                "none".to_string()
            }),
            mounts: Some(vec![
                Mount {
                    target: Some(config.workdir.clone()),
                    typ: Some(MountTypeEnum::TMPFS),
                    tmpfs_options: Some(bollard::models::MountTmpfsOptions {
                        size_bytes: Some(config.memory_limit / 2),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                // mktemp needs a writable /tmp on the read-only rootfs.
                Mount {
                    target: Some("/tmp".to_string()),
                    typ: Some(MountTypeEnum::TMPFS),
                    tmpfs_options: Some(bollard::models::MountTmpfsOptions {
                        size_bytes: Some(64 * 1024 * 1024),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ]),
            readonly_rootfs: Some(true),
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges:true".to_string()]),
            pids_limit: Some(100),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(config.image.clone()),
            working_dir: Some(config.workdir.clone()),
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            host_config: Some(host_config),
            labels: Some(std::collections::HashMap::from([(
                "managed-by".to_string(),
                "cellbox".to_string(),
            )])),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: &name,
            platform: None,
        };

        docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| Error::backend("provision", name.clone(), e))?;

        docker
            .start_container::<String>(&name, None)
            .await
            .map_err(|e| Error::backend("provision", name.clone(), e))?;

        tracing::info!(container = %name, image = %config.image, "sandbox container provisioned");

        Ok(Self::from_client(docker, name))
    }

    /// The stable identifier of the backing machine.
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Stop and remove the backing container.
    pub async fn destroy(&self) -> Result<()> {
        use bollard::container::{RemoveContainerOptions, StopContainerOptions};

        let _ = self
            .docker
            .stop_container(&self.container_id, Some(StopContainerOptions { t: 5 }))
            .await;

        self.docker
            .remove_container(
                &self.container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| Error::backend("destroy", self.container_id.clone(), e))?;

        tracing::info!(container = %self.container_id, "sandbox container destroyed");
        Ok(())
    }

    /// Whether the Docker daemon answers.
    pub async fn is_available(&self) -> bool {
        self.docker.ping().await.is_ok()
    }
}

#[async_trait]
impl Sandbox for RemoteSandbox {
    async fn execute_command(&self, command: &str) -> Result<CommandResult> {
        use bollard::exec::{CreateExecOptions, StartExecResults};

        let exec = self
            .docker
            .create_exec(
                &self.container_id,
                CreateExecOptions {
                    cmd: Some(vec![self.shell.as_str(), "-c", command]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| Error::backend("execute", command, e))?;

        let start = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| Error::backend("execute", command, e))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        // Both streams are drained to completion before returning, whatever
        // the command's exit code.
        if let StartExecResults::Attached { mut output, .. } = start {
            while let Some(msg) = output.next().await {
                match msg {
                    Ok(bollard::container::LogOutput::StdOut { message }) => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(bollard::container::LogOutput::StdErr { message }) => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(_) => {}
                    Err(e) => return Err(Error::backend("execute", command, e)),
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| Error::backend("execute", command, e))?;

        Ok(CommandResult {
            stdout,
            stderr,
            exit_code: inspect.exit_code.unwrap_or(-1),
        })
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        use bollard::container::DownloadFromContainerOptions;

        let mut stream = self.docker.download_from_container(
            &self.container_id,
            Some(DownloadFromContainerOptions {
                path: path.to_string(),
            }),
        );

        let mut archive: Vec<u8> = Vec::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => archive.extend_from_slice(&bytes),
                Err(bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                }) => return Err(Error::not_found(path)),
                Err(e) => return Err(Error::backend("read", path, e)),
            }
        }

        // The daemon frames the file as a single-entry tar archive.
        let mut tar = tar::Archive::new(archive.as_slice());
        for entry in tar
            .entries()
            .map_err(|e| Error::backend("read", path, e))?
        {
            let mut entry = entry.map_err(|e| Error::backend("read", path, e))?;
            if entry.header().entry_type().is_file() {
                let mut content = Vec::new();
                entry
                    .read_to_end(&mut content)
                    .map_err(|e| Error::backend("read", path, e))?;
                return Ok(content);
            }
        }

        Err(Error::not_found(path))
    }

    async fn write_files(&self, files: &[FileEntry]) -> Result<()> {
        use bollard::container::UploadToContainerOptions;

        if files.is_empty() {
            return Ok(());
        }
        let target = format!("{} file(s)", files.len());

        let mut builder = tar::Builder::new(Vec::new());
        for entry in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(entry.content.len() as u64);
            header.set_mode(0o644);
            builder
                .append_data(
                    &mut header,
                    entry.path.trim_start_matches('/'),
                    entry.content.as_slice(),
                )
                .map_err(|e| Error::backend("write", entry.path.clone(), e))?;
        }
        let archive = builder
            .into_inner()
            .map_err(|e| Error::backend("write", target.clone(), e))?;

        self.docker
            .upload_to_container(
                &self.container_id,
                Some(UploadToContainerOptions {
                    path: "/".to_string(),
                    ..Default::default()
                }),
                archive.into(),
            )
            .await
            .map_err(|e| Error::backend("write", target, e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_config_defaults() {
        let config = RemoteConfig::default();
        assert_eq!(config.image, "cellbox-sandbox:latest");
        assert_eq!(config.memory_limit, 512 * 1024 * 1024);
        assert_eq!(config.workdir, "/workspace");
        assert!(!config.network_enabled);
    }
}
