use async_trait::async_trait;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, DownloadFromContainerOptions, LogOutput,
    RemoveContainerOptions, UploadToContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::service::HostConfig;
use bollard::Docker;
use bytes::Bytes;
use futures_util::StreamExt;
use tracing::{debug, info, warn};

use super::{CappedOutput, ContainerRuntime, ContainerSpec, ExecOutput, ImageInfo, SandboxError};

/// [`ContainerRuntime`] backed by the local Docker daemon.
pub(crate) struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects to the local Docker daemon and checks that it answers.
    pub(crate) async fn connect() -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            SandboxError::runtime_unavailable(format!(
                "failed to connect to Docker ({e}). Is Docker running?"
            ))
        })?;

        docker.ping().await.map_err(|e| {
            SandboxError::runtime_unavailable(format!(
                "cannot ping Docker daemon ({e}). Is Docker running?"
            ))
        })?;

        debug!("Connected to Docker daemon");
        Ok(Self { docker })
    }
}

fn is_not_found(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn build_container_config(spec: &ContainerSpec) -> ContainerConfig<String> {
    let mut host_config = HostConfig {
        memory: spec.memory_bytes,
        nano_cpus: spec.nano_cpus,
        ..Default::default()
    };

    if spec.network_disabled {
        host_config.network_mode = Some("none".to_string());
    }

    ContainerConfig {
        image: Some(spec.image.clone()),
        cmd: Some(spec.placeholder_cmd.clone()),
        working_dir: Some(spec.working_dir.clone()),
        tty: Some(false),
        host_config: Some(host_config),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn inspect_image(&self, image: &str) -> Result<Option<ImageInfo>, SandboxError> {
        match self.docker.inspect_image(image).await {
            Ok(inspect) => Ok(Some(ImageInfo {
                id: inspect.id.unwrap_or_default(),
                tags: inspect.repo_tags.unwrap_or_default(),
                size_bytes: inspect.size.map_or(0, i64::unsigned_abs),
                created: inspect.created,
            })),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(SandboxError::provisioning(
                image,
                format!("failed to inspect image: {e}"),
            )),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<(), SandboxError> {
        info!("Pulling image {}", image);

        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };
        let mut stream = std::pin::pin!(self.docker.create_image(Some(options), None, None));

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(output) => {
                    if let Some(error) = output.error {
                        return Err(SandboxError::provisioning(image, error));
                    }
                    if let Some(status) = output.status {
                        debug!("pull {}: {}", image, status.trim());
                    }
                }
                Err(e) => {
                    return Err(SandboxError::provisioning(
                        image,
                        format!("error pulling image: {e}"),
                    ));
                }
            }
        }

        info!("Image pulled: {}", image);
        Ok(())
    }

    async fn create_container(
        &self,
        name: &str,
        spec: &ContainerSpec,
    ) -> Result<String, SandboxError> {
        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.to_string(),
                    platform: None,
                }),
                build_container_config(spec),
            )
            .await
            .map_err(|e| SandboxError::container_failed(format!("failed to create container: {e}")))?;

        for warning in &response.warnings {
            warn!("Docker warning for {}: {}", name, warning);
        }

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), SandboxError> {
        self.docker
            .start_container::<String>(id, None)
            .await
            .map_err(|e| SandboxError::container_failed(format!("failed to start container: {e}")))
    }

    async fn upload_archive(
        &self,
        id: &str,
        target_dir: &str,
        archive: Bytes,
    ) -> Result<(), SandboxError> {
        self.docker
            .upload_to_container(
                id,
                Some(UploadToContainerOptions {
                    path: target_dir.to_string(),
                    ..Default::default()
                }),
                archive,
            )
            .await
            .map_err(|e| SandboxError::injection(format!("upload to {target_dir} failed: {e}")))
    }

    async fn exec(&self, id: &str, cmd: &[String]) -> Result<ExecOutput, SandboxError> {
        let exec = self
            .docker
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(cmd.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| SandboxError::container_failed(format!("failed to create exec: {e}")))?;

        let mut output = CappedOutput::default();

        if let StartExecResults::Attached {
            output: mut stream, ..
        } = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| SandboxError::container_failed(format!("failed to start exec: {e}")))?
        {
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(LogOutput::StdOut { message }) => output.push(&message),
                    Ok(LogOutput::StdErr { message }) => {
                        debug!("stderr: {}", String::from_utf8_lossy(&message));
                        output.push(&message);
                    }
                    Err(e) => {
                        return Err(SandboxError::container_failed(format!(
                            "error reading exec output: {e}"
                        )));
                    }
                    _ => {}
                }
            }
        }

        let exit_code = match self.docker.inspect_exec(&exec.id).await {
            Ok(inspect) => inspect.exit_code,
            Err(e) => {
                warn!("Failed to inspect exec {}: {}", exec.id, e);
                None
            }
        };

        if output.is_truncated() {
            warn!("Output of exec {} exceeded the capture limit, truncated", exec.id);
        }

        Ok(ExecOutput {
            output: output.into_string(),
            exit_code,
        })
    }

    async fn download_archive(&self, id: &str, path: &str) -> Result<Bytes, SandboxError> {
        let mut stream = std::pin::pin!(self.docker.download_from_container(
            id,
            Some(DownloadFromContainerOptions {
                path: path.to_string(),
            }),
        ));

        let mut archive = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| SandboxError::extraction(format!("failed to download {path}: {e}")))?;
            archive.extend_from_slice(&chunk);
        }

        Ok(Bytes::from(archive))
    }

    async fn remove_container(&self, id: &str) -> Result<(), SandboxError> {
        match self
            .docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => {
                debug!("Container {} already gone", id);
                Ok(())
            }
            Err(e) => Err(SandboxError::teardown(id, e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ContainerSpec {
        ContainerSpec {
            image: "python:3.11".to_string(),
            placeholder_cmd: vec!["sleep".to_string(), "infinity".to_string()],
            working_dir: "/tmp".to_string(),
            memory_bytes: Some(512 * 1024 * 1024),
            nano_cpus: Some(1_000_000_000),
            network_disabled: true,
        }
    }

    #[test]
    fn test_container_config_keeps_container_alive() {
        let config = build_container_config(&spec());
        assert_eq!(config.image.as_deref(), Some("python:3.11"));
        assert_eq!(
            config.cmd,
            Some(vec!["sleep".to_string(), "infinity".to_string()])
        );
        assert_eq!(config.working_dir.as_deref(), Some("/tmp"));
    }

    #[test]
    fn test_container_config_network_and_limits() {
        let config = build_container_config(&spec());
        let host = config.host_config.unwrap();
        assert_eq!(host.network_mode.as_deref(), Some("none"));
        assert_eq!(host.memory, Some(512 * 1024 * 1024));
        assert_eq!(host.nano_cpus, Some(1_000_000_000));
    }

    #[test]
    fn test_container_config_network_allowed() {
        let mut spec = spec();
        spec.network_disabled = false;
        let host = build_container_config(&spec).host_config.unwrap();
        assert!(host.network_mode.is_none());
    }

    #[test]
    fn test_not_found_detection() {
        let err = BollardError::DockerResponseServerError {
            status_code: 404,
            message: "No such container".to_string(),
        };
        assert!(is_not_found(&err));

        let err = BollardError::DockerResponseServerError {
            status_code: 409,
            message: "conflict".to_string(),
        };
        assert!(!is_not_found(&err));
    }

    #[tokio::test]
    async fn test_connect_without_docker() {
        // Either Docker is reachable or the failure is reported as unavailability.
        if let Err(e) = DockerRuntime::connect().await {
            assert!(e.is_provisioning(), "Unexpected error: {e}");
            assert!(e.to_string().contains("Docker"));
        }
    }
}
