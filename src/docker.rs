use bollard::Docker;
use bollard::errors::Error as BollardError;
use bollard::models::ContainerStateStatusEnum;
use bollard::query_parameters::{CreateImageOptions, InspectContainerOptions, RemoveContainerOptions};
use futures_util::StreamExt;
use log::{debug, error, info, trace};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

use crate::config::StackConfig;
use crate::runtime::{
    ContainerRuntime, ContainerSlot, ImageIdentity, RuntimeError, SlotState, with_timeout,
};

// Stale containers are already stopped, and their volumes hold the stack's data.
const REMOVE_OPTIONS: RemoveContainerOptions = RemoveContainerOptions {
    v: false,
    force: false,
    link: false,
};

/// Docker Engine API for containers and images, `docker compose` for bringing
/// services up.
pub struct DockerRuntime {
    docker: Result<Docker, String>,
    compose_file: PathBuf,
    project_dir: PathBuf,
    project_name: Option<String>,
    timeout: Duration,
}

impl DockerRuntime {
    /// Never fails: without a usable daemon every call reports
    /// [`RuntimeError::Unavailable`] so callers can still report per service.
    pub fn connect(config: &StackConfig) -> Self {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            error!("could not connect to docker: {e}");
            e.to_string()
        });
        Self {
            docker,
            compose_file: config.compose_path(),
            project_dir: config.project_dir.clone(),
            project_name: config.project_name.clone(),
            timeout: config.call_timeout(),
        }
    }

    fn client(&self) -> Result<&Docker, RuntimeError> {
        self.docker
            .as_ref()
            .map_err(|e| RuntimeError::Unavailable(e.clone()))
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, RuntimeError>>,
    ) -> Result<T, RuntimeError> {
        with_timeout(self.timeout, call).await
    }

    async fn compose_up(&self, service: Option<&str>) -> Result<(), RuntimeError> {
        let mut command = Command::new("docker");
        command
            .arg("compose")
            .arg("-f")
            .arg(&self.compose_file)
            .current_dir(&self.project_dir)
            .kill_on_drop(true);
        if let Some(project) = &self.project_name {
            command.args(["-p", project]);
        }
        command.args(["up", "-d"]);
        if let Some(service) = service {
            command.arg(service);
        }
        debug!("running {command:?}");

        let output = self.bounded(async { Ok(command.output().await?) }).await?;
        trace!("compose stdout: {}", String::from_utf8_lossy(&output.stdout));
        if !output.status.success() {
            return Err(RuntimeError::Compose {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

fn is_not_found(e: &BollardError) -> bool {
    matches!(
        e,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// Splits `registry:5000/repo/name:tag` into `(registry:5000/repo/name, tag)`.
/// Digest references are passed through whole.
pub(crate) fn split_reference(image: &str) -> (&str, Option<&str>) {
    if image.contains('@') {
        return (image, None);
    }
    match image.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name, Some(tag)),
        _ => (image, Some("latest")),
    }
}

impl ContainerRuntime for DockerRuntime {
    async fn inspect(&self, container: &str) -> Result<ContainerSlot, RuntimeError> {
        let docker = self.client()?;
        let details = match self
            .bounded(async {
                Ok(docker
                    .inspect_container(container, None::<InspectContainerOptions>)
                    .await)
            })
            .await?
        {
            Ok(details) => details,
            Err(e) if is_not_found(&e) => return Ok(ContainerSlot::absent(container)),
            Err(e) => return Err(e.into()),
        };
        trace!(
            "container details: {}",
            serde_json::to_string_pretty(&details).unwrap_or_default()
        );

        let running = details
            .state
            .as_ref()
            .map(|state| {
                state.running.unwrap_or(false)
                    || state.status == Some(ContainerStateStatusEnum::RUNNING)
            })
            .unwrap_or(false);
        Ok(ContainerSlot {
            name: container.to_string(),
            state: if running {
                SlotState::Running
            } else {
                SlotState::Stopped
            },
            image: details.image.map(ImageIdentity),
        })
    }

    async fn pull(&self, image: &str) -> Result<(), RuntimeError> {
        let docker = self.client()?;
        let (from_image, tag) = split_reference(image);
        let options = CreateImageOptions {
            from_image: Some(from_image.to_owned()),
            tag: tag.map(str::to_owned),
            ..Default::default()
        };
        self.bounded(async {
            let mut pull_stream = docker.create_image(Some(options), None, None);
            while let Some(result) = pull_stream.next().await {
                match result {
                    Ok(output) => {
                        debug!("{output:?}");
                        if let Some(status) = &output.status
                            && status.contains("Digest:")
                        {
                            info!("{image}: {status}");
                        }
                    }
                    Err(e) => {
                        error!("Error pulling image: {e:?}");
                        return Err(RuntimeError::Pull(e.to_string()));
                    }
                }
            }
            Ok(())
        })
        .await
    }

    async fn inspect_image(&self, image: &str) -> Result<ImageIdentity, RuntimeError> {
        let docker = self.client()?;
        let details = self
            .bounded(async {
                docker.inspect_image(image).await.map_err(|e| {
                    if is_not_found(&e) {
                        RuntimeError::NotFound(image.to_string())
                    } else {
                        e.into()
                    }
                })
            })
            .await?;
        details
            .id
            .map(ImageIdentity)
            .ok_or_else(|| RuntimeError::NotFound(image.to_string()))
    }

    async fn remove(&self, container: &str) -> Result<(), RuntimeError> {
        let docker = self.client()?;
        self.bounded(async {
            Ok(docker
                .remove_container(container, Some(REMOVE_OPTIONS))
                .await?)
        })
        .await
    }

    async fn up_one(&self, service: &str) -> Result<(), RuntimeError> {
        self.compose_up(Some(service)).await
    }

    async fn up_all(&self) -> Result<(), RuntimeError> {
        self.compose_up(None).await
    }
}
