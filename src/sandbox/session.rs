//! One ephemeral container and its lifecycle.
//!
//! ```text
//! Created -> Started -> Injected -> Executed -> (ArtifactsExtracted)
//!    \__________\___________\___________\_____________\____-> Destroyed
//! ```
//!
//! `Destroyed` is reachable from every state. The owner calls
//! [`SandboxSession::destroy`] on every exit path; if a session is dropped
//! without that (panic, cancelled future) `Drop` schedules a background removal.

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{CodeArchive, ContainerRuntime, ContainerSpec, ExecOutput, SandboxError};

/// Removal attempts made by [`SandboxSession::destroy`] before giving up.
const TEARDOWN_ATTEMPTS: usize = 2;

/// Lifecycle state of a sandbox session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    Created,
    Started,
    Injected,
    Executed,
    ArtifactsExtracted,
    Destroyed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Started => write!(f, "started"),
            Self::Injected => write!(f, "injected"),
            Self::Executed => write!(f, "executed"),
            Self::ArtifactsExtracted => write!(f, "artifacts-extracted"),
            Self::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// An isolated container owned by exactly one request.
pub(crate) struct SandboxSession {
    runtime: Arc<dyn ContainerRuntime>,
    id: String,
    name: String,
    working_dir: String,
    state: SessionState,
}

impl SandboxSession {
    /// Creates a stopped container from `spec`.
    pub(crate) async fn create(
        runtime: Arc<dyn ContainerRuntime>,
        spec: &ContainerSpec,
    ) -> Result<Self, SandboxError> {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let name = format!("codebox-{}", &suffix[..8]);

        debug!("Creating container {} from {}", name, spec.image);
        let id = runtime.create_container(&name, spec).await?;
        info!(container = %name, id = %id, "Sandbox created");

        Ok(Self {
            runtime,
            id,
            name,
            working_dir: spec.working_dir.clone(),
            state: SessionState::Created,
        })
    }

    /// Runtime-assigned container id.
    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    /// Working directory inside the container.
    pub(crate) fn working_dir(&self) -> &str {
        &self.working_dir
    }

    fn require(&self, expected: SessionState, operation: &'static str) -> Result<(), SandboxError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SandboxError::invalid_state(operation, self.state))
        }
    }

    fn require_running(&self, operation: &'static str) -> Result<(), SandboxError> {
        match self.state {
            SessionState::Created | SessionState::Destroyed => {
                Err(SandboxError::invalid_state(operation, self.state))
            }
            _ => Ok(()),
        }
    }

    /// Starts the container's placeholder process.
    pub(crate) async fn start(&mut self) -> Result<(), SandboxError> {
        self.require(SessionState::Created, "start")?;
        self.runtime.start_container(&self.id).await?;
        debug!("Container {} started", self.name);
        self.state = SessionState::Started;
        Ok(())
    }

    /// Copies `archive` into `target_dir`, replacing any file with the same name.
    pub(crate) async fn inject(
        &mut self,
        archive: &CodeArchive,
        target_dir: &str,
    ) -> Result<(), SandboxError> {
        self.require(SessionState::Started, "inject")?;
        self.runtime
            .upload_archive(&self.id, target_dir, archive.bytes())
            .await
            .map_err(|e| match e {
                SandboxError::Injection { .. } => e,
                other => SandboxError::injection(other.to_string()),
            })?;
        debug!(
            "Injected {} into {}:{}",
            archive.file_name(),
            self.name,
            target_dir
        );
        self.state = SessionState::Injected;
        Ok(())
    }

    /// Runs `command` and captures its output.
    ///
    /// A non-zero exit code is reported in the returned [`ExecOutput`], not as
    /// an error.
    pub(crate) async fn run(&mut self, command: &[String]) -> Result<ExecOutput, SandboxError> {
        self.require(SessionState::Injected, "run")?;
        debug!("Running {:?} in {}", command, self.name);
        let output = self.runtime.exec(&self.id, command).await?;
        self.state = SessionState::Executed;
        Ok(output)
    }

    /// Lists entries of `path` inside the container, in the order `ls` prints them.
    pub(crate) async fn list_directory(&self, path: &str) -> Result<Vec<String>, SandboxError> {
        self.require_running("list a directory")?;
        let cmd = vec!["ls".to_string(), "-1".to_string(), path.to_string()];
        let listing = self
            .runtime
            .exec(&self.id, &cmd)
            .await
            .map_err(|e| SandboxError::extraction(e.to_string()))?;

        if !listing.success() {
            return Err(SandboxError::extraction(format!(
                "listing {path} failed: {}",
                listing.output.trim()
            )));
        }

        Ok(listing
            .output
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Pulls the file at `path` out of the container as a tar archive.
    pub(crate) async fn extract_file(&self, path: &str) -> Result<Bytes, SandboxError> {
        self.require_running("extract a file")?;
        self.runtime
            .download_archive(&self.id, path)
            .await
            .map_err(|e| match e {
                SandboxError::Extraction { .. } => e,
                other => SandboxError::extraction(other.to_string()),
            })
    }

    /// Records that artifacts have been pulled out of an executed session.
    pub(crate) fn mark_artifacts_extracted(&mut self) -> Result<(), SandboxError> {
        self.require(SessionState::Executed, "record extracted artifacts")?;
        self.state = SessionState::ArtifactsExtracted;
        Ok(())
    }

    /// Force-removes the container from whatever state it is in.
    ///
    /// Calling this again after success is a no-op. Removal is attempted
    /// [`TEARDOWN_ATTEMPTS`] times; if every attempt fails the session stays
    /// undestroyed so `Drop` makes one more try.
    pub(crate) async fn destroy(&mut self) -> Result<(), SandboxError> {
        if self.state == SessionState::Destroyed {
            return Ok(());
        }

        let mut last_error = None;
        for attempt in 1..=TEARDOWN_ATTEMPTS {
            match self.runtime.remove_container(&self.id).await {
                Ok(()) => {
                    info!(container = %self.name, from = %self.state, "Sandbox destroyed");
                    self.state = SessionState::Destroyed;
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        container = %self.name,
                        attempt,
                        "Failed to remove container: {}",
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(SandboxError::teardown(
            &self.id,
            last_error.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }
}

impl fmt::Debug for SandboxSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxSession")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("working_dir", &self.working_dir)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Drop for SandboxSession {
    fn drop(&mut self) {
        if self.state == SessionState::Destroyed {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            error!(
                container = %self.name,
                id = %self.id,
                "Sandbox dropped outside a tokio runtime; container leaked"
            );
            return;
        };

        warn!(container = %self.name, state = %self.state, "Sandbox dropped before teardown, removing in background");
        let runtime = Arc::clone(&self.runtime);
        let id = std::mem::take(&mut self.id);
        handle.spawn(async move {
            if let Err(e) = runtime.remove_container(&id).await {
                error!(id = %id, "Background container removal failed: {}", e);
            }
        });
    }
}
