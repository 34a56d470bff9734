//! Runs code inside a fresh Docker container per request.

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{BackendKind, ExecutionBackend, ExecutionOutcome};
use crate::config::{self, Config, NetworkPolicy};
use crate::sandbox::{
    ensure_image, find_and_extract, qualified_name, ArtifactPolicy, CodeArchive, ContainerSpec,
    RuntimeHandle, SandboxError, SandboxSession,
};

/// Executes code in an ephemeral container: one container per call, always removed.
pub(crate) struct IsolatedBackend {
    handle: Arc<RuntimeHandle>,
    container: ContainerSpec,
    script_name: String,
    interpreter: Vec<String>,
    timeout: Duration,
    artifacts: ArtifactPolicy,
    output_dir: PathBuf,
}

impl IsolatedBackend {
    /// Builds the backend from configuration. Does not connect to Docker.
    pub(crate) fn from_config(config: &Config, handle: Arc<RuntimeHandle>) -> Result<Self> {
        let sandbox = &config.sandbox;

        let container = ContainerSpec {
            image: qualified_name(&sandbox.image),
            placeholder_cmd: config::split_command(&sandbox.placeholder_command)?,
            working_dir: sandbox.working_dir.clone(),
            memory_bytes: Some(config::parse_memory_limit(&sandbox.resources.memory)?),
            nano_cpus: Some(config::parse_cpus(&sandbox.resources.cpus)?),
            network_disabled: sandbox.network.policy == NetworkPolicy::Deny,
        };

        Ok(Self {
            handle,
            container,
            script_name: sandbox.script_name.clone(),
            interpreter: config::split_command(&sandbox.interpreter)?,
            timeout: Duration::from_secs(sandbox.timeout_secs),
            artifacts: ArtifactPolicy::new(&config.artifacts.extensions),
            output_dir: config::resolve_host_dir(&config.artifacts.output_dir)?,
        })
    }

    /// Path of the injected script inside the container.
    fn script_path(&self) -> String {
        format!(
            "{}/{}",
            self.container.working_dir.trim_end_matches('/'),
            self.script_name
        )
    }

    /// Interpreter command followed by the script path.
    fn command(&self) -> Vec<String> {
        let mut command = self.interpreter.clone();
        command.push(self.script_path());
        command
    }

    /// Everything between create and destroy.
    async fn drive(
        &self,
        session: &mut SandboxSession,
        code: &str,
    ) -> Result<ExecutionOutcome, SandboxError> {
        session.start().await?;

        let archive = CodeArchive::pack(code, &self.script_name)?;
        session.inject(&archive, &self.container.working_dir).await?;

        let command = self.command();
        let Ok(output) = tokio::time::timeout(self.timeout, session.run(&command)).await else {
            warn!(
                container = %session.id(),
                "Script exceeded {}s, abandoning it",
                self.timeout.as_secs()
            );
            return Err(SandboxError::timeout(self.timeout));
        };
        let output = output?;

        if !output.success() {
            info!(exit_code = ?output.exit_code, "Script exited unsuccessfully");
        }

        let artifacts = find_and_extract(session, &self.artifacts, &self.output_dir).await;

        Ok(ExecutionOutcome {
            stdout: output.output,
            artifacts,
        })
    }
}

#[async_trait]
impl ExecutionBackend for IsolatedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Isolated
    }

    async fn execute(&self, code: &str) -> Result<ExecutionOutcome, SandboxError> {
        let runtime = self.handle.acquire().await?;
        ensure_image(runtime.as_ref(), &self.container.image).await?;

        let mut session = SandboxSession::create(runtime, &self.container).await?;
        let result = self.drive(&mut session, code).await;

        if let Err(e) = session.destroy().await {
            error!(
                state = %session.state(),
                "Sandbox teardown failed, container may be leaked: {}",
                e
            );
        }

        debug!(
            "Isolated execution finished ({})",
            if result.is_ok() { "ok" } else { "error" }
        );
        result
    }
}
