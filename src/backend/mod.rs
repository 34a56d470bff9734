//! Execution backends for agent-generated code.
//!
//! Two interchangeable strategies run a script and report what it printed:
//! - Isolated: a throwaway Docker container per request (the default)
//! - Trusted process: a plain host subprocess, for trusted or offline use only
//!
//! The backend is chosen once from configuration when the process starts.

mod isolated;
mod trusted;

pub(crate) use isolated::IsolatedBackend;
pub(crate) use trusted::TrustedProcessBackend;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::config::Config;
use crate::sandbox::{ArtifactRef, RuntimeHandle, SandboxError};

/// What a backend produced for one script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ExecutionOutcome {
    /// Captured console output of the script.
    pub stdout: String,
    /// Files extracted from the sandbox, at most one.
    pub artifacts: Vec<ArtifactRef>,
}

/// Trait for code execution strategies.
#[async_trait]
pub(crate) trait ExecutionBackend: Send + Sync {
    /// Returns which strategy this is.
    fn kind(&self) -> BackendKind;

    /// Runs `code` and returns its output.
    ///
    /// A script that fails on its own (non-zero exit, traceback) is still a
    /// successful execution; the output carries the failure.
    async fn execute(&self, code: &str) -> Result<ExecutionOutcome, SandboxError>;
}

/// Supported execution backends.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Fresh Docker container per request.
    #[default]
    #[serde(alias = "docker")]
    #[value(alias = "docker")]
    Isolated,
    /// Direct host subprocess with no isolation.
    #[serde(alias = "dangerously-use-uv", alias = "dangerously_use_uv")]
    #[value(alias = "dangerously-use-uv")]
    TrustedProcess,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Isolated => write!(f, "isolated"),
            Self::TrustedProcess => write!(f, "trusted-process"),
        }
    }
}

/// Builds the backend selected in `config`.
///
/// `handle` is only used by the isolated backend; it is shared so that every
/// request in the process reuses one runtime connection.
pub(crate) fn from_config(
    config: &Config,
    handle: Arc<RuntimeHandle>,
) -> Result<Box<dyn ExecutionBackend>> {
    match config.execution.backend {
        BackendKind::Isolated => Ok(Box::new(IsolatedBackend::from_config(config, handle)?)),
        BackendKind::TrustedProcess => {
            warn!("Using the trusted-process backend: code runs on the host WITHOUT isolation");
            Ok(Box::new(TrustedProcessBackend::from_config(config)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_display() {
        assert_eq!(format!("{}", BackendKind::Isolated), "isolated");
        assert_eq!(format!("{}", BackendKind::TrustedProcess), "trusted-process");
    }

    #[test]
    fn test_backend_kind_default_is_isolated() {
        assert_eq!(BackendKind::default(), BackendKind::Isolated);
    }

    #[test]
    fn test_backend_kind_from_cli_value() {
        use clap::ValueEnum;
        assert_eq!(
            BackendKind::from_str("isolated", true).unwrap(),
            BackendKind::Isolated
        );
        assert_eq!(
            BackendKind::from_str("docker", true).unwrap(),
            BackendKind::Isolated
        );
        assert_eq!(
            BackendKind::from_str("Trusted-Process", true).unwrap(),
            BackendKind::TrustedProcess
        );
        assert!(BackendKind::from_str("podman", true).is_err());
    }

    #[test]
    fn test_from_config_selects_backend() {
        let handle = Arc::new(RuntimeHandle::docker());

        let backend = from_config(&Config::default(), Arc::clone(&handle)).unwrap();
        assert_eq!(backend.kind(), BackendKind::Isolated);

        let mut config = Config::default();
        config.execution.backend = BackendKind::TrustedProcess;
        let backend = from_config(&config, handle).unwrap();
        assert_eq!(backend.kind(), BackendKind::TrustedProcess);
    }

    #[test]
    fn test_building_backend_does_not_connect() {
        let handle = Arc::new(RuntimeHandle::docker());
        let _backend = from_config(&Config::default(), Arc::clone(&handle)).unwrap();
        assert!(!handle.is_connected());
    }
}
