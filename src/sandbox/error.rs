//! Domain-specific error types for sandbox operations.
//!
//! Typed errors let the tool adapter and the CLI tell provisioning failures
//! apart from injection failures, timeouts, and teardown problems without
//! parsing error message strings.

use std::time::Duration;

/// Errors that can occur while provisioning, driving, or tearing down a sandbox.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Docker daemon is not running or not accessible.
    #[error("Docker is not available: {message}")]
    RuntimeUnavailable { message: String },

    /// Execution image is missing locally and could not be pulled.
    #[error("Failed to provision image {image}: {message}")]
    Provisioning { image: String, message: String },

    /// Code archive could not be built or copied into the container.
    #[error("Failed to inject code into sandbox: {message}")]
    Injection { message: String },

    /// Code execution exceeded the configured timeout.
    #[error("Code execution timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// A session operation was called out of lifecycle order.
    #[error("Sandbox session cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// Container operation failed (create, start, exec, etc.).
    #[error("Container operation failed: {message}")]
    ContainerFailed { message: String },

    /// Listing or pulling an artifact out of the container failed.
    #[error("Artifact extraction failed: {message}")]
    Extraction { message: String },

    /// Container could not be removed.
    #[error("Failed to remove container {id}: {message}")]
    Teardown { id: String, message: String },

    /// Host subprocess for the trusted backend failed to run.
    #[error("Host process failed: {message}")]
    Process { message: String },
}

impl SandboxError {
    /// Creates a `RuntimeUnavailable` error.
    pub fn runtime_unavailable(message: impl Into<String>) -> Self {
        Self::RuntimeUnavailable {
            message: message.into(),
        }
    }

    /// Creates a `Provisioning` error.
    pub fn provisioning(image: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provisioning {
            image: image.into(),
            message: message.into(),
        }
    }

    /// Creates an `Injection` error.
    pub fn injection(message: impl Into<String>) -> Self {
        Self::Injection {
            message: message.into(),
        }
    }

    /// Creates a `Timeout` error from a `Duration`.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout {
            timeout_secs: duration.as_secs(),
        }
    }

    /// Creates an `InvalidState` error.
    pub fn invalid_state(operation: &'static str, state: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            operation,
            state: state.to_string(),
        }
    }

    /// Creates a `ContainerFailed` error.
    pub fn container_failed(message: impl Into<String>) -> Self {
        Self::ContainerFailed {
            message: message.into(),
        }
    }

    /// Creates an `Extraction` error.
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
        }
    }

    /// Creates a `Teardown` error.
    pub fn teardown(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Teardown {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Creates a `Process` error.
    pub fn process(message: impl Into<String>) -> Self {
        Self::Process {
            message: message.into(),
        }
    }

    /// Returns true if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true if the request failed before any container was created.
    pub fn is_provisioning(&self) -> bool {
        matches!(
            self,
            Self::Provisioning { .. } | Self::RuntimeUnavailable { .. }
        )
    }

    /// Returns true if this is an injection error.
    pub fn is_injection(&self) -> bool {
        matches!(self, Self::Injection { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_unavailable_error() {
        let err = SandboxError::runtime_unavailable("daemon not running");
        assert!(err.is_provisioning());
        assert!(!err.is_timeout());
        assert_eq!(
            err.to_string(),
            "Docker is not available: daemon not running"
        );
    }

    #[test]
    fn test_provisioning_error() {
        let err = SandboxError::provisioning("python:3.11", "manifest unknown");
        assert!(err.is_provisioning());
        assert_eq!(
            err.to_string(),
            "Failed to provision image python:3.11: manifest unknown"
        );
    }

    #[test]
    fn test_timeout_error() {
        let err = SandboxError::timeout(Duration::from_secs(60));
        assert!(err.is_timeout());
        assert_eq!(
            err.to_string(),
            "Code execution timed out after 60 seconds"
        );
    }

    #[test]
    fn test_invalid_state_error() {
        let err = SandboxError::invalid_state("run", "created");
        assert_eq!(err.to_string(), "Sandbox session cannot run while created");
    }

    #[test]
    fn test_teardown_error() {
        let err = SandboxError::teardown("abc123", "conflict");
        assert_eq!(
            err.to_string(),
            "Failed to remove container abc123: conflict"
        );
    }

    #[test]
    fn test_error_variants_are_distinct() {
        let timeout = SandboxError::timeout(Duration::from_secs(1));
        let injection = SandboxError::injection("upload refused");
        let image = SandboxError::provisioning("img", "gone");

        assert!(timeout.is_timeout());
        assert!(!timeout.is_injection());
        assert!(!timeout.is_provisioning());

        assert!(!injection.is_timeout());
        assert!(injection.is_injection());
        assert!(!injection.is_provisioning());

        assert!(!image.is_timeout());
        assert!(!image.is_injection());
        assert!(image.is_provisioning());
    }
}
