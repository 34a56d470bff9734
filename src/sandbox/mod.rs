//! Docker sandbox for isolated code execution.
//!
//! Every request gets its own short-lived container: created from the
//! execution image, fed a tar archive holding the script, executed, searched
//! for artifacts, and force-removed. The [`ContainerRuntime`] trait is the
//! seam between the session lifecycle and the Docker Engine API, so the
//! lifecycle can be driven against an in-memory runtime in tests.

mod archive;
mod artifacts;
mod docker;
mod error;
mod image;
#[cfg(test)]
pub(crate) mod mock;
mod output;
mod runtime;
mod session;

pub(crate) use archive::{unpack_first, validate_file_name, CodeArchive};
pub(crate) use artifacts::{find_and_extract, ArtifactPolicy, ArtifactRef};
pub(crate) use docker::DockerRuntime;
pub(crate) use error::SandboxError;
pub(crate) use image::{ensure_image, qualified_name};
pub(crate) use output::{CappedOutput, MAX_OUTPUT_BYTES};
pub(crate) use runtime::RuntimeHandle;
pub(crate) use session::SandboxSession;

use async_trait::async_trait;
use bytes::Bytes;

/// Everything needed to create one sandbox container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ContainerSpec {
    /// Fully qualified image reference (`name:tag`).
    pub image: String,
    /// Long-lived command that keeps the container alive between execs.
    pub placeholder_cmd: Vec<String>,
    /// Working directory inside the container; scripts and artifacts live here.
    pub working_dir: String,
    /// Memory limit in bytes.
    pub memory_bytes: Option<i64>,
    /// CPU quota in units of 10^-9 CPUs.
    pub nano_cpus: Option<i64>,
    /// Run with `network_mode = none`.
    pub network_disabled: bool,
}

/// Captured result of one command run inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ExecOutput {
    /// Standard output and standard error, interleaved in arrival order.
    pub output: String,
    /// Exit code reported by the runtime, if it reported one.
    pub exit_code: Option<i64>,
}

impl ExecOutput {
    /// Returns true if the command exited with status zero.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Local image metadata, as reported by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ImageInfo {
    pub id: String,
    pub tags: Vec<String>,
    pub size_bytes: u64,
    pub created: Option<String>,
}

/// Operations the sandbox needs from the isolation runtime.
///
/// Container ids returned by [`ContainerRuntime::create_container`] are opaque
/// and only meaningful to the runtime that issued them.
#[async_trait]
pub(crate) trait ContainerRuntime: Send + Sync {
    /// Returns image metadata, or `None` if the image is not present locally.
    async fn inspect_image(&self, image: &str) -> Result<Option<ImageInfo>, SandboxError>;

    /// Pulls an image from its registry.
    async fn pull_image(&self, image: &str) -> Result<(), SandboxError>;

    /// Creates a stopped container and returns its id.
    async fn create_container(&self, name: &str, spec: &ContainerSpec)
        -> Result<String, SandboxError>;

    /// Starts a created container.
    async fn start_container(&self, id: &str) -> Result<(), SandboxError>;

    /// Extracts a tar archive into `target_dir` inside the container.
    async fn upload_archive(
        &self,
        id: &str,
        target_dir: &str,
        archive: Bytes,
    ) -> Result<(), SandboxError>;

    /// Runs a command inside a running container and captures its output.
    async fn exec(&self, id: &str, cmd: &[String]) -> Result<ExecOutput, SandboxError>;

    /// Returns a tar archive holding the file or directory at `path`.
    async fn download_archive(&self, id: &str, path: &str) -> Result<Bytes, SandboxError>;

    /// Force-removes a container. Removing a container that no longer exists succeeds.
    async fn remove_container(&self, id: &str) -> Result<(), SandboxError>;
}
