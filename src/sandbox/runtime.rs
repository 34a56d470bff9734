//! Process-wide, lazily established connection to the isolation runtime.

use futures_util::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

use super::{ContainerRuntime, DockerRuntime, SandboxError};

type Connector =
    Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn ContainerRuntime>, SandboxError>> + Send + Sync>;

/// Shared handle to the container runtime.
///
/// The connection is made by the first caller of [`RuntimeHandle::acquire`]
/// and reused by every later call. Concurrent first callers wait on the same
/// initialization, so at most one connection is ever established. A failed
/// connection leaves the handle empty and the error goes to the caller.
pub(crate) struct RuntimeHandle {
    cell: OnceCell<Arc<dyn ContainerRuntime>>,
    connect: Connector,
}

impl RuntimeHandle {
    /// Handle that connects to the local Docker daemon on first use.
    pub(crate) fn docker() -> Self {
        Self::with_connector(connect_docker)
    }

    /// Handle with a custom connector.
    pub(crate) fn with_connector<F, Fut>(connect: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn ContainerRuntime>, SandboxError>> + Send + 'static,
    {
        Self {
            cell: OnceCell::new(),
            connect: Box::new(move || connect().boxed()),
        }
    }

    /// Returns the shared runtime, connecting if this is the first call.
    pub(crate) async fn acquire(&self) -> Result<Arc<dyn ContainerRuntime>, SandboxError> {
        self.cell
            .get_or_try_init(|| (self.connect)())
            .await
            .map(Arc::clone)
    }

    /// Returns true once a connection has been established.
    pub(crate) fn is_connected(&self) -> bool {
        self.cell.initialized()
    }
}

async fn connect_docker() -> Result<Arc<dyn ContainerRuntime>, SandboxError> {
    let runtime = DockerRuntime::connect().await?;
    info!("Docker runtime connected");
    Ok(Arc::new(runtime))
}

impl std::fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}
