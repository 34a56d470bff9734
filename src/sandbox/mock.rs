//! In-memory container runtime for testing.
//!
//! Records every call so tests can assert lifecycle ordering, and can be told
//! to fail at any phase to exercise teardown on error paths.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{
    CodeArchive, ContainerRuntime, ContainerSpec, ExecOutput, ImageInfo, RuntimeHandle,
    SandboxError,
};

/// A single recorded runtime call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    InspectImage(String),
    PullImage(String),
    Create(String),
    Start(String),
    Upload { id: String, target_dir: String },
    Exec { id: String, cmd: Vec<String> },
    Download { id: String, path: String },
    Remove(String),
}

/// How the mock runtime should respond.
#[derive(Debug, Clone)]
pub(crate) struct MockBehavior {
    pub image_present: bool,
    pub fail_pull: bool,
    pub fail_create: bool,
    pub fail_start: bool,
    pub fail_upload: bool,
    pub fail_exec: bool,
    pub fail_list: bool,
    pub fail_download: bool,
    /// Number of remove calls that fail before one succeeds.
    pub remove_failures: usize,
    /// Delay before the script exec returns.
    pub exec_delay: Option<Duration>,
    pub script_output: String,
    pub script_exit_code: i64,
    /// Entries returned by `ls`, in order.
    pub listing: Vec<String>,
    /// File contents served by `download_archive`, keyed by file name.
    pub files: HashMap<String, Vec<u8>>,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            image_present: true,
            fail_pull: false,
            fail_create: false,
            fail_start: false,
            fail_upload: false,
            fail_exec: false,
            fail_list: false,
            fail_download: false,
            remove_failures: 0,
            exec_delay: None,
            script_output: String::new(),
            script_exit_code: 0,
            listing: vec!["script.py".to_string()],
            files: HashMap::new(),
        }
    }
}

/// A mock [`ContainerRuntime`] that never touches Docker.
#[derive(Debug, Default)]
pub(crate) struct MockRuntime {
    behavior: MockBehavior,
    calls: Mutex<Vec<Call>>,
    uploads: Mutex<Vec<Bytes>>,
    created: AtomicUsize,
    remove_attempts: AtomicUsize,
}

impl MockRuntime {
    pub fn new(behavior: MockBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            ..Default::default()
        })
    }

    /// A runtime handle whose connector always hands out this mock.
    pub fn handle(self: &Arc<Self>) -> RuntimeHandle {
        let runtime: Arc<dyn ContainerRuntime> = self.clone();
        RuntimeHandle::with_connector(move || {
            let runtime = Arc::clone(&runtime);
            async move { Ok(runtime) }
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn created_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Create(_)))
            .count()
    }

    pub fn removed_ids(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Remove(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Archives uploaded into containers, in order.
    pub fn uploads(&self) -> Vec<Bytes> {
        self.uploads.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn inspect_image(&self, image: &str) -> Result<Option<ImageInfo>, SandboxError> {
        self.record(Call::InspectImage(image.to_string()));
        Ok(self.behavior.image_present.then(|| ImageInfo {
            id: "sha256:mock".to_string(),
            tags: vec![image.to_string()],
            size_bytes: 1024,
            created: None,
        }))
    }

    async fn pull_image(&self, image: &str) -> Result<(), SandboxError> {
        self.record(Call::PullImage(image.to_string()));
        if self.behavior.fail_pull {
            return Err(SandboxError::provisioning(image, "manifest unknown"));
        }
        Ok(())
    }

    async fn create_container(
        &self,
        name: &str,
        _spec: &ContainerSpec,
    ) -> Result<String, SandboxError> {
        self.record(Call::Create(name.to_string()));
        if self.behavior.fail_create {
            return Err(SandboxError::container_failed("create refused"));
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("mock-{n}"))
    }

    async fn start_container(&self, id: &str) -> Result<(), SandboxError> {
        self.record(Call::Start(id.to_string()));
        if self.behavior.fail_start {
            return Err(SandboxError::container_failed("start refused"));
        }
        Ok(())
    }

    async fn upload_archive(
        &self,
        id: &str,
        target_dir: &str,
        archive: Bytes,
    ) -> Result<(), SandboxError> {
        self.record(Call::Upload {
            id: id.to_string(),
            target_dir: target_dir.to_string(),
        });
        if self.behavior.fail_upload {
            return Err(SandboxError::injection("upload refused"));
        }
        self.uploads.lock().unwrap().push(archive);
        Ok(())
    }

    async fn exec(&self, id: &str, cmd: &[String]) -> Result<ExecOutput, SandboxError> {
        self.record(Call::Exec {
            id: id.to_string(),
            cmd: cmd.to_vec(),
        });

        if cmd.first().map(String::as_str) == Some("ls") {
            if self.behavior.fail_list {
                return Ok(ExecOutput {
                    output: "ls: cannot access: No such file or directory\n".to_string(),
                    exit_code: Some(2),
                });
            }
            let mut output = self.behavior.listing.join("\n");
            output.push('\n');
            return Ok(ExecOutput {
                output,
                exit_code: Some(0),
            });
        }

        if let Some(delay) = self.behavior.exec_delay {
            tokio::time::sleep(delay).await;
        }
        if self.behavior.fail_exec {
            return Err(SandboxError::container_failed("container killed"));
        }
        Ok(ExecOutput {
            output: self.behavior.script_output.clone(),
            exit_code: Some(self.behavior.script_exit_code),
        })
    }

    async fn download_archive(&self, id: &str, path: &str) -> Result<Bytes, SandboxError> {
        self.record(Call::Download {
            id: id.to_string(),
            path: path.to_string(),
        });
        if self.behavior.fail_download {
            return Err(SandboxError::extraction("download refused"));
        }
        let name = path.rsplit('/').next().unwrap_or(path);
        let data = self
            .behavior
            .files
            .get(name)
            .ok_or_else(|| SandboxError::extraction(format!("no such file: {path}")))?;
        Ok(CodeArchive::from_bytes(name, data)?.bytes())
    }

    async fn remove_container(&self, id: &str) -> Result<(), SandboxError> {
        self.record(Call::Remove(id.to_string()));
        let attempt = self.remove_attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.behavior.remove_failures {
            return Err(SandboxError::teardown(id, "device or resource busy"));
        }
        Ok(())
    }
}
