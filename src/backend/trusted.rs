//! Runs code as a plain subprocess on the host.
//!
//! There is no isolation of any kind: the script sees the host filesystem,
//! network and environment of this process.

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{BackendKind, ExecutionBackend, ExecutionOutcome};
use crate::config::{self, Config};
use crate::sandbox::{CappedOutput, SandboxError, MAX_OUTPUT_BYTES};

pub(crate) struct TrustedProcessBackend {
    command: Vec<String>,
    scratch_dir: Option<PathBuf>,
    script_name: String,
    timeout: Duration,
    output_limit: usize,
}

impl TrustedProcessBackend {
    pub(crate) fn from_config(config: &Config) -> Result<Self> {
        let scratch_dir = config
            .trusted
            .scratch_dir
            .as_deref()
            .map(config::expand_path)
            .transpose()?;

        Ok(Self {
            command: config::split_command(&config.trusted.command)?,
            scratch_dir,
            script_name: config.sandbox.script_name.clone(),
            timeout: Duration::from_secs(config.sandbox.timeout_secs),
            output_limit: MAX_OUTPUT_BYTES,
        })
    }

    fn scratch(&self) -> Result<tempfile::TempDir, SandboxError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("codebox-");
        let dir = match &self.scratch_dir {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        };
        dir.map_err(|e| SandboxError::process(format!("cannot create scratch directory: {e}")))
    }
}

#[async_trait]
impl ExecutionBackend for TrustedProcessBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::TrustedProcess
    }

    async fn execute(&self, code: &str) -> Result<ExecutionOutcome, SandboxError> {
        // Removed with its contents when dropped, on every return path.
        let scratch = self.scratch()?;
        let script = scratch.path().join(&self.script_name);
        tokio::fs::write(&script, code)
            .await
            .map_err(|e| SandboxError::process(format!("cannot write {}: {e}", script.display())))?;

        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| SandboxError::process("empty command"))?;

        debug!("Running {} {:?} {}", program, args, script.display());
        let mut command = Command::new(program);
        command
            .args(args)
            .arg(&script)
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // The script's own children join this group so they can be killed with it.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| SandboxError::process(format!("failed to spawn {program}: {e}")))?;
        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let run = async {
            let (status, stdout, stderr) = tokio::join!(
                child.wait(),
                read_capped(stdout, self.output_limit),
                read_capped(stderr, self.output_limit),
            );
            Ok::<_, std::io::Error>((status?, stdout?, stderr?))
        };
        let result = tokio::time::timeout(self.timeout, run).await;
        kill_process_group(pid);

        let Ok(result) = result else {
            warn!("Script exceeded {}s, killed", self.timeout.as_secs());
            return Err(SandboxError::timeout(self.timeout));
        };
        let (status, stdout, stderr) = result.map_err(|e| SandboxError::process(e.to_string()))?;

        if !status.success() {
            info!(status = %status, "Script exited unsuccessfully");
            let stderr = stderr.into_string();
            if !stderr.trim().is_empty() {
                debug!("stderr: {}", stderr.trim_end());
            }
        }
        if stdout.is_truncated() {
            warn!("Script output exceeded {} bytes, truncated", self.output_limit);
        }

        Ok(ExecutionOutcome {
            stdout: stdout.into_string(),
            artifacts: Vec::new(),
        })
    }
}

/// Drains a child pipe to EOF, keeping at most `limit` bytes.
async fn read_capped<R: AsyncRead + Unpin>(
    pipe: Option<R>,
    limit: usize,
) -> std::io::Result<CappedOutput> {
    let mut output = CappedOutput::new(limit);
    let Some(mut pipe) = pipe else {
        return Ok(output);
    };
    let mut chunk = [0u8; 8192];
    loop {
        let n = pipe.read(&mut chunk).await?;
        if n == 0 {
            return Ok(output);
        }
        output.push(&chunk[..n]);
    }
}

/// Kills whatever is left of the script's process group.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pgid) = pid.and_then(|pid| i32::try_from(pid).ok()).filter(|&pid| pid > 0) else {
        return;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to kill process group {}: {}", pgid, e),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
