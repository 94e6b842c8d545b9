//! Process Manager Module
//!
//! Handles the lifecycle of one Worker process.

use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::config::WorkerPlan;

/// Manages a single Worker process
pub struct ProcessManager {
    worker_id: String,
    child: Child,
}

impl ProcessManager {
    /// Spawn the process described by `plan`
    ///
    /// stdout and stderr are piped and re-emitted through `tracing`, tagged
    /// with the worker id. Must be called from within a Tokio runtime.
    pub fn spawn(plan: &WorkerPlan) -> Result<Self> {
        let mut cmd = Command::new(plan.program());
        cmd.args(plan.build_command_args())
            .envs(plan.build_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().with_context(|| {
            format!(
                "Failed to spawn worker {}: {}",
                plan.worker_id, plan.entry_point
            )
        })?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(plan.worker_id.clone(), stdout, false));
        }

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(plan.worker_id.clone(), stderr, true));
        }

        Ok(Self {
            worker_id: plan.worker_id.clone(),
            child,
        })
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Get the process ID (None once the process has been reaped)
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        self.child
            .wait()
            .await
            .with_context(|| format!("Failed to wait for worker {}", self.worker_id))
    }

    /// Kill the process and reap it
    pub async fn kill(&mut self) -> Result<()> {
        self.child
            .kill()
            .await
            .with_context(|| format!("Failed to kill worker {}", self.worker_id))
    }
}

/// Signal that terminated the process, if any
#[cfg(unix)]
pub fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
pub fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

async fn forward_lines<R>(worker_id: String, stream: R, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_stderr {
            warn!(worker = %worker_id, "[STDERR] {}", line);
        } else {
            info!(worker = %worker_id, "{}", line);
        }
    }
}
