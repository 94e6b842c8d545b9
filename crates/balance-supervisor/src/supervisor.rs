//! Process Supervisor Module
//!
//! Keeps exactly `pool_size` worker processes alive. Each slot runs in its
//! own task that owns the child and waits on its exit; exits are reported to
//! the supervisory loop as [`WorkerEvent`]s and answered with a respawn.
//!
//! ```text
//! Spawning ──▶ Running ──▶ Exited
//!    ▲                        │
//!    └──────── respawn ───────┘
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::{EntryPoint, SupervisorConfig, WorkerPlan};
use crate::process::{exit_signal, ProcessManager};

/// Worker slot state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkerState {
    Spawning,
    Running,
    Exited,
}

/// How a worker process ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    pub exited_at: DateTime<Utc>,
}

/// A single Worker process managed by the Supervisor
#[derive(Debug, Clone, Serialize)]
pub struct WorkerProcess {
    pub worker_id: String,
    pub slot: usize,
    pub pid: Option<u32>,
    pub state: WorkerState,
    pub spawned_at: Option<DateTime<Utc>>,
    pub restart_count: u32,
    pub last_exit: Option<ExitInfo>,
}

impl WorkerProcess {
    fn new(plan: &WorkerPlan) -> Self {
        Self {
            worker_id: plan.worker_id.clone(),
            slot: plan.slot,
            pid: None,
            state: WorkerState::Spawning,
            spawned_at: None,
            restart_count: 0,
            last_exit: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == WorkerState::Running
    }
}

/// Notification from a slot task to the supervisory loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// The worker process terminated, normally or by signal
    Exited {
        slot: usize,
        pid: Option<u32>,
        code: Option<i32>,
        signal: Option<i32>,
        uptime: Duration,
    },
    /// No process could be created for the slot
    SpawnFailed { slot: usize, error: String },
}

type SharedWorkers = Arc<RwLock<Vec<WorkerProcess>>>;

/// Process Supervisor
pub struct Supervisor {
    config: SupervisorConfig,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    /// Spawn `pool_size` workers running `entry_point` and supervise them
    ///
    /// Returns as soon as the spawns are issued. Fails only when the pool is
    /// empty or the entry point cannot be resolved. Must be called from
    /// within a Tokio runtime.
    pub fn start(self, pool_size: usize, entry_point: EntryPoint) -> Result<SupervisorHandle> {
        if pool_size == 0 {
            anyhow::bail!("pool_size must be greater than 0");
        }

        let entry_point = entry_point
            .resolve()
            .context("Failed to resolve worker entry point")?;

        info!(
            "Starting {} worker(s): {} (restart policy: {})",
            pool_size, entry_point, self.config.restart_policy
        );

        let plans: Vec<WorkerPlan> = (0..pool_size)
            .map(|slot| WorkerPlan::new(slot, pool_size, entry_point.clone()))
            .collect();

        let workers: SharedWorkers = Arc::new(RwLock::new(
            plans.iter().map(WorkerProcess::new).collect(),
        ));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut supervisor_loop = SupervisorLoop {
            config: self.config,
            plans,
            workers: workers.clone(),
            events_tx,
            events_rx,
            shutdown_rx,
            slots: JoinSet::new(),
            crash_streaks: vec![0; pool_size],
        };

        for slot in 0..pool_size {
            supervisor_loop.launch(slot, Duration::ZERO);
        }

        let task = tokio::spawn(supervisor_loop.run());

        Ok(SupervisorHandle {
            pool_size,
            workers,
            shutdown_tx,
            task: Some(task),
        })
    }
}

/// Handle to a running supervisor
pub struct SupervisorHandle {
    pool_size: usize,
    workers: SharedWorkers,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SupervisorHandle {
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Number of slots whose process is currently running
    pub async fn live_count(&self) -> usize {
        self.workers.read().await.iter().filter(|w| w.is_running()).count()
    }

    /// Per-slot view of the pool
    pub async fn snapshot(&self) -> Vec<WorkerProcess> {
        self.workers.read().await.clone()
    }

    /// Respawns performed since startup, across all slots
    pub async fn total_restarts(&self) -> u64 {
        self.workers
            .read()
            .await
            .iter()
            .map(|w| u64::from(w.restart_count))
            .sum()
    }

    /// Wait until every slot is running, up to `timeout`
    pub async fn wait_until_full(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.live_count().await == self.pool_size {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Stop respawning and kill every worker
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Shutting down all workers...");
        let _ = self.shutdown_tx.send(true);

        if let Some(task) = self.task.take() {
            task.await.context("Supervisor loop panicked")?;
        }

        info!("All workers stopped");
        Ok(())
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        // Best effort; children are also killed when their handles drop
        let _ = self.shutdown_tx.send(true);
    }
}

struct SupervisorLoop {
    config: SupervisorConfig,
    plans: Vec<WorkerPlan>,
    workers: SharedWorkers,
    events_tx: mpsc::UnboundedSender<WorkerEvent>,
    events_rx: mpsc::UnboundedReceiver<WorkerEvent>,
    shutdown_rx: watch::Receiver<bool>,
    slots: JoinSet<()>,
    crash_streaks: Vec<u32>,
}

impl SupervisorLoop {
    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => break,
                Some(event) = self.events_rx.recv() => self.handle_event(event).await,
                Some(joined) = self.slots.join_next(), if !self.slots.is_empty() => {
                    if let Err(e) = joined {
                        error!("Worker slot task failed: {}", e);
                    }
                }
            }
        }

        // Slot tasks observe the same shutdown signal and kill their children
        while self.slots.join_next().await.is_some() {}
    }

    async fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Exited { slot, pid, code, signal, uptime } => {
                warn!(
                    "Worker {} (PID: {:?}) exited with code {:?} and signal {:?}, going to respawn",
                    self.plans[slot].worker_id, pid, code, signal
                );

                {
                    let mut workers = self.workers.write().await;
                    let worker = &mut workers[slot];
                    worker.state = WorkerState::Exited;
                    worker.pid = None;
                    worker.restart_count += 1;
                    worker.last_exit = Some(ExitInfo {
                        code,
                        signal,
                        exited_at: Utc::now(),
                    });
                }

                let policy = self.config.restart_policy;
                let streak = &mut self.crash_streaks[slot];
                if uptime >= policy.stable_after() {
                    *streak = 0;
                }
                *streak = streak.saturating_add(1);
                let delay = policy.delay_for(*streak);

                self.launch(slot, delay);
            }
            WorkerEvent::SpawnFailed { slot, error } => {
                error!(
                    "Failed to spawn {}: {}; retrying in {:?}",
                    self.plans[slot].worker_id, error, self.config.respawn_retry_delay
                );

                self.workers.write().await[slot].state = WorkerState::Exited;
                self.launch(slot, self.config.respawn_retry_delay);
            }
        }
    }

    /// Start the task that owns one slot's process
    fn launch(&mut self, slot: usize, delay: Duration) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        if *shutdown_rx.borrow() {
            return;
        }

        let plan = self.plans[slot].clone();
        let workers = self.workers.clone();
        let events_tx = self.events_tx.clone();

        self.slots.spawn(async move {
            if !delay.is_zero() {
                debug!("Respawning {} in {:?}", plan.worker_id, delay);
                tokio::select! {
                    _ = shutdown_rx.changed() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            workers.write().await[slot].state = WorkerState::Spawning;

            let mut process = match ProcessManager::spawn(&plan) {
                Ok(process) => process,
                Err(e) => {
                    let _ = events_tx.send(WorkerEvent::SpawnFailed {
                        slot,
                        error: format!("{:#}", e),
                    });
                    return;
                }
            };

            let pid = process.id();
            {
                let mut workers = workers.write().await;
                let worker = &mut workers[slot];
                worker.pid = pid;
                worker.state = WorkerState::Running;
                worker.spawned_at = Some(Utc::now());
            }
            info!("✓ {} started (PID: {:?})", plan.worker_id, pid);

            let started_at = Instant::now();
            tokio::select! {
                status = process.wait() => {
                    let (code, signal) = match status {
                        Ok(status) => (status.code(), exit_signal(&status)),
                        Err(e) => {
                            warn!("Lost track of {}: {:#}", plan.worker_id, e);
                            (None, None)
                        }
                    };
                    let _ = events_tx.send(WorkerEvent::Exited {
                        slot,
                        pid,
                        code,
                        signal,
                        uptime: started_at.elapsed(),
                    });
                }
                _ = shutdown_rx.changed() => {
                    debug!("Stopping {}...", plan.worker_id);
                    if let Err(e) = process.kill().await {
                        warn!("Failed to stop {}: {:#}", plan.worker_id, e);
                    }
                    let mut workers = workers.write().await;
                    workers[slot].state = WorkerState::Exited;
                    workers[slot].pid = None;
                }
            }
        });
    }
}
