//! RustBalance Supervisor
//!
//! Forks one worker process per available core and respawns any that exit.

pub mod config;
pub mod process;
pub mod supervisor;

pub use config::{EntryPoint, RestartPolicy, SupervisorArgs, SupervisorConfig, WorkerPlan};
pub use process::ProcessManager;
pub use supervisor::{
    ExitInfo, Supervisor, SupervisorHandle, WorkerEvent, WorkerProcess, WorkerState,
};
