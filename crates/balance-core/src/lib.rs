//! RustBalance Core
//!
//! Shared types for the local process supervisor and the queue-aware
//! network dispatcher: the machine registry, load samples, pool sizing,
//! dispatch outcomes, errors, and logging/config bootstrap.

pub mod config;
pub mod error;
pub mod load;
pub mod logging;
pub mod outcome;
pub mod pool;
pub mod registry;

pub use error::{Error, Result};
pub use load::{LoadThreshold, QueueDepthSample};
pub use logging::{init_logging, LoggingConfig};
pub use outcome::{DispatchOutcome, RejectReason};
pub use pool::PoolSizePolicy;
pub use registry::{parse_registry, MachineEntry, MachineRegistry};
