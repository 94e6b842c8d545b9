//! RustBalance Dispatcher
//!
//! Routes each inbound request to one of a fixed set of networked machines,
//! round robin, skipping machines whose reported queue depth is at or above
//! the configured threshold.

pub mod api;
pub mod config;
pub mod cursor;
pub mod dispatcher;
pub mod stats;
pub mod store;
pub mod transport;

pub use config::DispatcherConfig;
pub use cursor::DispatchCursor;
pub use dispatcher::{Dispatcher, Selection};
pub use stats::{DispatchStats, StatsSnapshot};
pub use store::{MemoryQueueStore, QueueDepthStore, RedisQueueStore};
pub use transport::{ForwardRequest, Forwarder, HttpForwarder};
