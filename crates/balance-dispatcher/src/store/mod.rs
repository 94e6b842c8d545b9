//! Queue Depth Store
//!
//! Read side of the shared key/value store in which every machine publishes
//! its own in-flight queue depth. Writers are the machines themselves.

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;

pub use memory::MemoryQueueStore;
pub use redis_store::RedisQueueStore;

#[async_trait]
pub trait QueueDepthStore: Send + Sync {
    /// Current depth for `machine_id`, or `None` when the store holds no
    /// usable entry
    async fn get(&self, machine_id: &str) -> balance_core::Result<Option<u64>>;
}
