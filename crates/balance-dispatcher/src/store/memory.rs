use async_trait::async_trait;
use dashmap::DashMap;

use super::QueueDepthStore;

/// In-process queue depth store
///
/// Useful for static deployments and tests; depths are set directly.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    depths: DashMap<String, u64>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_depths<I, K>(depths: I) -> Self
    where
        I: IntoIterator<Item = (K, u64)>,
        K: Into<String>,
    {
        let store = Self::new();
        for (machine_id, depth) in depths {
            store.set(machine_id, depth);
        }
        store
    }

    pub fn set(&self, machine_id: impl Into<String>, depth: u64) {
        self.depths.insert(machine_id.into(), depth);
    }

    pub fn remove(&self, machine_id: &str) {
        self.depths.remove(machine_id);
    }
}

#[async_trait]
impl QueueDepthStore for MemoryQueueStore {
    async fn get(&self, machine_id: &str) -> balance_core::Result<Option<u64>> {
        Ok(self.depths.get(machine_id).map(|depth| *depth))
    }
}
