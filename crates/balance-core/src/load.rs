//! Load Threshold and Queue Depth Samples
//!
//! A machine is eligible for new work only when its freshly observed queue
//! depth is strictly below the threshold. Unknown load is never treated as
//! empty.

use serde::{Deserialize, Serialize};

/// Default `MAX` queue depth
pub const DEFAULT_MAX_QUEUE_DEPTH: u64 = 250;

/// Queue depth at or above which a machine receives no new work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadThreshold(u64);

impl LoadThreshold {
    pub fn new(max: u64) -> Self {
        Self(max)
    }

    pub fn max(&self) -> u64 {
        self.0
    }

    /// `depth < MAX`
    pub fn admits(&self, depth: u64) -> bool {
        depth < self.0
    }
}

impl Default for LoadThreshold {
    fn default() -> Self {
        Self(DEFAULT_MAX_QUEUE_DEPTH)
    }
}

/// One machine's queue depth, read at dispatch time and then discarded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDepthSample {
    pub machine_id: String,
    /// `None` when the store has no usable value
    pub depth: Option<u64>,
}

impl QueueDepthSample {
    pub fn known(machine_id: impl Into<String>, depth: u64) -> Self {
        Self {
            machine_id: machine_id.into(),
            depth: Some(depth),
        }
    }

    pub fn unknown(machine_id: impl Into<String>) -> Self {
        Self {
            machine_id: machine_id.into(),
            depth: None,
        }
    }

    /// Build a sample from a raw store value
    ///
    /// Missing, non-numeric and negative values all become unknown.
    pub fn from_raw(machine_id: impl Into<String>, raw: Option<&str>) -> Self {
        let depth = raw.and_then(|value| value.trim().parse::<u64>().ok());
        Self {
            machine_id: machine_id.into(),
            depth,
        }
    }

    pub fn is_eligible(&self, threshold: LoadThreshold) -> bool {
        match self.depth {
            Some(depth) => threshold.admits(depth),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_boundary() {
        let threshold = LoadThreshold::new(250);
        assert!(threshold.admits(249));
        assert!(!threshold.admits(250));
        assert!(!threshold.admits(251));
    }

    #[test]
    fn test_unknown_sample_is_never_eligible() {
        let sample = QueueDepthSample::unknown("m1");
        assert!(!sample.is_eligible(LoadThreshold::new(u64::MAX)));
    }

    #[test]
    fn test_from_raw() {
        assert_eq!(QueueDepthSample::from_raw("m1", Some(" 42 ")).depth, Some(42));
        assert_eq!(QueueDepthSample::from_raw("m1", Some("-3")).depth, None);
        assert_eq!(QueueDepthSample::from_raw("m1", Some("busy")).depth, None);
        assert_eq!(QueueDepthSample::from_raw("m1", None).depth, None);
    }

    #[test]
    fn test_known_sample_eligibility() {
        let threshold = LoadThreshold::default();
        assert!(QueueDepthSample::known("m1", 0).is_eligible(threshold));
        assert!(!QueueDepthSample::known("m1", DEFAULT_MAX_QUEUE_DEPTH).is_eligible(threshold));
    }
}
