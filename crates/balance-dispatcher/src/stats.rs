use std::sync::atomic::{AtomicU64, Ordering};

use balance_core::{DispatchOutcome, RejectReason};
use serde::Serialize;

/// Running totals of dispatch outcomes
#[derive(Debug, Default)]
pub struct DispatchStats {
    forwarded: AtomicU64,
    rejected_no_eligible: AtomicU64,
    rejected_forwarding_failure: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub forwarded: u64,
    pub rejected_no_eligible: u64,
    pub rejected_forwarding_failure: u64,
}

impl DispatchStats {
    pub fn record(&self, outcome: &DispatchOutcome) {
        let counter = match outcome {
            DispatchOutcome::Forwarded { .. } => &self.forwarded,
            DispatchOutcome::Rejected { reason: RejectReason::NoEligibleMachine } => {
                &self.rejected_no_eligible
            }
            DispatchOutcome::Rejected { reason: RejectReason::ForwardingFailure { .. } } => {
                &self.rejected_forwarding_failure
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            rejected_no_eligible: self.rejected_no_eligible.load(Ordering::Relaxed),
            rejected_forwarding_failure: self.rejected_forwarding_failure.load(Ordering::Relaxed),
        }
    }
}
