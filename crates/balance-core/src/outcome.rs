use serde::{Deserialize, Serialize};

/// Result of a single dispatch call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Forwarded { machine_id: String },
    Rejected { reason: RejectReason },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    /// Every machine in one full rotation was at or over the threshold, or unknown
    NoEligibleMachine,
    /// A machine was selected but the forward attempt failed
    ForwardingFailure { machine_id: String, reason: String },
}

impl DispatchOutcome {
    pub fn forwarded(machine_id: impl Into<String>) -> Self {
        Self::Forwarded {
            machine_id: machine_id.into(),
        }
    }

    pub fn no_eligible_machine() -> Self {
        Self::Rejected {
            reason: RejectReason::NoEligibleMachine,
        }
    }

    pub fn forwarding_failure(machine_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: RejectReason::ForwardingFailure {
                machine_id: machine_id.into(),
                reason: reason.into(),
            },
        }
    }

    pub fn is_forwarded(&self) -> bool {
        matches!(self, Self::Forwarded { .. })
    }

    pub fn machine_id(&self) -> Option<&str> {
        match self {
            Self::Forwarded { machine_id } => Some(machine_id.as_str()),
            Self::Rejected {
                reason: RejectReason::ForwardingFailure { machine_id, .. },
            } => Some(machine_id.as_str()),
            Self::Rejected { .. } => None,
        }
    }
}
