use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "utoipa")]
use utoipa::ToSchema;

use crate::contract::Contract;

/// Which side of the exchange is being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum CheckPhase {
    /// Pre-request: the caller's payload before it reaches upstream.
    Input,
    /// Post-response: the upstream payload before it reaches the caller.
    Output,
}

impl CheckPhase {
    /// True for the request-side phase.
    pub fn is_request(self) -> bool {
        matches!(self, Self::Input)
    }
}

impl std::fmt::Display for CheckPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// Per-request enforcement context threaded through the pipeline.
///
/// Carries identity (trace, tenant, contract), the resolved contract
/// snapshot, and the absolute deadline every downstream I/O call must honor.
#[derive(Debug, Clone)]
pub struct EnforcementContext {
    /// Unique id for this request, echoed in responses and telemetry.
    pub trace_id: String,
    /// Tenant fingerprint derived from the caller credential.
    pub tenant_id: String,
    /// Contract the request is enforced against.
    pub contract_id: String,
    /// Resolved contract snapshot (immutable for the request lifetime).
    pub contract: Option<Arc<Contract>>,
    /// Absolute deadline for all work on this request.
    pub deadline: Instant,
}

impl EnforcementContext {
    /// Create a context with a fresh trace id and the given total budget.
    pub fn new(tenant_id: impl Into<String>, contract_id: impl Into<String>, budget: Duration) -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            contract_id: contract_id.into(),
            contract: None,
            deadline: Instant::now() + budget,
        }
    }

    /// Remaining time before the deadline, zero if already expired.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Whether the request deadline has passed.
    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}
