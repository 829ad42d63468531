use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "utoipa")]
use utoipa::ToSchema;

use crate::dag::CompositeNode;
use crate::guardrail::Severity;

/// Lifecycle status of a contract document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    /// Authored but not yet enforceable.
    Draft,
    /// Enforceable within its validity window.
    Active,
    /// Withdrawn by the issuer — never enforceable again.
    Revoked,
    /// Past its validity window.
    Expired,
}

impl std::fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Active => write!(f, "active"),
            Self::Revoked => write!(f, "revoked"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Which payload phase an envelope bound applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum EnvelopePhase {
    /// Checked against metrics extracted from the request payload.
    Request,
    /// Checked against metrics extracted from the response payload.
    Response,
    /// Checked against both phases.
    #[default]
    Both,
}

/// Acceptable range for one extracted metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
pub struct EnvelopeBound {
    /// Inclusive lower bound.
    pub min: f64,
    /// Inclusive upper bound.
    pub max: f64,
    /// Phase the bound applies to. Defaults to both phases.
    #[serde(default)]
    pub phase: EnvelopePhase,
    /// Severity attached to violations of this bound.
    #[serde(default = "default_envelope_severity")]
    pub severity: Severity,
}

fn default_envelope_severity() -> Severity {
    Severity::High
}

impl EnvelopeBound {
    /// Whether this bound applies when evaluating the given phase.
    pub fn applies_to(&self, request_phase: bool) -> bool {
        match self.phase {
            EnvelopePhase::Both => true,
            EnvelopePhase::Request => request_phase,
            EnvelopePhase::Response => !request_phase,
        }
    }
}

/// Which sides of the exchange the contract enforces.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
pub struct EnforcementFlags {
    /// Evaluate guardrails over the request payload before forwarding.
    #[serde(default = "default_true")]
    pub check_on_request: bool,
    /// Evaluate guardrails over the response payload before replying.
    #[serde(default = "default_true")]
    pub check_on_response: bool,
}

fn default_true() -> bool {
    true
}

impl Default for EnforcementFlags {
    fn default() -> Self {
        Self {
            check_on_request: true,
            check_on_response: true,
        }
    }
}

/// An immutable, versioned policy contract.
///
/// Contracts are authored out-of-band and resolved by id. A new version of a
/// policy receives a new id; a loaded `Contract` is never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(ToSchema))]
pub struct Contract {
    /// Opaque contract identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Industry tag (e.g. `healthcare`).
    #[serde(default)]
    pub industry: Option<String>,
    /// Opaque integrity token for the policy content.
    pub policy_digest: String,
    /// Issuance timestamp (start of the validity window).
    pub issued_at: DateTime<Utc>,
    /// Expiry timestamp (end of the validity window).
    pub expires_at: DateTime<Utc>,
    /// Lifecycle status.
    pub status: ContractStatus,
    /// Which phases are enforced.
    #[serde(default)]
    pub enforcement: EnforcementFlags,
    /// Flat list of guardrail references, combined with AND when no explicit
    /// composite tree is given.
    #[serde(default)]
    pub guardrails: Vec<String>,
    /// Optional explicit AND/OR/NOT composition over guardrail references.
    #[serde(default)]
    #[cfg_attr(feature = "utoipa", schema(value_type = Option<Object>))]
    pub dag: Option<CompositeNode>,
    /// Envelope constraints: metric name to acceptable range.
    #[serde(default)]
    pub envelope: HashMap<String, EnvelopeBound>,
    /// Unknown document fields, preserved for forward compatibility.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    #[cfg_attr(feature = "utoipa", schema(value_type = Object))]
    pub extensions: serde_json::Map<String, serde_json::Value>,
}

impl Contract {
    /// A contract is active iff its status is `Active` and `now` falls inside
    /// the `[issued_at, expires_at]` window.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ContractStatus::Active && now >= self.issued_at && now < self.expires_at
    }

    /// The composite tree to evaluate: the explicit DAG when present,
    /// otherwise an AND over the flat guardrail list.
    pub fn effective_dag(&self) -> CompositeNode {
        match &self.dag {
            Some(node) => node.clone(),
            None => CompositeNode::And(
                self.guardrails
                    .iter()
                    .map(|id| CompositeNode::Leaf(id.clone()))
                    .collect(),
            ),
        }
    }
}
