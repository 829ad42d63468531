pub mod circuit_breaker;
pub mod contract;
pub mod context;
pub mod dag;
pub mod guardrail;
pub mod payload;
pub mod result;

pub use circuit_breaker::{BreakerSet, CircuitBreaker, CircuitBreakerConfig, CircuitOpen, CircuitState};
pub use contract::{Contract, ContractStatus, EnforcementFlags, EnvelopeBound, EnvelopePhase};
pub use context::{CheckPhase, EnforcementContext};
pub use dag::{CompositeNode, DagError, MAX_DAG_DEPTH};
pub use guardrail::{
    Guardrail, GuardrailKind, GuardrailOrigin, Severity, WeightedKeyword, WeightedPattern,
};
pub use payload::CheckPayload;
pub use result::{DagDecision, DagOutcome, Decision, EvaluationResult, EvaluatorKind, Violation};
