pub mod builtin;
pub mod dag;
pub mod envelope;
pub mod error;
pub mod evaluator;
pub mod injection;
pub mod registry;

pub use dag::evaluate_dag;
pub use envelope::check_envelope;
pub use error::GuardrailError;
pub use evaluator::{EmbeddingStack, Evaluators, EvaluatorTimeouts};
pub use injection::detect_prompt_injection;
pub use registry::GuardrailRegistry;
