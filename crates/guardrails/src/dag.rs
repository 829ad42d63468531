use std::collections::HashMap;
use std::time::Instant;

use tracing::debug;

use warden_core::{
    CheckPhase, CheckPayload, CompositeNode, DagDecision, DagOutcome, Decision, EvaluationResult,
    EvaluatorKind, GuardrailKind,
};

use crate::evaluator::Evaluators;
use crate::registry::GuardrailRegistry;

/// Evaluate a composite tree over one payload.
///
/// Pre-order walk with short-circuiting: AND stops at the first blocking
/// child, OR at the first allowing child, NOT flips its single child.
/// Skipped leaves (uncalibrated kernels and the like) act as the identity of
/// their parent operator; a node whose children all skip is itself a skip.
/// Short-circuited leaves never run, so they are absent from the result list.
///
/// Aggregated scores: AND takes the max child score, OR the min, NOT one
/// minus its child.
pub async fn evaluate_dag(
    node: &CompositeNode,
    registry: &GuardrailRegistry,
    evaluators: &Evaluators,
    payload: &CheckPayload,
    deadline: Instant,
    phase: CheckPhase,
) -> DagOutcome {
    let mut results = Vec::new();
    let (decision, score) = walk(
        node, registry, evaluators, payload, deadline, phase, &mut results,
    )
    .await;
    DagOutcome {
        decision,
        score,
        results,
    }
}

async fn walk(
    node: &CompositeNode,
    registry: &GuardrailRegistry,
    evaluators: &Evaluators,
    payload: &CheckPayload,
    deadline: Instant,
    phase: CheckPhase,
    results: &mut Vec<EvaluationResult>,
) -> (DagDecision, f64) {
    match node {
        CompositeNode::Leaf(id) => {
            evaluate_leaf(id, registry, evaluators, payload, deadline, phase, results).await
        }
        CompositeNode::And(children) => {
            let mut max_score = 0.0_f64;
            let mut saw_decided = false;
            for child in children {
                let (decision, score) = Box::pin(walk(
                    child, registry, evaluators, payload, deadline, phase, results,
                ))
                .await;
                match decision {
                    DagDecision::Block => {
                        debug!("AND short-circuit on block");
                        return (DagDecision::Block, max_score.max(score));
                    }
                    DagDecision::Allow => {
                        saw_decided = true;
                        max_score = max_score.max(score);
                    }
                    DagDecision::Skip => {}
                }
            }
            if saw_decided {
                (DagDecision::Allow, max_score)
            } else {
                (DagDecision::Skip, 0.0)
            }
        }
        CompositeNode::Or(children) => {
            let mut min_score = 1.0_f64;
            let mut saw_decided = false;
            for child in children {
                let (decision, score) = Box::pin(walk(
                    child, registry, evaluators, payload, deadline, phase, results,
                ))
                .await;
                match decision {
                    DagDecision::Allow => {
                        debug!("OR short-circuit on allow");
                        return (DagDecision::Allow, min_score.min(score));
                    }
                    DagDecision::Block => {
                        saw_decided = true;
                        min_score = min_score.min(score);
                    }
                    DagDecision::Skip => {}
                }
            }
            if saw_decided {
                (DagDecision::Block, min_score)
            } else {
                (DagDecision::Skip, 0.0)
            }
        }
        CompositeNode::Not(child) => {
            let (decision, score) = Box::pin(walk(
                child, registry, evaluators, payload, deadline, phase, results,
            ))
            .await;
            match decision {
                DagDecision::Allow => (DagDecision::Block, 1.0 - score),
                DagDecision::Block => (DagDecision::Allow, 1.0 - score),
                DagDecision::Skip => (DagDecision::Skip, 0.0),
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn evaluate_leaf(
    id: &str,
    registry: &GuardrailRegistry,
    evaluators: &Evaluators,
    payload: &CheckPayload,
    deadline: Instant,
    phase: CheckPhase,
    results: &mut Vec<EvaluationResult>,
) -> (DagDecision, f64) {
    let Some(guardrail) = registry.get(id) else {
        // A contract referencing an unregistered guardrail is a policy
        // configuration error; failing open here would silently disable
        // enforcement.
        results.push(EvaluationResult {
            guardrail_id: id.to_owned(),
            decision: Decision::Block,
            raw_score: 1.0,
            effective_score: 1.0,
            metrics: HashMap::new(),
            latency_ms: 0,
            evaluator: EvaluatorKind::Composite,
            fallback_used: false,
            skipped: false,
            reason: Some("guardrail_not_found".to_owned()),
            error: Some(format!("guardrail '{id}' is not registered")),
        });
        return (DagDecision::Block, 1.0);
    };

    // A composite guardrail referenced as a leaf expands into its own tree.
    if let GuardrailKind::Composite { dag } = &guardrail.kind {
        return Box::pin(walk(
            dag, registry, evaluators, payload, deadline, phase, results,
        ))
        .await;
    }

    let result = evaluators
        .evaluate(&guardrail, payload, deadline, phase)
        .await;
    let decision = if result.skipped {
        DagDecision::Skip
    } else {
        match result.decision {
            Decision::Block => DagDecision::Block,
            Decision::Allow => DagDecision::Allow,
        }
    };
    let score = result.effective_score;
    results.push(result);
    (decision, score)
}
