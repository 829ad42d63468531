use warden_embedding::l2_distance_squared;

use super::{EmbeddingStack, Scored};

/// Multi-anchor RBF kernel scoring.
///
/// `K(x, a) = exp(-||x - a||^2 / (2 sigma^2))`; risk is the unsafe kernel
/// mass over the total kernel mass. A guardrail with no calibrated anchors
/// (or no embedding backend to embed the payload) is skipped, never blocked.
pub(crate) async fn score(
    embedding: Option<&EmbeddingStack>,
    safe_anchors: &[Vec<f32>],
    unsafe_anchors: &[Vec<f32>],
    sigma: f64,
    text: &str,
) -> Scored {
    if safe_anchors.is_empty() || unsafe_anchors.is_empty() {
        return Scored::skip("not_calibrated");
    }
    let Some(stack) = embedding else {
        return Scored::skip("embedding_unavailable");
    };
    let Some(payload) = stack.payload_embedding(text).await else {
        return Scored::skip("embedding_unavailable");
    };

    let unsafe_mass = kernel_mass(&payload, unsafe_anchors, sigma);
    let safe_mass = kernel_mass(&payload, safe_anchors, sigma);
    let total = unsafe_mass + safe_mass;

    if total <= f64::EPSILON {
        // Payload is far from every anchor; the kernel carries no signal.
        return Scored::skip("out_of_kernel_support");
    }

    Scored::plain(unsafe_mass / total)
}

fn kernel_mass(x: &[f32], anchors: &[Vec<f32>], sigma: f64) -> f64 {
    let denom = 2.0 * sigma * sigma;
    anchors
        .iter()
        .map(|anchor| {
            let d2 = f64::from(l2_distance_squared(x, anchor));
            if d2.is_finite() { (-d2 / denom).exp() } else { 0.0 }
        })
        .sum()
}
