use std::collections::HashMap;

use warden_core::{CheckPhase, EnvelopeBound, Violation};

/// Check extracted metric values against a contract's envelope bounds.
///
/// The envelope is a filter, not a schema: bounds for metrics no evaluator
/// produced are silently ignored, and only bounds whose phase matches the
/// phase under evaluation apply. Every out-of-range metric yields one
/// violation; any violation means block.
pub fn check_envelope(
    envelope: &HashMap<String, EnvelopeBound>,
    metrics: &HashMap<String, f64>,
    phase: CheckPhase,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    for (metric, bound) in envelope {
        if !bound.applies_to(phase.is_request()) {
            continue;
        }
        let Some(value) = metrics.get(metric) else {
            continue;
        };
        if *value < bound.min || *value > bound.max {
            violations.push(Violation {
                metric: metric.clone(),
                value: *value,
                min: Some(bound.min),
                max: Some(bound.max),
                severity: bound.severity,
                phase,
                detail: None,
            });
        }
    }

    violations.sort_by(|a, b| a.metric.cmp(&b.metric));
    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{EnvelopePhase, Severity};

    fn bound(min: f64, max: f64, phase: EnvelopePhase) -> EnvelopeBound {
        EnvelopeBound {
            min,
            max,
            phase,
            severity: Severity::High,
        }
    }

    #[test]
    fn in_range_metric_passes() {
        let envelope = HashMap::from([(
            "hipaa_compliance".to_owned(),
            bound(0.8, 1.0, EnvelopePhase::Both),
        )]);
        let metrics = HashMap::from([("hipaa_compliance".to_owned(), 0.9)]);
        assert!(check_envelope(&envelope, &metrics, CheckPhase::Output).is_empty());
    }

    #[test]
    fn below_min_violates_with_bounds() {
        let envelope = HashMap::from([(
            "hipaa_compliance".to_owned(),
            bound(0.8, 1.0, EnvelopePhase::Both),
        )]);
        let metrics = HashMap::from([("hipaa_compliance".to_owned(), 0.6)]);

        let violations = check_envelope(&envelope, &metrics, CheckPhase::Output);
        assert_eq!(violations.len(), 1);
        let v = &violations[0];
        assert_eq!(v.metric, "hipaa_compliance");
        assert!((v.value - 0.6).abs() < 1e-9);
        assert_eq!(v.min, Some(0.8));
        assert_eq!(v.max, Some(1.0));
        assert_eq!(v.phase, CheckPhase::Output);
    }

    #[test]
    fn above_max_violates() {
        let envelope = HashMap::from([("pii_risk".to_owned(), bound(0.0, 0.3, EnvelopePhase::Both))]);
        let metrics = HashMap::from([("pii_risk".to_owned(), 0.9)]);
        assert_eq!(check_envelope(&envelope, &metrics, CheckPhase::Input).len(), 1);
    }

    #[test]
    fn boundary_values_pass() {
        let envelope = HashMap::from([("m".to_owned(), bound(0.2, 0.8, EnvelopePhase::Both))]);
        for value in [0.2, 0.8] {
            let metrics = HashMap::from([("m".to_owned(), value)]);
            assert!(check_envelope(&envelope, &metrics, CheckPhase::Input).is_empty());
        }
    }

    #[test]
    fn missing_metric_is_ignored() {
        let envelope = HashMap::from([("absent".to_owned(), bound(0.8, 1.0, EnvelopePhase::Both))]);
        let metrics = HashMap::from([("present".to_owned(), 0.1)]);
        assert!(check_envelope(&envelope, &metrics, CheckPhase::Input).is_empty());
    }

    #[test]
    fn phase_filter_applies() {
        let envelope = HashMap::from([(
            "resp_only".to_owned(),
            bound(0.8, 1.0, EnvelopePhase::Response),
        )]);
        let metrics = HashMap::from([("resp_only".to_owned(), 0.1)]);

        assert!(check_envelope(&envelope, &metrics, CheckPhase::Input).is_empty());
        assert_eq!(
            check_envelope(&envelope, &metrics, CheckPhase::Output).len(),
            1
        );
    }

    #[test]
    fn multiple_violations_sorted_by_metric() {
        let envelope = HashMap::from([
            ("b_metric".to_owned(), bound(0.5, 1.0, EnvelopePhase::Both)),
            ("a_metric".to_owned(), bound(0.5, 1.0, EnvelopePhase::Both)),
        ]);
        let metrics = HashMap::from([
            ("a_metric".to_owned(), 0.1),
            ("b_metric".to_owned(), 0.2),
        ]);

        let violations = check_envelope(&envelope, &metrics, CheckPhase::Input);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].metric, "a_metric");
        assert_eq!(violations[1].metric, "b_metric");
    }
}
