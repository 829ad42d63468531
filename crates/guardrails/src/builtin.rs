use warden_core::{Guardrail, GuardrailKind, GuardrailOrigin, Severity, WeightedKeyword, WeightedPattern};

/// The compiled-in guardrail set, registered at startup with
/// [`GuardrailOrigin::Static`].
pub fn builtin_guardrails() -> Vec<Guardrail> {
    vec![
        pii_blocker(),
        toxicity_detector(),
        prompt_injection_shield(),
        secrets_detector(),
    ]
}

fn pattern(pattern: &str, weight: f64) -> WeightedPattern {
    WeightedPattern {
        pattern: pattern.to_owned(),
        weight,
    }
}

fn keyword(keyword: &str, weight: f64) -> WeightedKeyword {
    WeightedKeyword {
        keyword: keyword.to_owned(),
        weight,
    }
}

/// Flags personally identifiable information: SSNs, card numbers, phone
/// numbers, email addresses.
pub fn pii_blocker() -> Guardrail {
    Guardrail {
        id: "pii_blocker".into(),
        name: "PII blocker".into(),
        description: "Flags social security numbers, payment card numbers, phone numbers, and email addresses".into(),
        metric_name: "pii_risk".into(),
        threshold: 0.5,
        invert_score: false,
        severity: Severity::High,
        kind: GuardrailKind::Regex {
            patterns: vec![
                pattern(r"\b\d{3}-\d{2}-\d{4}\b", 0.8),
                pattern(r"\b(?:\d[ -]*?){13,16}\b", 0.6),
                pattern(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b", 0.4),
                pattern(r"\b\(?\d{3}\)?[-. ]\d{3}[-. ]\d{4}\b", 0.3),
            ],
        },
        origin: GuardrailOrigin::Static,
    }
}

/// Flags abusive or threatening language via a weighted keyword list.
pub fn toxicity_detector() -> Guardrail {
    Guardrail {
        id: "toxicity_detector".into(),
        name: "Toxicity detector".into(),
        description: "Flags abusive, hateful, or threatening language".into(),
        metric_name: "toxicity".into(),
        threshold: 0.5,
        invert_score: false,
        severity: Severity::Medium,
        kind: GuardrailKind::Keyword {
            keywords: vec![
                keyword("hate", 2.0),
                keyword("kill", 3.0),
                keyword("stupid", 1.0),
                keyword("idiot", 1.0),
                keyword("worthless", 2.0),
                keyword("die", 2.0),
            ],
            ceiling: 5.0,
        },
        origin: GuardrailOrigin::Static,
    }
}

/// Flags instruction-override and prompt-extraction attempts in payloads.
pub fn prompt_injection_shield() -> Guardrail {
    Guardrail {
        id: "prompt_injection_shield".into(),
        name: "Prompt injection shield".into(),
        description: "Flags instruction-override and system-prompt extraction attempts".into(),
        metric_name: "injection_risk".into(),
        threshold: 0.5,
        invert_score: false,
        severity: Severity::High,
        kind: GuardrailKind::Regex {
            patterns: vec![
                pattern(r"(?i)ignore\s+(all\s+)?(previous|prior|above)\s+(instructions|prompts|rules)", 0.9),
                pattern(r"(?i)(reveal|show|print|repeat)\s+(your|the)\s+system\s+prompt", 0.9),
                pattern(r"(?i)you\s+are\s+now\s+(a|an|in)\b", 0.5),
                pattern(r"(?i)developer\s+mode", 0.6),
            ],
        },
        origin: GuardrailOrigin::Static,
    }
}

/// Flags credentials and private key material.
pub fn secrets_detector() -> Guardrail {
    Guardrail {
        id: "secrets_detector".into(),
        name: "Secrets detector".into(),
        description: "Flags API keys, bearer tokens, and private key material".into(),
        metric_name: "secrets_risk".into(),
        threshold: 0.5,
        invert_score: false,
        severity: Severity::Critical,
        kind: GuardrailKind::Regex {
            patterns: vec![
                pattern(r"-----BEGIN (RSA |EC |OPENSSH )?PRIVATE KEY-----", 1.0),
                pattern(r"\bAKIA[0-9A-Z]{16}\b", 0.9),
                pattern(r"(?i)\bbearer\s+[A-Za-z0-9\-._~+/]{20,}", 0.7),
                pattern(r"(?i)api[_-]?key\s*[:=]\s*\S{16,}", 0.7),
            ],
        },
        origin: GuardrailOrigin::Static,
    }
}
