use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use warden_core::{Guardrail, GuardrailKind, GuardrailOrigin};

use crate::builtin::builtin_guardrails;
use crate::error::GuardrailError;

/// Catalog of static (compiled-in) and dynamic (runtime-registered)
/// guardrails.
///
/// Entries are immutable once published; replacing an id swaps the whole
/// `Arc<Guardrail>` atomically through the map entry, so concurrent readers
/// observe either the old or the new definition, never a mix.
pub struct GuardrailRegistry {
    entries: DashMap<String, Arc<Guardrail>>,
    repo_dir: Option<PathBuf>,
}

impl GuardrailRegistry {
    /// Create a registry pre-populated with the builtin guardrail set.
    pub fn with_builtins() -> Self {
        let registry = Self {
            entries: DashMap::new(),
            repo_dir: None,
        };
        for guardrail in builtin_guardrails() {
            registry.entries.insert(guardrail.id.clone(), Arc::new(guardrail));
        }
        registry
    }

    /// Create an empty registry (tests and embedded use).
    pub fn empty() -> Self {
        Self {
            entries: DashMap::new(),
            repo_dir: None,
        }
    }

    /// Enable JSON persistence of dynamic guardrails under `dir`.
    pub fn with_repo_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.repo_dir = Some(dir.into());
        self
    }

    /// Validate a guardrail definition without registering it.
    pub fn validate(guardrail: &Guardrail) -> Result<(), GuardrailError> {
        let invalid = |reason: &str| GuardrailError::Invalid {
            id: guardrail.id.clone(),
            reason: reason.to_owned(),
        };

        if guardrail.id.is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if guardrail.metric_name.is_empty() {
            return Err(invalid("metric_name must not be empty"));
        }
        if !(0.0..=1.0).contains(&guardrail.threshold) {
            return Err(invalid("threshold must be within [0, 1]"));
        }

        match &guardrail.kind {
            GuardrailKind::Regex { patterns } => {
                if patterns.is_empty() {
                    return Err(invalid("regex guardrail needs at least one pattern"));
                }
                for p in patterns {
                    regex::Regex::new(&p.pattern).map_err(|e| GuardrailError::Invalid {
                        id: guardrail.id.clone(),
                        reason: format!("pattern '{}' failed to compile: {e}", p.pattern),
                    })?;
                }
            }
            GuardrailKind::Keyword { keywords, ceiling } => {
                if keywords.is_empty() {
                    return Err(invalid("keyword guardrail needs at least one keyword"));
                }
                if *ceiling <= 0.0 {
                    return Err(invalid("keyword ceiling must be positive"));
                }
            }
            GuardrailKind::Hybrid {
                patterns, topic, ..
            } => {
                if patterns.is_empty() {
                    return Err(invalid("hybrid guardrail needs at least one pattern"));
                }
                if topic.is_empty() {
                    return Err(invalid("hybrid guardrail needs a topic anchor"));
                }
                for p in patterns {
                    regex::Regex::new(&p.pattern).map_err(|e| GuardrailError::Invalid {
                        id: guardrail.id.clone(),
                        reason: format!("pattern '{}' failed to compile: {e}", p.pattern),
                    })?;
                }
            }
            GuardrailKind::Smart {
                safe_examples,
                unsafe_examples,
                t_allow,
                t_block,
                ..
            } => {
                if safe_examples.is_empty() || unsafe_examples.is_empty() {
                    return Err(invalid(
                        "smart guardrail needs both safe and unsafe examples",
                    ));
                }
                if t_allow >= t_block {
                    return Err(invalid("smart guardrail requires t_allow < t_block"));
                }
            }
            GuardrailKind::LlmAssisted {
                prompt_template, ..
            } => {
                if prompt_template.is_empty() {
                    return Err(invalid("llm_assisted guardrail needs a prompt template"));
                }
            }
            GuardrailKind::DlmKernel { sigma, .. } => {
                if *sigma <= 0.0 {
                    return Err(invalid("dlm_kernel sigma must be positive"));
                }
            }
            GuardrailKind::Composite { dag } => {
                dag.validate().map_err(|e| GuardrailError::InvalidDag {
                    id: guardrail.id.clone(),
                    source: e,
                })?;
            }
        }

        Ok(())
    }

    /// Register or replace a guardrail. The swap is atomic per id.
    pub fn register(&self, guardrail: Guardrail) -> Result<(), GuardrailError> {
        Self::validate(&guardrail)?;
        debug!(guardrail_id = %guardrail.id, kind = guardrail.kind.type_tag(), "registering guardrail");
        self.entries
            .insert(guardrail.id.clone(), Arc::new(guardrail));
        Ok(())
    }

    /// Register a dynamic guardrail and persist it to the repo directory
    /// when one is configured. Registration is idempotent on id.
    pub fn register_dynamic(&self, mut guardrail: Guardrail) -> Result<(), GuardrailError> {
        guardrail.origin = GuardrailOrigin::Dynamic;
        Self::validate(&guardrail)?;

        if let Some(dir) = &self.repo_dir {
            persist(dir, &guardrail)?;
        }

        self.entries
            .insert(guardrail.id.clone(), Arc::new(guardrail));
        Ok(())
    }

    /// Look up a guardrail by id.
    pub fn get(&self, id: &str) -> Option<Arc<Guardrail>> {
        self.entries.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// All registered guardrails, sorted by id, static and dynamic merged.
    pub fn list(&self) -> Vec<Arc<Guardrail>> {
        let mut all: Vec<Arc<Guardrail>> = self
            .entries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Number of registered guardrails.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load persisted dynamic guardrails from the repo directory.
    ///
    /// Invalid files are skipped with a warning; a missing directory loads
    /// nothing. Returns the number of guardrails loaded.
    pub fn load_persisted(&self) -> Result<usize, GuardrailError> {
        let Some(dir) = &self.repo_dir else {
            return Ok(0);
        };
        if !dir.is_dir() {
            return Ok(0);
        }

        let entries = std::fs::read_dir(dir)
            .map_err(|e| GuardrailError::Persistence(format!("read {}: {e}", dir.display())))?;

        let mut loaded = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match load_file(&path) {
                Ok(mut guardrail) => {
                    guardrail.origin = GuardrailOrigin::Dynamic;
                    if let Err(e) = Self::validate(&guardrail) {
                        warn!(path = %path.display(), error = %e, "skipping invalid persisted guardrail");
                        continue;
                    }
                    self.entries
                        .insert(guardrail.id.clone(), Arc::new(guardrail));
                    loaded += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable persisted guardrail");
                }
            }
        }

        if loaded > 0 {
            info!(count = loaded, directory = %dir.display(), "loaded persisted guardrails");
        }
        Ok(loaded)
    }
}

fn load_file(path: &Path) -> Result<Guardrail, GuardrailError> {
    let bytes = std::fs::read(path)
        .map_err(|e| GuardrailError::Persistence(format!("read {}: {e}", path.display())))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| GuardrailError::Persistence(format!("parse {}: {e}", path.display())))
}

fn persist(dir: &Path, guardrail: &Guardrail) -> Result<(), GuardrailError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| GuardrailError::Persistence(format!("create {}: {e}", dir.display())))?;
    let path = dir.join(format!("{}.json", guardrail.id));
    let json = serde_json::to_vec_pretty(guardrail)
        .map_err(|e| GuardrailError::Persistence(e.to_string()))?;
    std::fs::write(&path, json)
        .map_err(|e| GuardrailError::Persistence(format!("write {}: {e}", path.display())))?;
    Ok(())
}

impl std::fmt::Debug for GuardrailRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardrailRegistry")
            .field("entries", &self.entries.len())
            .field("repo_dir", &self.repo_dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{CompositeNode, Severity, WeightedPattern};

    fn regex_guardrail(id: &str) -> Guardrail {
        Guardrail {
            id: id.into(),
            name: id.into(),
            description: String::new(),
            metric_name: "risk".into(),
            threshold: 0.5,
            invert_score: false,
            severity: Severity::Medium,
            kind: GuardrailKind::Regex {
                patterns: vec![WeightedPattern {
                    pattern: r"\btest\b".into(),
                    weight: 1.0,
                }],
            },
            origin: GuardrailOrigin::Dynamic,
        }
    }

    #[test]
    fn builtins_are_registered() {
        let registry = GuardrailRegistry::with_builtins();
        assert!(registry.get("pii_blocker").is_some());
        assert!(registry.get("toxicity_detector").is_some());
        assert!(registry.get("prompt_injection_shield").is_some());
        assert!(registry.get("secrets_detector").is_some());
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn list_is_sorted_by_id() {
        let registry = GuardrailRegistry::empty();
        registry.register(regex_guardrail("zeta")).unwrap();
        registry.register(regex_guardrail("alpha")).unwrap();
        let list = registry.list();
        let ids: Vec<&str> = list.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
    }

    #[test]
    fn replace_swaps_entry() {
        let registry = GuardrailRegistry::empty();
        registry.register(regex_guardrail("g")).unwrap();

        let mut replacement = regex_guardrail("g");
        replacement.threshold = 0.9;
        registry.register(replacement).unwrap();

        assert_eq!(registry.len(), 1);
        assert!((registry.get("g").unwrap().threshold - 0.9).abs() < 1e-9);
    }

    #[test]
    fn rejects_bad_regex() {
        let mut g = regex_guardrail("bad");
        g.kind = GuardrailKind::Regex {
            patterns: vec![WeightedPattern {
                pattern: "(unclosed".into(),
                weight: 1.0,
            }],
        };
        assert!(matches!(
            registry_err(g),
            GuardrailError::Invalid { .. }
        ));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut g = regex_guardrail("t");
        g.threshold = 1.5;
        assert!(matches!(registry_err(g), GuardrailError::Invalid { .. }));
    }

    #[test]
    fn rejects_smart_with_inverted_zones() {
        let mut g = regex_guardrail("s");
        g.kind = GuardrailKind::Smart {
            safe_examples: vec!["ok".into()],
            unsafe_examples: vec!["bad".into()],
            lexical_keywords: vec![],
            t_allow: 0.8,
            t_block: 0.3,
            embedding_weight: 0.6,
            lexical_weight: 0.4,
            review_blocks: None,
        };
        assert!(matches!(registry_err(g), GuardrailError::Invalid { .. }));
    }

    #[test]
    fn rejects_over_deep_composite() {
        let mut tree = CompositeNode::Leaf("a".into());
        for _ in 0..10 {
            tree = CompositeNode::Not(Box::new(tree));
        }
        let mut g = regex_guardrail("deep");
        g.kind = GuardrailKind::Composite { dag: tree };
        assert!(matches!(registry_err(g), GuardrailError::InvalidDag { .. }));
    }

    #[test]
    fn dynamic_registration_persists_and_reloads() {
        let dir = std::env::temp_dir().join(format!(
            "warden-guardrails-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));

        let registry = GuardrailRegistry::empty().with_repo_dir(&dir);
        registry.register_dynamic(regex_guardrail("persisted")).unwrap();
        assert!(dir.join("persisted.json").is_file());

        let fresh = GuardrailRegistry::empty().with_repo_dir(&dir);
        assert_eq!(fresh.load_persisted().unwrap(), 1);
        let loaded = fresh.get("persisted").unwrap();
        assert_eq!(loaded.origin, GuardrailOrigin::Dynamic);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_persisted_skips_invalid_files() {
        let dir = std::env::temp_dir().join(format!(
            "warden-guardrails-bad-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("junk.json"), b"not json").unwrap();
        std::fs::write(dir.join("ignored.txt"), b"whatever").unwrap();

        let registry = GuardrailRegistry::empty().with_repo_dir(&dir);
        assert_eq!(registry.load_persisted().unwrap(), 0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_repo_dir_loads_nothing() {
        let registry = GuardrailRegistry::empty().with_repo_dir("/nonexistent/warden");
        assert_eq!(registry.load_persisted().unwrap(), 0);
    }

    fn registry_err(g: Guardrail) -> GuardrailError {
        GuardrailRegistry::empty().register(g).unwrap_err()
    }
}
