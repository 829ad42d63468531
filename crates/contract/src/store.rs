use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use warden_cache::{CacheStore, get_json, set_json};
use warden_core::{CircuitBreaker, Contract, ContractStatus};

use crate::error::{ContractError, SourceError};
use crate::source::ContractSource;

/// Resolves contract ids to validated, immutable contract snapshots.
///
/// Resolution is read-through: cache first, then the configured source. A
/// fetched document is validated (active status, unexpired, digest present)
/// before being cached and returned; validation re-runs on cache hits so a
/// contract that expires mid-TTL stops resolving. Source failures count
/// against the shared circuit breaker, and while the circuit is open every
/// resolve fails fast with `Unavailable`.
pub struct ContractStore {
    cache: Arc<dyn CacheStore>,
    source: Arc<dyn ContractSource>,
    breaker: Arc<CircuitBreaker>,
    contract_ttl: Duration,
}

impl ContractStore {
    /// Create a store over the given cache, source, and breaker.
    pub fn new(
        cache: Arc<dyn CacheStore>,
        source: Arc<dyn ContractSource>,
        breaker: Arc<CircuitBreaker>,
        contract_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            source,
            breaker,
            contract_ttl,
        }
    }

    fn cache_key(id: &str) -> String {
        format!("contract:{id}")
    }

    /// Resolve a contract by id.
    pub async fn resolve(&self, id: &str) -> Result<Arc<Contract>, ContractError> {
        // Cache read errors are treated as misses: never a bypass, never a
        // stale serve.
        match get_json::<Contract>(self.cache.as_ref(), &Self::cache_key(id)).await {
            Ok(Some(contract)) => {
                debug!(contract_id = %id, "contract served from cache");
                return Self::validate(contract).map(Arc::new);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(contract_id = %id, error = %e, "contract cache read failed, treating as miss");
            }
        }

        self.breaker.try_acquire()?;

        let fetched = match self.source.fetch(id).await {
            Ok(fetched) => {
                self.breaker.record_success();
                fetched
            }
            Err(e) => {
                self.breaker.record_failure();
                return Err(match e {
                    SourceError::Timeout => {
                        ContractError::Unavailable("contract source timed out".to_owned())
                    }
                    other => ContractError::Unavailable(other.to_string()),
                });
            }
        };

        let Some(contract) = fetched else {
            return Err(ContractError::NotFound(id.to_owned()));
        };

        let contract = Self::validate(contract)?;

        if let Err(e) = set_json(
            self.cache.as_ref(),
            &Self::cache_key(id),
            &contract,
            self.contract_ttl,
        )
        .await
        {
            warn!(contract_id = %id, error = %e, "contract cache write failed");
        }

        Ok(Arc::new(contract))
    }

    /// Validate a fetched document. Distinguishes revoked and expired from
    /// generally invalid so callers can report them separately.
    fn validate(contract: Contract) -> Result<Contract, ContractError> {
        match contract.status {
            ContractStatus::Revoked => return Err(ContractError::Revoked(contract.id)),
            ContractStatus::Expired => return Err(ContractError::Expired(contract.id)),
            ContractStatus::Draft => {
                return Err(ContractError::Invalid {
                    id: contract.id,
                    reason: "contract is a draft".to_owned(),
                });
            }
            ContractStatus::Active => {}
        }

        let now = Utc::now();
        if now >= contract.expires_at {
            return Err(ContractError::Expired(contract.id));
        }
        if now < contract.issued_at {
            return Err(ContractError::Invalid {
                id: contract.id,
                reason: "contract is not yet in its validity window".to_owned(),
            });
        }
        if contract.policy_digest.is_empty() {
            return Err(ContractError::Invalid {
                id: contract.id,
                reason: "contract has an empty policy digest".to_owned(),
            });
        }

        if let Some(dag) = &contract.dag {
            if let Err(e) = dag.validate() {
                return Err(ContractError::Invalid {
                    id: contract.id,
                    reason: e.to_string(),
                });
            }
        }

        Ok(contract)
    }
}

impl std::fmt::Debug for ContractStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractStore")
            .field("contract_ttl", &self.contract_ttl)
            .finish_non_exhaustive()
    }
}
