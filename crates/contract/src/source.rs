use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use warden_core::Contract;

use crate::error::SourceError;

/// Backend that materializes contract documents by id.
///
/// `Ok(None)` means the id does not exist; transport and parse failures are
/// errors so the store can count them against the circuit breaker.
#[async_trait]
pub trait ContractSource: Send + Sync {
    /// Fetch the contract document for `id`.
    async fn fetch(&self, id: &str) -> Result<Option<Contract>, SourceError>;
}

/// Contract source backed by an HTTP contract-registry endpoint.
///
/// Fetches `GET {base_url}/contracts/{id}` with optional bearer auth.
pub struct HttpContractSource {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpContractSource {
    /// Create a source for the registry at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            auth_token,
        })
    }
}

#[async_trait]
impl ContractSource for HttpContractSource {
    async fn fetch(&self, id: &str) -> Result<Option<Contract>, SourceError> {
        let url = format!("{}/contracts/{id}", self.base_url);
        debug!(%url, "fetching contract");

        let mut request = self.client.get(&url);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout
            } else {
                SourceError::Http(e.to_string())
            }
        })?;

        match response.status().as_u16() {
            404 => Ok(None),
            status if (200..300).contains(&status) => {
                let contract: Contract = response
                    .json()
                    .await
                    .map_err(|e| SourceError::Parse(e.to_string()))?;
                Ok(Some(contract))
            }
            status => Err(SourceError::Status(status)),
        }
    }
}

impl std::fmt::Debug for HttpContractSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpContractSource")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Contract source reading `{id}.json` documents from a local directory.
///
/// Intended for development and air-gapped deployments where the registry is
/// synced to disk out-of-band.
#[derive(Debug)]
pub struct DirContractSource {
    dir: PathBuf,
}

impl DirContractSource {
    /// Create a source reading from `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ContractSource for DirContractSource {
    async fn fetch(&self, id: &str) -> Result<Option<Contract>, SourceError> {
        // Ids come from request headers; refuse anything path-like.
        if id.contains('/') || id.contains('\\') || id.contains("..") {
            return Ok(None);
        }
        let path = self.dir.join(format!("{id}.json"));
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SourceError::Io(e)),
        };
        let contract: Contract =
            serde_json::from_slice(&bytes).map_err(|e| SourceError::Parse(e.to_string()))?;
        Ok(Some(contract))
    }
}

/// In-memory contract source for tests and wiring examples.
#[derive(Debug, Default)]
pub struct StaticContractSource {
    contracts: HashMap<String, Contract>,
    fail: std::sync::atomic::AtomicBool,
    fetches: std::sync::atomic::AtomicUsize,
}

impl StaticContractSource {
    /// Create a source serving the given contracts.
    pub fn new(contracts: Vec<Contract>) -> Self {
        Self {
            contracts: contracts.into_iter().map(|c| (c.id.clone(), c)).collect(),
            fail: std::sync::atomic::AtomicBool::new(false),
            fetches: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Make subsequent fetches fail (simulated outage).
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, std::sync::atomic::Ordering::Relaxed);
    }

    /// Number of fetch calls that reached this source.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[async_trait]
impl ContractSource for StaticContractSource {
    async fn fetch(&self, id: &str) -> Result<Option<Contract>, SourceError> {
        self.fetches
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        if self.fail.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(SourceError::Http("simulated outage".to_owned()));
        }
        Ok(self.contracts.get(id).cloned())
    }
}
