//! Two-tier IP geolocation cache.
//!
//! Lookup order is the in-process memory tier, then the distributed tier, then
//! the external provider. Provider results are written back to both tiers.
//! Concurrent lookups of the same IP wait on a per-IP lock so the provider is
//! asked at most once.

use std::collections::{BTreeMap, HashSet};
use std::env;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use secrecy::SecretString;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::domain::{
    AppError, CacheError, DistributedCache, GeoLocationProvider, IpDetails, IpDetailsBatch,
};

use super::diagnostics::ErrorLog;
use super::rates::env_flag;

/// Entries live one year in both tiers
pub const GEO_CACHE_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Distributed-tier key prefix
pub const GEO_CACHE_KEY_PREFIX: &str = "ip-";

/// Geolocation settings read from the environment
#[derive(Debug, Clone, Default)]
pub struct GeoConfig {
    pub privacy_mode: bool,
    /// ipstack access key; lookups are disabled without it
    pub ipstack_key: Option<SecretString>,
}

impl GeoConfig {
    pub fn from_env() -> Self {
        Self {
            privacy_mode: env_flag("EXAEXP_PRIVACY_MODE"),
            ipstack_key: env::var("EXAEXP_IPSTACK_KEY")
                .ok()
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
        }
    }
}

pub struct GeoLocationService {
    memory: DashMap<String, IpDetails>,
    distributed: Option<Arc<dyn DistributedCache>>,
    provider: Option<Arc<dyn GeoLocationProvider>>,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
    privacy_mode: bool,
    ttl: Duration,
    errors: Arc<ErrorLog>,
}

impl GeoLocationService {
    /// Create a service; `provider` is `None` when no credential is configured
    pub fn new(provider: Option<Arc<dyn GeoLocationProvider>>, errors: Arc<ErrorLog>) -> Self {
        Self {
            memory: DashMap::new(),
            distributed: None,
            provider,
            in_flight: DashMap::new(),
            privacy_mode: false,
            ttl: GEO_CACHE_TTL,
            errors,
        }
    }

    /// Add the distributed tier (builder pattern)
    #[must_use]
    pub fn with_distributed_cache(mut self, cache: Arc<dyn DistributedCache>) -> Self {
        self.distributed = Some(cache);
        self
    }

    #[must_use]
    pub fn with_privacy_mode(mut self, privacy_mode: bool) -> Self {
        self.privacy_mode = privacy_mode;
        self
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Whether provider lookups are allowed at all
    pub fn lookups_enabled(&self) -> bool {
        !self.privacy_mode && self.provider.is_some()
    }

    /// Number of entries in the memory tier
    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    /// Resolve one IP through memory, distributed tier and provider.
    ///
    /// Provider failures are recorded and yield `None`.
    pub async fn resolve(&self, ip: &str) -> Option<IpDetails> {
        if !self.lookups_enabled() {
            return None;
        }

        if let Some(details) = self.memory.get(ip) {
            debug!(ip = %ip, "Geolocation memory hit");
            return Some(details.value().clone());
        }

        let lock = self
            .in_flight
            .entry(ip.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        let guard = lock.lock().await;
        let result = self.resolve_locked(ip).await;
        drop(guard);
        drop(lock);

        self.in_flight
            .remove_if(ip, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    /// Resolve a batch concurrently; failed IPs are simply absent from the result
    #[instrument(skip(self, ips), fields(count = ips.len()))]
    pub async fn resolve_batch(&self, ips: &[String]) -> IpDetailsBatch {
        let mut batch = IpDetailsBatch {
            ips: ips.to_vec(),
            details_by_ip: BTreeMap::new(),
        };

        if !self.lookups_enabled() {
            debug!(
                privacy_mode = self.privacy_mode,
                "Geolocation disabled, returning empty details"
            );
            return batch;
        }

        let mut seen = HashSet::new();
        let unique: Vec<&String> = ips.iter().filter(|ip| seen.insert(ip.as_str())).collect();

        let results = join_all(unique.into_iter().map(|ip| async move {
            let details = self.resolve(ip).await;
            (ip.clone(), details)
        }))
        .await;

        batch.details_by_ip = results
            .into_iter()
            .filter_map(|(ip, details)| details.map(|d| (ip, d)))
            .collect();

        info!(
            requested = ips.len(),
            resolved = batch.details_by_ip.len(),
            "Geolocation batch resolved"
        );
        batch
    }

    async fn resolve_locked(&self, ip: &str) -> Option<IpDetails> {
        // Another task may have filled the memory tier while we waited
        if let Some(details) = self.memory.get(ip) {
            return Some(details.value().clone());
        }

        let key = format!("{GEO_CACHE_KEY_PREFIX}{ip}");

        if let Some(details) = self.read_distributed(&key).await {
            debug!(ip = %ip, "Geolocation distributed hit");
            return Some(details);
        }

        let provider = self.provider.as_ref()?;
        match provider.lookup(ip).await {
            Ok(details) => {
                self.memory.insert(ip.to_string(), details.clone());
                self.write_distributed(&key, &details).await;
                Some(details)
            }
            Err(e) => {
                self.errors
                    .log_error("geo.lookup", &e, Some(json!({ "ip": ip })));
                None
            }
        }
    }

    async fn read_distributed(&self, key: &str) -> Option<IpDetails> {
        let cache = self.distributed.as_ref()?;
        match cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<IpDetails>(&raw) {
                Ok(details) => Some(details),
                Err(e) => {
                    let err = AppError::Cache(CacheError::Decode(e.to_string()));
                    self.errors
                        .log_error("geo.cache.decode", &err, Some(json!({ "key": key })));
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Distributed cache read failed, treating as miss");
                self.errors
                    .log_error("geo.cache.get", &e, Some(json!({ "key": key })));
                None
            }
        }
    }

    async fn write_distributed(&self, key: &str, details: &IpDetails) {
        let Some(cache) = self.distributed.as_ref() else {
            return;
        };
        let raw = match serde_json::to_string(details) {
            Ok(raw) => raw,
            Err(e) => {
                let err = AppError::Cache(CacheError::Decode(e.to_string()));
                self.errors.log_error("geo.cache.encode", &err, None);
                return;
            }
        };
        if let Err(e) = cache.set(key, &raw, self.ttl).await {
            self.errors
                .log_error("geo.cache.set", &e, Some(json!({ "key": key })));
        }
    }
}
