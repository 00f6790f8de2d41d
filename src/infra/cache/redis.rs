//! Redis implementation of the distributed cache tier.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, info, instrument, warn};

use crate::domain::{AppError, CacheError, CacheEventHook, DistributedCache};

/// Running hit/miss/set/error counters, usable as a [`CacheEventHook`]
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    errors: AtomicU64,
}

impl CacheStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn sets(&self) -> u64 {
        self.sets.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Fraction of reads that hit, `None` before the first read
    pub fn hit_ratio(&self) -> Option<f64> {
        let hits = self.hits();
        let reads = hits + self.misses();
        (reads > 0).then(|| hits as f64 / reads as f64)
    }
}

impl CacheEventHook for CacheStats {
    fn on_hit(&self, _key: &str) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn on_miss(&self, _key: &str) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn on_set(&self, _key: &str) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    fn on_error(&self, _key: &str, _error: &AppError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Distributed cache backed by a reconnecting Redis connection
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
    namespace: Option<String>,
    hook: Option<Arc<dyn CacheEventHook>>,
}

impl RedisCache {
    /// Connect to `redis_url`
    pub async fn connect(redis_url: &str) -> Result<Self, AppError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| CacheError::Connection(e.to_string()))?;
        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        info!("Connected to Redis");
        Ok(Self::from_connection(connection))
    }

    pub fn from_connection(connection: ConnectionManager) -> Self {
        Self {
            connection,
            namespace: None,
            hook: None,
        }
    }

    /// Prefix every key with `<namespace>:` (builder pattern)
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn CacheEventHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    fn namespaced(&self, key: &str) -> String {
        namespaced_key(self.namespace.as_deref(), key)
    }

    fn report_error(&self, key: &str, error: &AppError) {
        warn!(key = %key, error = %error, "Redis command failed");
        if let Some(hook) = &self.hook {
            hook.on_error(key, error);
        }
    }
}

fn namespaced_key(namespace: Option<&str>, key: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}:{key}"),
        _ => key.to_string(),
    }
}

/// Redis `SETEX` takes whole seconds and rejects zero
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl DistributedCache for RedisCache {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let full_key = self.namespaced(key);
        let mut connection = self.connection.clone();

        let value = match connection.get::<_, Option<String>>(&full_key).await {
            Ok(value) => value,
            Err(e) => {
                let error = AppError::from(CacheError::Command(e.to_string()));
                self.report_error(key, &error);
                return Err(error);
            }
        };

        if let Some(hook) = &self.hook {
            match value {
                Some(_) => hook.on_hit(key),
                None => hook.on_miss(key),
            }
        }
        debug!(key = %full_key, hit = value.is_some(), "Redis get");
        Ok(value)
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AppError> {
        let full_key = self.namespaced(key);
        let mut connection = self.connection.clone();

        if let Err(e) = connection
            .set_ex::<_, _, ()>(&full_key, value, ttl_seconds(ttl))
            .await
        {
            let error = AppError::from(CacheError::Command(e.to_string()));
            self.report_error(key, &error);
            return Err(error);
        }

        if let Some(hook) = &self.hook {
            hook.on_set(key);
        }
        debug!(key = %full_key, ttl_secs = ttl_seconds(ttl), "Redis set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaced_key() {
        assert_eq!(namespaced_key(Some("explorer"), "ip-1.2.3.4"), "explorer:ip-1.2.3.4");
        assert_eq!(namespaced_key(Some(""), "ip-1.2.3.4"), "ip-1.2.3.4");
        assert_eq!(namespaced_key(None, "ip-1.2.3.4"), "ip-1.2.3.4");
    }

    #[test]
    fn test_ttl_rounds_down_to_at_least_one_second() {
        assert_eq!(ttl_seconds(Duration::from_millis(200)), 1);
        assert_eq!(ttl_seconds(Duration::from_secs(365 * 24 * 60 * 60)), 31_536_000);
    }

    #[test]
    fn test_cache_stats_counts_events() {
        let stats = CacheStats::new();
        assert_eq!(stats.hit_ratio(), None);

        stats.on_hit("a");
        stats.on_hit("a");
        stats.on_miss("b");
        stats.on_set("b");
        stats.on_error("c", &AppError::from(CacheError::Command("READONLY".to_string())));

        assert_eq!(stats.hits(), 2);
        assert_eq!(stats.misses(), 1);
        assert_eq!(stats.sets(), 1);
        assert_eq!(stats.errors(), 1);
        assert!((stats.hit_ratio().unwrap() - 2.0 / 3.0).abs() < f64::EPSILON);
    }
}
