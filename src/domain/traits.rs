//! Domain traits defining contracts for external systems.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use super::error::AppError;
use super::types::IpDetails;

/// Exchange rate provider (primary or auxiliary)
#[async_trait]
pub trait ExchangeRateSource: Send + Sync {
    /// Short provider name used in logs and diagnostics
    fn name(&self) -> &str;

    /// Fetch `{code: rate}` pairs, keeping the provider's exact digits.
    ///
    /// `Ok(None)` means the provider answered but the payload held no rates.
    async fn fetch_rates(&self) -> Result<Option<BTreeMap<String, String>>, AppError>;
}

/// IP geolocation provider
#[async_trait]
pub trait GeoLocationProvider: Send + Sync {
    async fn lookup(&self, ip: &str) -> Result<IpDetails, AppError>;
}

/// Shared key/value cache with per-entry expiry
#[async_trait]
pub trait DistributedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AppError>;
}

/// Observer notified of cache activity
pub trait CacheEventHook: Send + Sync {
    fn on_hit(&self, key: &str);

    fn on_miss(&self, key: &str);

    fn on_set(&self, key: &str);

    fn on_error(&self, key: &str, error: &AppError) {
        let _ = (key, error);
    }
}
