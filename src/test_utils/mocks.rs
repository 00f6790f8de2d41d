//! Mock implementations for testing.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::domain::{
    AppError, CacheError, DistributedCache, ExchangeRateSource, ExternalServiceError,
    GeoLocationProvider, IpDetails,
};

/// Mock exchange-rate source returning a fixed table
pub struct MockRateSource {
    name: String,
    rates: Option<BTreeMap<String, String>>,
    next_failure: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl MockRateSource {
    #[must_use]
    pub fn returning(name: impl Into<String>, rates: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            rates: Some(rates),
            next_failure: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Source that answers with no rates
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            rates: None,
            ..Self::returning(name, BTreeMap::new())
        }
    }

    /// Make the next fetch fail with a network error
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.next_failure.lock().unwrap() = Some(message.into());
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExchangeRateSource for MockRateSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_rates(&self) -> Result<Option<BTreeMap<String, String>>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = self.next_failure.lock().unwrap().take() {
            return Err(ExternalServiceError::Network(message).into());
        }
        Ok(self.rates.clone())
    }
}

/// Mock geolocation provider synthesizing details from the IP
#[derive(Default)]
pub struct MockGeoProvider {
    delay: Option<Duration>,
    failing_ips: HashSet<String>,
    calls: AtomicUsize,
}

impl MockGeoProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before answering, to widen race windows
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn failing_for(mut self, ip: impl Into<String>) -> Self {
        self.failing_ips.insert(ip.into());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeoLocationProvider for MockGeoProvider {
    async fn lookup(&self, ip: &str) -> Result<IpDetails, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing_ips.contains(ip) {
            return Err(ExternalServiceError::ApiError {
                status_code: 429,
                message: format!("lookup limit reached for {ip}"),
            }
            .into());
        }

        let details = json!({
            "ip": ip,
            "city": "Mock City",
            "country_name": "Mockland",
            "latitude": 47.5,
            "longitude": 8.25,
        });
        match details {
            Value::Object(map) => Ok(IpDetails(map)),
            _ => Ok(IpDetails(Map::new())),
        }
    }
}

/// In-memory distributed cache recording TTLs
#[derive(Default)]
pub struct MockDistributedCache {
    entries: Mutex<HashMap<String, (String, Duration)>>,
    should_fail: bool,
    gets: AtomicUsize,
}

impl MockDistributedCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache whose reads and writes all fail
    #[must_use]
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Pre-populate a raw value
    pub fn seed(&self, key: impl Into<String>, raw: impl Into<String>) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.into(), (raw.into(), Duration::MAX));
    }

    pub fn entry(&self, key: &str) -> Option<(String, Duration)> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DistributedCache for MockDistributedCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(CacheError::Connection("connection refused".to_string()).into());
        }
        Ok(self.entry(key).map(|(raw, _)| raw))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AppError> {
        if self.should_fail {
            return Err(CacheError::Connection("connection refused".to_string()).into());
        }
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), ttl));
        Ok(())
    }
}
