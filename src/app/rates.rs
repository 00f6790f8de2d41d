//! Exchange rate aggregation.
//!
//! A primary provider supplies the base `{code: rate}` table. When the coin
//! has extended units, auxiliary providers supply USD-relative factors which
//! are multiplied by the primary `usd` rate and layered on top. The live table
//! is swapped atomically, so readers never observe a partial update.

use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::domain::{
    AppError, CoinConfig, ExchangeRateSource, ExchangeRateTable, ExternalServiceError,
};

use super::diagnostics::ErrorLog;

/// Rate every derived (extended) entry is computed against
pub const BASE_RATE_KEY: &str = "usd";

/// Live exchange-rate table shared by the formatter and the refresher
#[derive(Debug, Default)]
pub struct ExchangeRateStore {
    table: ArcSwapOption<ExchangeRateTable>,
}

impl ExchangeRateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a table
    #[must_use]
    pub fn with_table(table: ExchangeRateTable) -> Self {
        let store = Self::new();
        store.replace(table);
        store
    }

    /// Current table, if any refresh ever succeeded
    pub fn snapshot(&self) -> Option<Arc<ExchangeRateTable>> {
        self.table.load_full()
    }

    pub fn rate(&self, code: &str) -> Option<Decimal> {
        self.snapshot().and_then(|table| table.rate(code))
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot().map(|table| table.updated_at)
    }

    /// Swap in a whole new table
    pub fn replace(&self, table: ExchangeRateTable) {
        self.table.store(Some(Arc::new(table)));
    }
}

/// Whether and how rates are refreshed
#[derive(Debug, Clone, Default)]
pub struct RateConfig {
    /// Privacy mode disables every outbound request
    pub privacy_mode: bool,
    /// Operator opted out of exchange rates
    pub no_rates: bool,
}

impl RateConfig {
    pub fn from_env() -> Self {
        Self {
            privacy_mode: env_flag("EXAEXP_PRIVACY_MODE"),
            no_rates: env_flag("EXAEXP_NO_RATES"),
        }
    }

    pub fn enabled(&self) -> bool {
        !self.privacy_mode && !self.no_rates
    }
}

pub(crate) fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

/// Outcome of one `refresh` cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Refresh was disabled by configuration
    pub skipped: bool,
    /// Primary table was replaced
    pub primary_updated: bool,
    /// Codes derived from auxiliary providers this cycle
    pub derived_codes: Vec<String>,
    /// Providers that failed this cycle
    pub failed_sources: Vec<String>,
}

/// Refreshes the shared [`ExchangeRateStore`] from its providers
pub struct ExchangeRateService {
    coin: Arc<CoinConfig>,
    store: Arc<ExchangeRateStore>,
    primary: Arc<dyn ExchangeRateSource>,
    auxiliaries: Vec<Arc<dyn ExchangeRateSource>>,
    config: RateConfig,
    errors: Arc<ErrorLog>,
}

impl ExchangeRateService {
    pub fn new(
        coin: Arc<CoinConfig>,
        store: Arc<ExchangeRateStore>,
        primary: Arc<dyn ExchangeRateSource>,
        errors: Arc<ErrorLog>,
    ) -> Self {
        Self {
            coin,
            store,
            primary,
            auxiliaries: Vec::new(),
            config: RateConfig::default(),
            errors,
        }
    }

    /// Add an auxiliary provider for extended rates (builder pattern)
    #[must_use]
    pub fn with_auxiliary_source(mut self, source: Arc<dyn ExchangeRateSource>) -> Self {
        self.auxiliaries.push(source);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: RateConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<ExchangeRateStore> {
        &self.store
    }

    /// Fetch the primary table, then derive extended rates.
    ///
    /// Any primary failure leaves the previous table in place.
    #[instrument(skip(self), fields(primary = %self.primary.name()))]
    pub async fn refresh(&self) -> RefreshReport {
        let mut report = RefreshReport::default();

        if !self.config.enabled() {
            debug!(
                privacy_mode = self.config.privacy_mode,
                no_rates = self.config.no_rates,
                "Exchange rate refresh disabled"
            );
            report.skipped = true;
            return report;
        }

        match self.fetch_primary().await {
            Ok(rates) => {
                info!(count = rates.len(), "Using exchange rates");
                self.store.replace(ExchangeRateTable::new(rates));
                report.primary_updated = true;
            }
            Err(e) => {
                self.errors.log_error(
                    "rates.primary",
                    &e,
                    Some(json!({ "source": self.primary.name() })),
                );
                report.failed_sources.push(self.primary.name().to_string());
                return report;
            }
        }

        if self.coin.has_extended_units() && !self.auxiliaries.is_empty() {
            self.refresh_extended(&mut report).await;
        }

        report
    }

    async fn fetch_primary(&self) -> Result<BTreeMap<String, Decimal>, AppError> {
        let raw = self.primary.fetch_rates().await?.ok_or_else(|| {
            ExternalServiceError::ParseError(format!(
                "{} returned no exchange rates",
                self.primary.name()
            ))
        })?;
        parse_rates(&raw)
    }

    async fn refresh_extended(&self, report: &mut RefreshReport) {
        for source in &self.auxiliaries {
            let Some(current) = self.store.snapshot() else {
                return;
            };
            let Some(usd) = current.rate(BASE_RATE_KEY) else {
                debug!("No usd rate available, skipping extended rates");
                return;
            };

            let derived = match source.fetch_rates().await {
                Ok(Some(raw)) if !raw.is_empty() => {
                    parse_rates(&raw).and_then(|factors| derive_from_usd(usd, factors))
                }
                Ok(_) => {
                    debug!(source = %source.name(), "Unable to get extended exchange rate data");
                    continue;
                }
                Err(e) => Err(e),
            };

            match derived {
                Ok(derived) => {
                    report.derived_codes.extend(derived.keys().cloned());
                    info!(
                        source = %source.name(),
                        count = derived.len(),
                        "Using extended exchange rates"
                    );
                    self.store.replace(current.merged_with(derived));
                }
                Err(e) => {
                    warn!(source = %source.name(), error = %e, "Auxiliary rate source failed");
                    self.errors.log_error(
                        "rates.extended",
                        &e,
                        Some(json!({ "source": source.name() })),
                    );
                    report.failed_sources.push(source.name().to_string());
                }
            }
        }
    }
}

/// Scale each factor by the usd rate; an overflow rejects the whole payload
fn derive_from_usd(
    usd: Decimal,
    factors: BTreeMap<String, Decimal>,
) -> Result<BTreeMap<String, Decimal>, AppError> {
    factors
        .into_iter()
        .map(|(code, factor)| {
            usd.checked_mul(factor).map(|rate| (code.clone(), rate)).ok_or_else(|| {
                AppError::ExternalService(ExternalServiceError::ParseError(format!(
                    "extended rate for {code} overflows: {usd} * {factor}"
                )))
            })
        })
        .collect()
}

/// Parse provider rate strings exactly; one bad entry rejects the payload
fn parse_rates(raw: &BTreeMap<String, String>) -> Result<BTreeMap<String, Decimal>, AppError> {
    raw.iter()
        .map(|(code, value)| {
            Decimal::from_str(value)
                .or_else(|_| Decimal::from_scientific(value))
                .map(|rate| (code.to_lowercase(), rate))
                .map_err(|_| {
                    AppError::ExternalService(ExternalServiceError::ParseError(format!(
                        "invalid rate for {code}: {value}"
                    )))
                })
        })
        .collect()
}
