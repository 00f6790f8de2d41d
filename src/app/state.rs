//! Application state management.

use std::sync::Arc;

use crate::domain::{
    ChainEconomics, CoinConfig, DistributedCache, ExchangeRateSource, GeoLocationProvider,
};

use super::diagnostics::ErrorLog;
use super::formatter::{CurrencyFormatter, FormatterConfig};
use super::geo::GeoLocationService;
use super::miner::MinerResolver;
use super::rates::{ExchangeRateService, ExchangeRateStore, RateConfig};

/// Shared application state, built once at startup
#[derive(Clone)]
pub struct AppState {
    pub coin: Arc<CoinConfig>,
    pub errors: Arc<ErrorLog>,
    pub rate_store: Arc<ExchangeRateStore>,
    pub rate_service: Arc<ExchangeRateService>,
    pub formatter: Arc<CurrencyFormatter>,
    pub geo: Arc<GeoLocationService>,
    pub miner_resolver: Arc<MinerResolver>,
    pub economics: ChainEconomics,
}

impl AppState {
    /// Create state with no auxiliary rate sources, no distributed cache and
    /// no known pools
    #[must_use]
    pub fn new(
        coin: CoinConfig,
        primary_rates: Arc<dyn ExchangeRateSource>,
        geo_provider: Option<Arc<dyn GeoLocationProvider>>,
    ) -> Self {
        let coin = Arc::new(coin);
        let errors = Arc::new(ErrorLog::new());
        let rate_store = Arc::new(ExchangeRateStore::new());

        let rate_service = Arc::new(ExchangeRateService::new(
            Arc::clone(&coin),
            Arc::clone(&rate_store),
            primary_rates,
            Arc::clone(&errors),
        ));
        let formatter = Arc::new(CurrencyFormatter::new(
            Arc::clone(&coin),
            Arc::clone(&rate_store),
        ));
        let geo = Arc::new(GeoLocationService::new(geo_provider, Arc::clone(&errors)));
        let economics = ChainEconomics::new(coin.halving);

        Self {
            coin,
            errors,
            rate_store,
            rate_service,
            formatter,
            geo,
            miner_resolver: Arc::new(MinerResolver::new(Vec::new())),
            economics,
        }
    }

    /// Rebuild the rate service with auxiliary sources and config (builder pattern)
    #[must_use]
    pub fn with_rate_sources(
        mut self,
        primary: Arc<dyn ExchangeRateSource>,
        auxiliaries: Vec<Arc<dyn ExchangeRateSource>>,
        config: RateConfig,
    ) -> Self {
        let service = auxiliaries.into_iter().fold(
            ExchangeRateService::new(
                Arc::clone(&self.coin),
                Arc::clone(&self.rate_store),
                primary,
                Arc::clone(&self.errors),
            )
            .with_config(config),
            ExchangeRateService::with_auxiliary_source,
        );
        self.rate_service = Arc::new(service);
        self
    }

    #[must_use]
    pub fn with_formatter_config(mut self, config: FormatterConfig) -> Self {
        self.formatter = Arc::new(
            CurrencyFormatter::new(Arc::clone(&self.coin), Arc::clone(&self.rate_store))
                .with_config(config),
        );
        self
    }

    /// Rebuild the geolocation service with a distributed tier (builder pattern)
    #[must_use]
    pub fn with_geo(
        mut self,
        provider: Option<Arc<dyn GeoLocationProvider>>,
        distributed: Option<Arc<dyn DistributedCache>>,
        privacy_mode: bool,
    ) -> Self {
        let mut geo = GeoLocationService::new(provider, Arc::clone(&self.errors))
            .with_privacy_mode(privacy_mode);
        if let Some(cache) = distributed {
            geo = geo.with_distributed_cache(cache);
        }
        self.geo = Arc::new(geo);
        self
    }

    #[must_use]
    pub fn with_miner_resolver(mut self, resolver: MinerResolver) -> Self {
        self.miner_resolver = Arc::new(resolver);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockGeoProvider, MockRateSource};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_services_share_one_rate_store() {
        let mut rates = BTreeMap::new();
        rates.insert("usd".to_string(), "0.002".to_string());
        let state = AppState::new(
            CoinConfig::nexa().unwrap(),
            Arc::new(MockRateSource::returning("primary", rates)),
            Some(Arc::new(MockGeoProvider::new())),
        );

        state.rate_service.refresh().await;

        assert_eq!(state.rate_store.rate("usd"), Some(dec!(0.002)));
        assert_eq!(
            state.formatter.format_exchanged(dec!(100000), "usd").as_deref(),
            Some("$2")
        );
    }

    #[tokio::test]
    async fn test_with_geo_applies_privacy_mode() {
        let state = AppState::new(
            CoinConfig::nexa().unwrap(),
            Arc::new(MockRateSource::empty("primary")),
            None,
        )
        .with_geo(Some(Arc::new(MockGeoProvider::new())), None, true);

        assert!(!state.geo.lookups_enabled());
    }
}
