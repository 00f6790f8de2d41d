//! Application entry point.
//!
//! Wires the providers into [`AppState`] and keeps the exchange-rate table
//! fresh until shutdown.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use rpc_explorer_core::app::{
    AppState, FormatterConfig, GeoConfig, MinerResolver, RateConfig, RefreshConfig,
    spawn_rate_refresher,
};
use rpc_explorer_core::domain::{
    CoinConfig, DistributedCache, ExchangeRateSource, GeoLocationProvider,
};
use rpc_explorer_core::infra::{
    CacheStats, DEFAULT_EXTENDED_RATE_URL, DEFAULT_PRIMARY_RATE_URL, HttpExchangeRateSource,
    IpStackClient, RedisCache,
};

/// Application configuration
struct ExplorerConfig {
    coin: CoinConfig,
    /// CoinGecko id of the coin in `simple/price` responses
    coingecko_id: String,
    primary_rate_url: String,
    extended_rate_url: String,
    redis_url: Option<String>,
    mining_pools_path: Option<String>,
    rates: RateConfig,
    geo: GeoConfig,
    refresh: RefreshConfig,
    formatter: FormatterConfig,
}

impl ExplorerConfig {
    fn from_env() -> Result<Self> {
        let ticker = env::var("EXAEXP_COIN").unwrap_or_else(|_| "NEXA".to_string());
        let coin = CoinConfig::by_ticker(&ticker)
            .with_context(|| format!("EXAEXP_COIN={ticker} is not a supported coin"))?;

        Ok(Self {
            coin,
            coingecko_id: env::var("EXAEXP_COINGECKO_ID")
                .unwrap_or_else(|_| "nexacoin".to_string()),
            primary_rate_url: env::var("EXAEXP_PRIMARY_RATE_URL")
                .unwrap_or_else(|_| DEFAULT_PRIMARY_RATE_URL.to_string()),
            extended_rate_url: env::var("EXAEXP_EXTENDED_RATE_URL")
                .unwrap_or_else(|_| DEFAULT_EXTENDED_RATE_URL.to_string()),
            redis_url: env::var("EXAEXP_REDIS_URL").ok().filter(|v| !v.is_empty()),
            mining_pools_path: env::var("EXAEXP_MINING_POOLS_PATH")
                .ok()
                .filter(|v| !v.is_empty()),
            rates: RateConfig::from_env(),
            geo: GeoConfig::from_env(),
            refresh: RefreshConfig::from_env(),
            formatter: FormatterConfig::from_env(),
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,redis=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    info!("RPC explorer core v{}", env!("CARGO_PKG_VERSION"));

    let config = ExplorerConfig::from_env()?;
    info!(coin = %config.coin.name, ticker = %config.coin.ticker, "Coin configuration loaded");

    // Exchange rates
    let primary: Arc<dyn ExchangeRateSource> = Arc::new(
        HttpExchangeRateSource::coingecko(&config.primary_rate_url, &config.coingecko_id)
            .context("Failed to build primary exchange rate source")?,
    );
    let extended_codes: Vec<&str> = config
        .coin
        .units()
        .iter()
        .filter(|unit| unit.is_extended_rate)
        .filter_map(|unit| unit.rate_key())
        .collect();
    let auxiliaries: Vec<Arc<dyn ExchangeRateSource>> = if extended_codes.is_empty() {
        Vec::new()
    } else {
        vec![Arc::new(
            HttpExchangeRateSource::fx_rates(&config.extended_rate_url, &extended_codes)
                .context("Failed to build extended exchange rate source")?,
        )]
    };
    if !config.rates.enabled() {
        info!(
            privacy_mode = config.rates.privacy_mode,
            no_rates = config.rates.no_rates,
            "Exchange rates disabled"
        );
    }

    // Geolocation
    let geo_provider: Option<Arc<dyn GeoLocationProvider>> = match &config.geo.ipstack_key {
        Some(key) => Some(Arc::new(
            IpStackClient::new(key.clone(), None).context("Failed to build ipstack client")?,
        )),
        None => {
            info!("EXAEXP_IPSTACK_KEY not set, geolocation disabled");
            None
        }
    };

    let cache_stats = Arc::new(CacheStats::new());
    let distributed: Option<Arc<dyn DistributedCache>> = match &config.redis_url {
        Some(url) => match RedisCache::connect(url).await {
            Ok(cache) => Some(Arc::new(
                cache
                    .with_namespace("rpc-explorer")
                    .with_hook(cache_stats.clone()),
            )),
            Err(e) => {
                warn!(error = %e, "Redis unavailable, geolocation uses the memory tier only");
                None
            }
        },
        None => None,
    };

    let mut app_state = AppState::new(config.coin, Arc::clone(&primary), None)
        .with_rate_sources(primary, auxiliaries, config.rates)
        .with_formatter_config(config.formatter)
        .with_geo(geo_provider, distributed, config.geo.privacy_mode);

    // Mining pools
    if let Some(path) = &config.mining_pools_path {
        let resolver = MinerResolver::from_file(path)
            .await
            .with_context(|| format!("Failed to load mining pools from {path}"))?;
        app_state = app_state.with_miner_resolver(resolver);
    }

    let app_state = Arc::new(app_state);

    let (refresher_handle, shutdown_tx) =
        spawn_rate_refresher(Arc::clone(&app_state.rate_service), config.refresh);

    shutdown_signal().await;

    info!("Shutting down");
    if shutdown_tx.send(true).is_err() {
        warn!("Exchange rate refresher already stopped");
    }
    if let Err(e) = refresher_handle.await {
        warn!(error = %e, "Exchange rate refresher task failed");
    }

    info!(
        errors = app_state.errors.total_errors(),
        cache_hits = cache_stats.hits(),
        cache_misses = cache_stats.misses(),
        "Shutdown complete"
    );

    Ok(())
}
