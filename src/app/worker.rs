//! Background exchange-rate refresher.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use super::rates::ExchangeRateService;

/// Default refresh period: 30 minutes
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 1800;

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub interval: Duration,
    pub enabled: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            enabled: true,
        }
    }
}

impl RefreshConfig {
    pub fn from_env() -> Self {
        let secs = env::var("EXAEXP_EXCHANGE_RATE_REFRESH_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS);

        Self {
            interval: Duration::from_secs(secs),
            ..Default::default()
        }
    }
}

/// Spawn the periodic refresher.
///
/// The first refresh runs immediately. Send `true` on the returned channel to
/// stop the loop.
pub fn spawn_rate_refresher(
    service: Arc<ExchangeRateService>,
    config: RefreshConfig,
) -> (JoinHandle<()>, watch::Sender<bool>) {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        if !config.enabled {
            info!("Exchange rate refresher disabled");
            return;
        }

        info!(interval_secs = config.interval.as_secs(), "Exchange rate refresher started");
        let mut ticker = interval(config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = service.refresh().await;
                    if !report.failed_sources.is_empty() {
                        warn!(failed = ?report.failed_sources, "Exchange rate refresh incomplete");
                    } else {
                        debug!(?report, "Exchange rate refresh complete");
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Exchange rate refresher shutting down");
                        break;
                    }
                }
            }
        }
    });

    (handle, shutdown_tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::diagnostics::ErrorLog;
    use crate::app::rates::ExchangeRateStore;
    use crate::domain::CoinConfig;
    use crate::test_utils::MockRateSource;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_refresher_runs_and_stops() {
        let mut rates = BTreeMap::new();
        rates.insert("usd".to_string(), "0.5".to_string());
        let source = Arc::new(MockRateSource::returning("primary", rates));
        let store = Arc::new(ExchangeRateStore::new());
        let service = Arc::new(ExchangeRateService::new(
            Arc::new(CoinConfig::nexa().unwrap()),
            Arc::clone(&store),
            source.clone(),
            Arc::new(ErrorLog::new()),
        ));

        let (handle, shutdown) = spawn_rate_refresher(
            service,
            RefreshConfig {
                interval: Duration::from_millis(10),
                enabled: true,
            },
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.send(true).unwrap();
        handle.await.unwrap();

        assert!(source.call_count() >= 1);
        assert_eq!(store.rate("usd"), Some(dec!(0.5)));
    }

    #[tokio::test]
    async fn test_disabled_refresher_exits() {
        let source = Arc::new(MockRateSource::empty("primary"));
        let service = Arc::new(ExchangeRateService::new(
            Arc::new(CoinConfig::nexa().unwrap()),
            Arc::new(ExchangeRateStore::new()),
            source.clone(),
            Arc::new(ErrorLog::new()),
        ));

        let (handle, _shutdown) = spawn_rate_refresher(
            service,
            RefreshConfig {
                interval: Duration::from_millis(10),
                enabled: false,
            },
        );

        handle.await.unwrap();
        assert_eq!(source.call_count(), 0);
    }
}
