//! Application layer: services built on the domain types and shared state.

pub mod diagnostics;
pub mod formatter;
pub mod geo;
pub mod miner;
pub mod rates;
pub mod state;
pub mod worker;

pub use diagnostics::{ErrorLog, ErrorRecord, ErrorReport, ErrorSiteStats};
pub use formatter::{CurrencyFormatter, FormatOutcome, FormatterConfig, MissingRatePolicy};
pub use geo::{GeoConfig, GeoLocationService};
pub use miner::{
    AttributionRule, BlockHashRule, CoinbaseTagRule, MinerResolver, PayoutAddressRule,
};
pub use rates::{ExchangeRateService, ExchangeRateStore, RateConfig, RefreshReport};
pub use state::AppState;
pub use worker::{RefreshConfig, spawn_rate_refresher};
