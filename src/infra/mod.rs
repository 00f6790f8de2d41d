//! Infrastructure layer implementations.

pub mod cache;
pub mod exchange;
pub mod geo;

pub use cache::{CacheStats, RedisCache};
pub use exchange::{
    DEFAULT_EXTENDED_RATE_URL, DEFAULT_PRIMARY_RATE_URL, HttpExchangeRateSource,
    ResponseSelector, coingecko_simple_price, fx_rates_object,
};
pub use geo::IpStackClient;
