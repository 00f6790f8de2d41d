//! Domain layer containing core types, pure calculations, traits, and error definitions.

pub mod coins;
pub mod display;
pub mod economics;
pub mod error;
pub mod precision;
pub mod scale;
pub mod traits;
pub mod types;

pub use coins::{CoinConfig, UnitLookup};
pub use economics::{ChainEconomics, difficulty};
pub use error::{
    AppError, CacheError, CodecError, ConfigError, ExternalServiceError, ScaleError,
};
pub use scale::{EXPONENT_SCALES, ExponentScale, UNIT_SCALE_INDEX};
pub use traits::{CacheEventHook, DistributedCache, ExchangeRateSource, GeoLocationProvider};
pub use types::{
    CurrencyUnit, ExchangeRateTable, FormattedAmount, HalvingSchedule, IpDetails, IpDetailsBatch,
    MinerInfo, PoolConfig, PoolMetadata, ScriptPubKey, Transaction, TxInput, TxOutput, TxTotals,
    UnitConversion, UnitPrice,
};
