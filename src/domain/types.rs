//! Domain types shared by the formatter, aggregators and resolvers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// CURRENCY UNITS
// ============================================================================

/// How a currency unit is derived from the coin's base (smallest) unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnitConversion {
    /// Fixed multiplier applied to a raw base-unit amount
    Native { multiplier: Decimal },
    /// Live exchange rate looked up by `rate_key` in the rate table
    Exchanged { rate_key: String },
}

/// A display unit configured for a coin (e.g. NEX, sat, USD, EUR)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrencyUnit {
    pub name: String,
    pub conversion: UnitConversion,
    pub decimal_places: u32,
    /// Alternative spellings accepted by lookups (matched case-insensitively)
    pub aliases: Vec<String>,
    /// Rate is derived from the USD rate and an auxiliary provider
    pub is_extended_rate: bool,
    /// Display prefix for exchanged amounts
    pub symbol: Option<String>,
}

impl CurrencyUnit {
    #[must_use]
    pub fn native(name: &str, multiplier: Decimal, decimal_places: u32, aliases: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            conversion: UnitConversion::Native { multiplier },
            decimal_places,
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            is_extended_rate: false,
            symbol: None,
        }
    }

    #[must_use]
    pub fn exchanged(name: &str, rate_key: &str, decimal_places: u32, aliases: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            conversion: UnitConversion::Exchanged {
                rate_key: rate_key.to_lowercase(),
            },
            decimal_places,
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            is_extended_rate: false,
            symbol: None,
        }
    }

    /// Mark this exchanged unit as derived from an auxiliary provider (builder pattern)
    #[must_use]
    pub fn extended(mut self) -> Self {
        self.is_extended_rate = true;
        self
    }

    #[must_use]
    pub fn with_symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }

    pub fn is_native(&self) -> bool {
        matches!(self.conversion, UnitConversion::Native { .. })
    }

    /// Whether `candidate` names this unit (name or alias, case-insensitive)
    pub fn matches(&self, candidate: &str) -> bool {
        self.name.eq_ignore_ascii_case(candidate)
            || self
                .aliases
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(candidate))
    }

    /// Rate table key for exchanged units
    pub fn rate_key(&self) -> Option<&str> {
        match &self.conversion {
            UnitConversion::Exchanged { rate_key } => Some(rate_key),
            UnitConversion::Native { .. } => None,
        }
    }
}

/// Halving schedule used for issuance and block reward calculations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HalvingSchedule {
    /// Subsidy of the first interval, in base units
    pub initial_subsidy: u64,
    /// Number of blocks between halvings
    pub halving_interval: u64,
    /// Base units per whole coin
    pub base_units_per_coin: u64,
    /// Fractional digits used when rendering issuance in whole coins
    pub display_decimal_places: u32,
}

// ============================================================================
// FORMATTED VALUES
// ============================================================================

/// Display-ready amount produced by the currency formatter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedAmount {
    /// Display value, truncated to the configured maximum fractional digits
    pub val: String,
    /// Full-precision value with thousands separators
    pub simple_val: String,
    /// Name of the unit the amount was rendered in
    pub currency_unit: String,
    /// Digits cut from `val`; `val + less_significant_digits == simple_val`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub less_significant_digits: Option<String>,
}

impl FormattedAmount {
    /// Reassemble the full-precision string from the display split
    pub fn reconstruct(&self) -> String {
        match &self.less_significant_digits {
            Some(rest) => format!("{}{}", self.val, rest),
            None => self.val.clone(),
        }
    }
}

/// Price of one exchanged unit expressed in base units (e.g. "1,234 sat/$")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPrice {
    pub amount: String,
    pub unit: String,
}

// ============================================================================
// EXCHANGE RATES
// ============================================================================

/// Snapshot of coin -> fiat (or other) exchange rates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeRateTable {
    /// Lowercase currency code -> rate per whole coin
    pub rates: BTreeMap<String, Decimal>,
    pub updated_at: DateTime<Utc>,
}

impl ExchangeRateTable {
    #[must_use]
    pub fn new(rates: BTreeMap<String, Decimal>) -> Self {
        Self {
            rates,
            updated_at: Utc::now(),
        }
    }

    pub fn rate(&self, code: &str) -> Option<Decimal> {
        self.rates.get(&code.to_lowercase()).copied()
    }

    /// Copy of this table with `derived` entries layered on top
    #[must_use]
    pub fn merged_with(&self, derived: BTreeMap<String, Decimal>) -> Self {
        let mut rates = self.rates.clone();
        rates.extend(derived);
        Self::new(rates)
    }
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

/// Transaction as returned by `getrawtransaction` (verbose)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Transaction {
    pub txid: String,
    #[serde(default)]
    pub blockhash: Option<String>,
    #[serde(default)]
    pub vin: Vec<TxInput>,
    #[serde(default)]
    pub vout: Vec<TxOutput>,
}

impl Transaction {
    /// A coinbase transaction has no inputs besides coinbase inputs
    pub fn is_coinbase(&self) -> bool {
        self.vin.iter().all(TxInput::is_coinbase)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TxInput {
    /// Hex-encoded coinbase script, present only on coinbase inputs
    #[serde(default)]
    pub coinbase: Option<String>,
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub vout: Option<u32>,
    #[serde(default, with = "rust_decimal::serde::arbitrary_precision_option")]
    pub value: Option<Decimal>,
}

impl TxInput {
    pub fn is_coinbase(&self) -> bool {
        self.coinbase.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TxOutput {
    /// Output value in whole coins
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub value: Decimal,
    #[serde(default)]
    pub n: u32,
    #[serde(rename = "scriptPubKey", default)]
    pub script_pub_key: ScriptPubKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ScriptPubKey {
    #[serde(default)]
    pub asm: String,
    #[serde(default)]
    pub hex: String,
    #[serde(rename = "type", default)]
    pub script_type: String,
    #[serde(default)]
    pub addresses: Vec<String>,
}

/// Summed input and output values of a transaction, in whole coins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxTotals {
    pub input: Decimal,
    pub output: Decimal,
}

// ============================================================================
// MINING POOLS
// ============================================================================

/// Metadata merged into a `MinerInfo` when a pool rule matches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PoolMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Any other pool fields, carried through to the attribution result
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of the mining pools configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PoolConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub payout_addresses: IndexMap<String, PoolMetadata>,
    #[serde(default)]
    pub coinbase_tags: IndexMap<String, PoolMetadata>,
    #[serde(default)]
    pub block_hashes: IndexMap<String, PoolMetadata>,
}

/// Result of miner attribution for a coinbase transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MinerInfo {
    pub coinbase_str: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub possible_signal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Which rule identified the miner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identified_by: Option<String>,
    #[serde(flatten)]
    pub pool_fields: Map<String, Value>,
}

impl MinerInfo {
    const OWN_FIELDS: [&'static str; 5] =
        ["coinbaseStr", "possibleSignal", "name", "link", "identifiedBy"];

    pub fn merge(&mut self, metadata: &PoolMetadata) {
        self.name = Some(metadata.name.clone());
        if metadata.link.is_some() {
            self.link = metadata.link.clone();
        }
        for (key, value) in &metadata.extra {
            if !Self::OWN_FIELDS.contains(&key.as_str()) {
                self.pool_fields.insert(key.clone(), value.clone());
            }
        }
    }
}

// ============================================================================
// GEOLOCATION
// ============================================================================

/// Provider-returned location metadata for one IP address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct IpDetails(pub Map<String, Value>);

impl IpDetails {
    pub fn ip(&self) -> Option<&str> {
        self.0.get("ip").and_then(Value::as_str)
    }

    pub fn latitude(&self) -> Option<f64> {
        self.0.get("latitude").and_then(Value::as_f64)
    }

    pub fn longitude(&self) -> Option<f64> {
        self.0.get("longitude").and_then(Value::as_f64)
    }

    pub fn city(&self) -> Option<&str> {
        self.0.get("city").and_then(Value::as_str)
    }

    pub fn country_name(&self) -> Option<&str> {
        self.0.get("country_name").and_then(Value::as_str)
    }

    pub fn has_location(&self) -> bool {
        self.latitude().is_some() && self.longitude().is_some()
    }
}

/// Aggregated result of a batch geolocation lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct IpDetailsBatch {
    pub ips: Vec<String>,
    pub details_by_ip: BTreeMap<String, IpDetails>,
}
