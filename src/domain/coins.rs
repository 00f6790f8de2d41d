//! Coin configuration: currency units, halving schedule and rate settings.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::error::ConfigError;
use super::types::{CurrencyUnit, HalvingSchedule};

/// Result of resolving a unit name or alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitLookup {
    Found(Arc<CurrencyUnit>),
    NotFound,
}

impl UnitLookup {
    pub fn found(&self) -> Option<&Arc<CurrencyUnit>> {
        match self {
            Self::Found(unit) => Some(unit),
            Self::NotFound => None,
        }
    }
}

/// Immutable per-coin configuration
#[derive(Debug, Clone)]
pub struct CoinConfig {
    pub name: String,
    pub ticker: String,
    units: Vec<Arc<CurrencyUnit>>,
    base_unit: Arc<CurrencyUnit>,
    default_unit: Arc<CurrencyUnit>,
    /// Exchanged code used when the active display currency has no rate
    pub quote_rate_key: String,
    pub halving: HalvingSchedule,
}

impl CoinConfig {
    /// Build and validate a coin configuration.
    ///
    /// Fails when the base or default unit is missing, when either of them is
    /// not a native unit, or when two units claim the same name/alias.
    pub fn new(
        name: &str,
        ticker: &str,
        units: Vec<CurrencyUnit>,
        base_unit: &str,
        default_unit: &str,
        quote_rate_key: &str,
        halving: HalvingSchedule,
    ) -> Result<Self, ConfigError> {
        let units: Vec<Arc<CurrencyUnit>> = units.into_iter().map(Arc::new).collect();

        let mut claimed: HashMap<String, String> = HashMap::new();
        for unit in &units {
            let mut spellings: Vec<String> = unit.aliases.iter().map(|a| a.to_lowercase()).collect();
            spellings.push(unit.name.to_lowercase());
            spellings.sort();
            spellings.dedup();

            for spelling in spellings {
                if let Some(first) = claimed.insert(spelling.clone(), unit.name.clone()) {
                    return Err(ConfigError::AmbiguousUnitAlias {
                        alias: spelling,
                        first,
                        second: unit.name.clone(),
                    });
                }
            }
        }

        let find_native = |field: &str, wanted: &str| -> Result<Arc<CurrencyUnit>, ConfigError> {
            let unit = units
                .iter()
                .find(|u| u.name == wanted)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownUnit(wanted.to_string()))?;
            if !unit.is_native() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("{} must be a native unit", wanted),
                });
            }
            Ok(unit)
        };

        let base_unit = find_native("base_unit", base_unit)?;
        let default_unit = find_native("default_unit", default_unit)?;

        if halving.halving_interval == 0 || halving.base_units_per_coin == 0 {
            return Err(ConfigError::InvalidValue {
                field: "halving".to_string(),
                message: "interval and base units per coin must be non-zero".to_string(),
            });
        }

        Ok(Self {
            name: name.to_string(),
            ticker: ticker.to_string(),
            units,
            base_unit,
            default_unit,
            quote_rate_key: quote_rate_key.to_lowercase(),
            halving,
        })
    }

    /// Nexa: 100 satoshis per NEX, 10M NEX subsidy halving every 1,050,000 blocks
    pub fn nexa() -> Result<Self, ConfigError> {
        let units = vec![
            CurrencyUnit::native("NEX", dec!(0.01), 2, &["nexa"]),
            CurrencyUnit::native("KEX", dec!(0.00001), 5, &["kilonex"]),
            CurrencyUnit::native("MEX", dec!(0.00000001), 8, &["meganex"]),
            CurrencyUnit::native("sat", Decimal::ONE, 0, &["satoshi", "satoshis"]),
            CurrencyUnit::exchanged("USD", "usd", 6, &["usdt", "$"]).with_symbol("$"),
            CurrencyUnit::exchanged("EUR", "eur", 6, &["€"])
                .with_symbol("€")
                .extended(),
            CurrencyUnit::exchanged("GBP", "gbp", 6, &["£"])
                .with_symbol("£")
                .extended(),
            CurrencyUnit::exchanged("JPY", "jpy", 4, &["¥"])
                .with_symbol("¥")
                .extended(),
        ];

        let halving = HalvingSchedule {
            initial_subsidy: 10 * 1_000_000 * 100,
            halving_interval: 1_050_000,
            base_units_per_coin: 100,
            display_decimal_places: 2,
        };

        Self::new("Nexa", "NEX", units, "sat", "NEX", "usd", halving)
    }

    /// Look up a built-in coin by ticker
    pub fn by_ticker(ticker: &str) -> Result<Self, ConfigError> {
        match ticker.to_uppercase().as_str() {
            "NEX" | "NEXA" => Self::nexa(),
            other => Err(ConfigError::InvalidValue {
                field: "coin".to_string(),
                message: format!("unsupported coin '{}'", other),
            }),
        }
    }

    pub fn units(&self) -> &[Arc<CurrencyUnit>] {
        &self.units
    }

    pub fn base_unit(&self) -> &Arc<CurrencyUnit> {
        &self.base_unit
    }

    pub fn default_unit(&self) -> &Arc<CurrencyUnit> {
        &self.default_unit
    }

    /// Resolve a unit by name or alias, case-insensitively
    pub fn lookup_unit(&self, name_or_alias: &str) -> UnitLookup {
        self.units
            .iter()
            .find(|unit| unit.matches(name_or_alias))
            .map(|unit| UnitLookup::Found(Arc::clone(unit)))
            .unwrap_or(UnitLookup::NotFound)
    }

    /// Whether any configured unit relies on an extended (derived) rate
    pub fn has_extended_units(&self) -> bool {
        self.units.iter().any(|unit| unit.is_extended_rate)
    }

    /// Exchanged unit registered for a rate key
    pub fn unit_for_rate_key(&self, rate_key: &str) -> Option<&Arc<CurrencyUnit>> {
        self.units
            .iter()
            .find(|unit| unit.rate_key() == Some(rate_key.to_lowercase().as_str()))
    }
}
