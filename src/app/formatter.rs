//! Currency formatting for raw base-unit amounts.
//!
//! Native units are converted with exact decimal arithmetic. Exchanged units
//! read the live rate table; when no rate is available the configured
//! [`MissingRatePolicy`] decides what the caller gets back.

use std::env;
use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::prelude::*;
use tracing::{debug, warn};

use crate::domain::display::add_thousands_separators;
use crate::domain::scale::format_large_number;
use crate::domain::{
    CoinConfig, CurrencyUnit, FormattedAmount, ScaleError, UnitConversion, UnitLookup, UnitPrice,
};

use super::rates::ExchangeRateStore;

/// Default number of fractional digits kept in `FormattedAmount::val`
pub const DEFAULT_MAX_DISPLAY_DIGITS: u32 = 4;

/// Symbol used for exchanged amounts whose unit declares none
const DEFAULT_EXCHANGE_SYMBOL: &str = "$";

/// What `format` does when an exchanged unit has no live rate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingRatePolicy {
    /// Render in the coin's default native unit instead, ignoring the
    /// requested unit. Kept for compatibility; callers cannot tell the two
    /// apart except through `currency_unit`.
    #[default]
    FormatInDefaultUnit,
    /// Report the amount as unresolved
    Unresolved,
}

/// Result of a format request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatOutcome {
    Formatted(FormattedAmount),
    /// Unit unknown (or no rate under [`MissingRatePolicy::Unresolved`]); the
    /// caller shows the raw amount
    Unresolved,
}

impl FormatOutcome {
    pub fn formatted(self) -> Option<FormattedAmount> {
        match self {
            Self::Formatted(amount) => Some(amount),
            Self::Unresolved => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FormatterConfig {
    /// Fractional digits kept in `val` before the remainder is split off
    pub max_display_digits: u32,
    pub missing_rate_policy: MissingRatePolicy,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            max_display_digits: DEFAULT_MAX_DISPLAY_DIGITS,
            missing_rate_policy: MissingRatePolicy::default(),
        }
    }
}

impl FormatterConfig {
    pub fn from_env() -> Self {
        let max_display_digits = env::var("EXAEXP_VALUE_DISPLAY_MAX_LARGE_DIGITS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_DISPLAY_DIGITS);

        Self {
            max_display_digits,
            ..Default::default()
        }
    }
}

/// Formats amounts for one coin against a shared rate store
pub struct CurrencyFormatter {
    coin: Arc<CoinConfig>,
    rates: Arc<ExchangeRateStore>,
    config: FormatterConfig,
    /// Unit lookups by the exact string callers passed in
    resolved: DashMap<String, UnitLookup>,
}

impl CurrencyFormatter {
    pub fn new(coin: Arc<CoinConfig>, rates: Arc<ExchangeRateStore>) -> Self {
        Self {
            coin,
            rates,
            config: FormatterConfig::default(),
            resolved: DashMap::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: FormatterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn coin(&self) -> &CoinConfig {
        &self.coin
    }

    /// Resolve a unit name or alias, memoized per input string
    pub fn resolve_unit(&self, name_or_alias: &str) -> UnitLookup {
        if let Some(lookup) = self.resolved.get(name_or_alias) {
            return lookup.value().clone();
        }
        let lookup = self.coin.lookup_unit(name_or_alias);
        self.resolved
            .insert(name_or_alias.to_string(), lookup.clone());
        lookup
    }

    /// Render `amount` (in base units) in the named unit.
    ///
    /// With `forced_decimal_places` the result has exactly that many fractional
    /// digits. Without it, trailing zeros are stripped and native amounts longer
    /// than the display maximum are split into `val` and
    /// `less_significant_digits`.
    pub fn format(
        &self,
        amount: Decimal,
        unit: &str,
        forced_decimal_places: Option<u32>,
    ) -> FormatOutcome {
        let UnitLookup::Found(unit) = self.resolve_unit(unit) else {
            debug!(unit = %unit, "Unknown currency unit");
            return FormatOutcome::Unresolved;
        };

        match &unit.conversion {
            UnitConversion::Native { multiplier } => {
                self.format_native(amount, &unit, *multiplier, forced_decimal_places)
            }
            UnitConversion::Exchanged { rate_key } => match self.rates.rate(rate_key) {
                Some(rate) => self.format_with_rate(amount, &unit, rate, forced_decimal_places),
                None => match self.config.missing_rate_policy {
                    MissingRatePolicy::FormatInDefaultUnit => {
                        debug!(
                            unit = %unit.name,
                            fallback = %self.coin.default_unit().name,
                            "No exchange rate, formatting in default unit"
                        );
                        let default_unit = Arc::clone(self.coin.default_unit());
                        match default_unit.conversion {
                            UnitConversion::Native { multiplier } => self.format_native(
                                amount,
                                &default_unit,
                                multiplier,
                                forced_decimal_places,
                            ),
                            UnitConversion::Exchanged { .. } => FormatOutcome::Unresolved,
                        }
                    }
                    MissingRatePolicy::Unresolved => FormatOutcome::Unresolved,
                },
            },
        }
    }

    /// Render in the coin's base (smallest) unit
    pub fn format_in_smallest_units(
        &self,
        amount: Decimal,
        forced_decimal_places: Option<u32>,
    ) -> FormatOutcome {
        let base = self.coin.base_unit().name.clone();
        self.format(amount, &base, forced_decimal_places)
    }

    /// Symbol-prefixed exchanged value (e.g. "€1,234.5"), `None` without a rate
    pub fn format_exchanged(&self, amount: Decimal, code: &str) -> Option<String> {
        let rate_key = self.rate_key_for(code);
        let rate = self.rates.rate(&rate_key)?;
        let unit = self.coin.unit_for_rate_key(&rate_key);

        let decimal_places = unit.map(|u| u.decimal_places).unwrap_or(2);
        let symbol = unit
            .and_then(|u| u.symbol.as_deref())
            .unwrap_or(DEFAULT_EXCHANGE_SYMBOL);

        let value = self.to_coins(amount)?.checked_mul(rate)?;
        let rounded = value
            .round_dp_with_strategy(decimal_places, RoundingStrategy::MidpointAwayFromZero)
            .normalize();

        Some(format!("{symbol}{}", add_thousands_separators(&rounded.to_string())))
    }

    /// Exchanged value in the active display currency, falling back to the
    /// coin's quote currency when the active one has no rate
    pub fn format_in_active_currency(
        &self,
        amount: Decimal,
        active_currency: Option<&str>,
    ) -> Option<String> {
        let code = self.active_rate_key(active_currency);
        self.format_exchanged(amount, &code)
    }

    /// How many base units one unit of the active exchanged currency buys
    /// (e.g. "20,000,000 sat/$")
    pub fn base_units_per_exchanged_unit(&self, active_currency: Option<&str>) -> Option<UnitPrice> {
        let code = self.active_rate_key(active_currency);
        let rate = self.rates.rate(&code)?;
        if rate.is_zero() {
            return None;
        }

        let base = self.coin.base_unit();
        let UnitConversion::Native { multiplier: base_multiplier } = base.conversion else {
            return None;
        };

        let coins_per_unit = Decimal::ONE.checked_div(rate)?;
        let base_units = self.from_coins(coins_per_unit)?.checked_mul(base_multiplier)?;

        let symbol = self
            .coin
            .unit_for_rate_key(&code)
            .and_then(|u| u.symbol.clone())
            .unwrap_or_else(|| DEFAULT_EXCHANGE_SYMBOL.to_string());

        Some(UnitPrice {
            amount: add_thousands_separators(&base_units.trunc().to_string()),
            unit: format!("{}/{}", base.name, symbol),
        })
    }

    /// Scale a large quantity (hashrate, difficulty) to a prefixed string such
    /// as "1.23 EH/s"
    pub fn format_magnitude(
        &self,
        n: f64,
        decimal_places: u32,
        suffix: &str,
    ) -> Result<String, ScaleError> {
        let (fraction, scale) = format_large_number(n, decimal_places, None)?;
        Ok(format!(
            "{} {}{}",
            add_thousands_separators(&fraction.to_string()),
            scale.abbreviation,
            suffix
        ))
    }

    fn format_native(
        &self,
        amount: Decimal,
        unit: &CurrencyUnit,
        multiplier: Decimal,
        forced_decimal_places: Option<u32>,
    ) -> FormatOutcome {
        let Some(value) = amount.checked_mul(multiplier) else {
            warn!(amount = %amount, unit = %unit.name, "Amount out of range for unit");
            return FormatOutcome::Unresolved;
        };

        if let Some(decimal_places) = forced_decimal_places {
            let mut fixed =
                value.round_dp_with_strategy(decimal_places, RoundingStrategy::MidpointAwayFromZero);
            fixed.rescale(decimal_places);
            let text = add_thousands_separators(&pad_fraction(
                fixed.to_string(),
                fixed.scale(),
                decimal_places,
            ));
            return FormatOutcome::Formatted(FormattedAmount {
                val: text.clone(),
                simple_val: text,
                currency_unit: unit.name.clone(),
                less_significant_digits: None,
            });
        }

        let rounded = value
            .round_dp_with_strategy(unit.decimal_places, RoundingStrategy::MidpointAwayFromZero)
            .normalize();
        let simple_val = add_thousands_separators(&rounded.to_string());
        let (val, less_significant_digits) =
            split_display_digits(&simple_val, self.config.max_display_digits);

        FormatOutcome::Formatted(FormattedAmount {
            val,
            simple_val,
            currency_unit: unit.name.clone(),
            less_significant_digits,
        })
    }

    fn format_with_rate(
        &self,
        amount: Decimal,
        unit: &CurrencyUnit,
        rate: Decimal,
        forced_decimal_places: Option<u32>,
    ) -> FormatOutcome {
        let Some(value) = self.to_coins(amount).and_then(|coins| coins.checked_mul(rate)) else {
            warn!(amount = %amount, unit = %unit.name, "Amount out of range for unit");
            return FormatOutcome::Unresolved;
        };

        let decimal_places = forced_decimal_places.unwrap_or(unit.decimal_places);
        let rounded = value
            .round_dp_with_strategy(decimal_places, RoundingStrategy::MidpointAwayFromZero)
            .normalize();
        let text = add_thousands_separators(&rounded.to_string());

        FormatOutcome::Formatted(FormattedAmount {
            val: text.clone(),
            simple_val: text,
            currency_unit: unit.name.clone(),
            less_significant_digits: None,
        })
    }

    /// Base units to whole coins (rates are quoted per default unit)
    fn to_coins(&self, amount: Decimal) -> Option<Decimal> {
        match self.coin.default_unit().conversion {
            UnitConversion::Native { multiplier } => amount.checked_mul(multiplier),
            UnitConversion::Exchanged { .. } => None,
        }
    }

    fn from_coins(&self, coins: Decimal) -> Option<Decimal> {
        match self.coin.default_unit().conversion {
            UnitConversion::Native { multiplier } => coins.checked_div(multiplier),
            UnitConversion::Exchanged { .. } => None,
        }
    }

    /// Rate key for a code or unit alias ("usdt" -> "usd")
    fn rate_key_for(&self, code: &str) -> String {
        match self.resolve_unit(code) {
            UnitLookup::Found(unit) => unit
                .rate_key()
                .map(str::to_string)
                .unwrap_or_else(|| code.to_lowercase()),
            UnitLookup::NotFound => code.to_lowercase(),
        }
    }

    fn active_rate_key(&self, active_currency: Option<&str>) -> String {
        active_currency
            .map(|code| self.rate_key_for(code))
            .filter(|key| self.rates.rate(key).is_some())
            .unwrap_or_else(|| self.coin.quote_rate_key.clone())
    }
}

/// Split `text` after `max_digits` fractional digits, truncating only
fn split_display_digits(text: &str, max_digits: u32) -> (String, Option<String>) {
    let Some(dot) = text.find('.') else {
        return (text.to_string(), None);
    };

    let fraction_len = text.len() - dot - 1;
    let max_digits = max_digits as usize;
    if fraction_len <= max_digits {
        return (text.to_string(), None);
    }

    let cut = if max_digits == 0 { dot } else { dot + 1 + max_digits };
    let (val, rest) = text.split_at(cut);
    (val.to_string(), Some(rest.to_string()))
}

/// `rescale` stops at the 28 digit limit or when the mantissa would overflow;
/// the missing digits are zeros
fn pad_fraction(mut text: String, scale: u32, decimal_places: u32) -> String {
    if scale >= decimal_places {
        return text;
    }
    if scale == 0 {
        text.push('.');
    }
    text.extend(std::iter::repeat_n('0', (decimal_places - scale) as usize));
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExchangeRateTable;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn formatter_with_rates(rates: &[(&str, Decimal)]) -> CurrencyFormatter {
        let store = ExchangeRateStore::new();
        if !rates.is_empty() {
            let table: BTreeMap<String, Decimal> =
                rates.iter().map(|(k, v)| (k.to_string(), *v)).collect();
            store.replace(ExchangeRateTable::new(table));
        }
        CurrencyFormatter::new(Arc::new(CoinConfig::nexa().unwrap()), Arc::new(store))
    }

    fn formatted(outcome: FormatOutcome) -> FormattedAmount {
        outcome.formatted().expect("amount should format")
    }

    #[test]
    fn test_native_unit_with_separators() {
        let formatter = formatter_with_rates(&[]);
        let amount = formatted(formatter.format(dec!(123456789), "NEX", None));
        assert_eq!(amount.simple_val, "1,234,567.89");
        assert_eq!(amount.val, "1,234,567.89");
        assert_eq!(amount.currency_unit, "NEX");
        assert_eq!(amount.less_significant_digits, None);
    }

    #[test]
    fn test_forced_decimal_places_pad_with_zeros() {
        let formatter = formatter_with_rates(&[]);
        for (raw, places, expected) in [
            (dec!(100), 4, "1.0000"),
            (dec!(0), 2, "0.00"),
            (dec!(123456789), 0, "1,234,568"),
            (dec!(7), 8, "0.07000000"),
        ] {
            let amount = formatted(formatter.format(raw, "NEX", Some(places)));
            let fraction = amount.val.split_once('.').map(|(_, f)| f.len()).unwrap_or(0);
            assert_eq!(fraction, places as usize);
            assert_eq!(amount.val, expected);
            assert_eq!(amount.val, amount.simple_val);
        }
    }

    #[test]
    fn test_forced_places_beyond_decimal_precision_are_zero_padded() {
        let formatter = formatter_with_rates(&[]);

        let amount = formatted(formatter.format(dec!(12345), "NEX", Some(30)));
        let (whole, fraction) = amount.val.split_once('.').unwrap();
        assert_eq!(whole, "123");
        assert_eq!(fraction.len(), 30);
        assert_eq!(fraction, format!("45{}", "0".repeat(28)));

        let amount = formatted(formatter.format(
            dec!(1000000000000000000000000000),
            "NEX",
            Some(8),
        ));
        assert_eq!(amount.val, "10,000,000,000,000,000,000,000,000.00000000");
    }

    #[test]
    fn test_rounding_is_half_up() {
        let formatter = formatter_with_rates(&[]);
        let amount = formatted(formatter.format(dec!(12345), "NEX", Some(1)));
        assert_eq!(amount.val, "123.5");
        let amount = formatted(formatter.format(dec!(12325), "NEX", Some(1)));
        assert_eq!(amount.val, "123.3");
    }

    #[test]
    fn test_unforced_strips_trailing_zeros() {
        let formatter = formatter_with_rates(&[]);
        assert_eq!(formatted(formatter.format(dec!(100), "NEX", None)).val, "1");
        assert_eq!(formatted(formatter.format(dec!(150), "NEX", None)).val, "1.5");
        assert_eq!(
            formatted(formatter.format(dec!(1000), "MEX", None)).simple_val,
            "0.00001"
        );
    }

    #[test]
    fn test_display_split_round_trips() {
        let formatter = formatter_with_rates(&[]);
        let amount = formatted(formatter.format(dec!(123456789), "MEX", None));

        assert_eq!(amount.simple_val, "1.23456789");
        assert_eq!(amount.val, "1.2345");
        assert_eq!(amount.less_significant_digits.as_deref(), Some("6789"));
        assert_eq!(amount.reconstruct(), amount.simple_val);
    }

    #[test]
    fn test_display_split_with_zero_max_digits() {
        let formatter = formatter_with_rates(&[]).with_config(FormatterConfig {
            max_display_digits: 0,
            ..Default::default()
        });
        let amount = formatted(formatter.format(dec!(123456789), "NEX", None));
        assert_eq!(amount.val, "1,234,567");
        assert_eq!(amount.less_significant_digits.as_deref(), Some(".89"));
        assert_eq!(amount.reconstruct(), amount.simple_val);
    }

    #[test]
    fn test_alias_resolution_is_case_insensitive() {
        let formatter = formatter_with_rates(&[]);
        let amount = formatted(formatter.format(dec!(100), "NeXa", None));
        assert_eq!(amount.currency_unit, "NEX");
        assert_eq!(formatter.format(dec!(100), "doge", None), FormatOutcome::Unresolved);
    }

    #[test]
    fn test_exchanged_unit_uses_live_rate() {
        let formatter = formatter_with_rates(&[("usd", dec!(0.002))]);
        let amount = formatted(formatter.format(dec!(100000), "usdt", None));
        assert_eq!(amount.val, "2");
        assert_eq!(amount.currency_unit, "USD");

        let amount = formatted(formatter.format(dec!(123456789), "USD", Some(2)));
        assert_eq!(amount.val, "2,469.14");
    }

    #[test]
    fn test_missing_rate_falls_back_to_default_unit() {
        let formatter = formatter_with_rates(&[]);
        let amount = formatted(formatter.format(dec!(12345), "EUR", Some(2)));
        assert_eq!(amount.currency_unit, "NEX");
        assert_eq!(amount.val, "123.45");

        let native = formatted(formatter.format(dec!(12345), "NEX", Some(2)));
        assert_eq!(amount, native);
    }

    #[test]
    fn test_missing_rate_can_be_unresolved() {
        let formatter = formatter_with_rates(&[]).with_config(FormatterConfig {
            missing_rate_policy: MissingRatePolicy::Unresolved,
            ..Default::default()
        });
        assert_eq!(formatter.format(dec!(12345), "EUR", None), FormatOutcome::Unresolved);
    }

    #[test]
    fn test_smallest_units() {
        let formatter = formatter_with_rates(&[]);
        let amount = formatted(formatter.format_in_smallest_units(dec!(1234567), None));
        assert_eq!(amount.val, "1,234,567");
        assert_eq!(amount.currency_unit, "sat");
    }

    #[test]
    fn test_format_exchanged_uses_unit_symbol() {
        let formatter = formatter_with_rates(&[("usd", dec!(0.002)), ("eur", dec!(0.0018))]);
        assert_eq!(formatter.format_exchanged(dec!(100000), "eur").as_deref(), Some("€1.8"));
        assert_eq!(
            formatter.format_exchanged(dec!(1000000000), "usd").as_deref(),
            Some("$20,000")
        );
        assert_eq!(formatter.format_exchanged(dec!(1), "gbp"), None);
    }

    #[test]
    fn test_active_currency_falls_back_to_quote() {
        let formatter = formatter_with_rates(&[("usd", dec!(0.002))]);
        assert_eq!(
            formatter.format_in_active_currency(dec!(100000), Some("NEX")).as_deref(),
            Some("$2")
        );
        assert_eq!(
            formatter.format_in_active_currency(dec!(100000), None).as_deref(),
            Some("$2")
        );
    }

    #[test]
    fn test_base_units_per_exchanged_unit() {
        let formatter = formatter_with_rates(&[("usd", dec!(0.002))]);
        let price = formatter.base_units_per_exchanged_unit(Some("usd")).unwrap();
        assert_eq!(price.amount, "50,000");
        assert_eq!(price.unit, "sat/$");

        let empty = formatter_with_rates(&[]);
        assert!(empty.base_units_per_exchanged_unit(Some("usd")).is_none());
    }

    #[test]
    fn test_format_magnitude() {
        let formatter = formatter_with_rates(&[]);
        assert_eq!(
            formatter.format_magnitude(1_234_567_890_000_000_000.0, 2, "H/s").unwrap(),
            "1.23 EH/s"
        );
        assert_eq!(formatter.format_magnitude(512.0, 2, "B").unwrap(), "512 B");
    }

    #[test]
    fn test_resolution_is_memoized() {
        let formatter = formatter_with_rates(&[]);
        formatter.format(dec!(1), "sat", None);
        formatter.format(dec!(2), "sat", None);
        assert_eq!(formatter.resolved.len(), 1);
    }
}
