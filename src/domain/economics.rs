//! Coin issuance, block reward, fee and difficulty calculations.

use rust_decimal::prelude::*;

use super::error::CodecError;
use super::types::{HalvingSchedule, Transaction, TxTotals};

/// Exponent the compact target is normalized against
const DIFFICULTY_REFERENCE_SHIFT: u32 = 29;

/// Issuance and reward arithmetic for one halving schedule
#[derive(Debug, Clone, Copy)]
pub struct ChainEconomics {
    schedule: HalvingSchedule,
}

impl ChainEconomics {
    #[must_use]
    pub fn new(schedule: HalvingSchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &HalvingSchedule {
        &self.schedule
    }

    /// Block subsidy at `height`, in base units
    pub fn block_subsidy_base_units(&self, height: u64) -> u64 {
        let halvings = height / self.schedule.halving_interval;
        if halvings >= u64::from(u64::BITS) {
            return 0;
        }
        self.schedule.initial_subsidy >> halvings
    }

    /// Block reward at `height`, in whole coins
    pub fn block_reward(&self, height: u64) -> Decimal {
        self.to_coins(u128::from(self.block_subsidy_base_units(height)))
            .unwrap_or(Decimal::ZERO)
    }

    /// Coins minted by the first `height` blocks, in base units.
    ///
    /// Whole intervals contribute `subsidy * interval`, the partial interval
    /// contributes `subsidy * remainder`; the subsidy halves by floor division.
    pub fn total_issuance_base_units(&self, height: u64) -> u128 {
        let mut total: u128 = 0;
        let mut subsidy = self.schedule.initial_subsidy;
        let mut remaining = height;

        while remaining > 0 && subsidy > 0 {
            let span = remaining.min(self.schedule.halving_interval);
            total += u128::from(subsidy) * u128::from(span);
            remaining -= span;
            subsidy /= 2;
        }

        total
    }

    /// Coins minted by the first `height` blocks, rendered in whole coins
    pub fn total_issuance(&self, height: u64) -> Result<Decimal, CodecError> {
        let mut coins = self.to_coins(self.total_issuance_base_units(height))?;
        coins.rescale(self.schedule.display_decimal_places);
        Ok(coins)
    }

    /// Sum of positive coinbase outputs minus the scheduled block reward
    pub fn block_fees(
        &self,
        coinbase: Option<&Transaction>,
        height: u64,
    ) -> Result<Decimal, CodecError> {
        let Some(coinbase) = coinbase else {
            return Ok(Decimal::ZERO);
        };

        let total_output = checked_sum(
            coinbase
                .vout
                .iter()
                .map(|output| output.value)
                .filter(|value| value.is_sign_positive() && !value.is_zero()),
        )?;

        let reward = self.block_reward(height);
        total_output
            .checked_sub(reward)
            .ok_or_else(|| CodecError::OutOfRange(format!("{total_output} - {reward}")))
    }

    /// Total input and output value of a transaction.
    ///
    /// `prevout_values[i]` is the value spent by input `i` when known; coinbase
    /// inputs count the block reward instead.
    pub fn tx_total_values(
        &self,
        tx: &Transaction,
        prevout_values: &[Option<Decimal>],
        height: u64,
    ) -> Result<TxTotals, CodecError> {
        let input = checked_sum(tx.vin.iter().enumerate().filter_map(|(i, vin)| {
            if vin.is_coinbase() {
                Some(self.block_reward(height))
            } else {
                prevout_values.get(i).copied().flatten().or(vin.value)
            }
        }))?;

        let output = checked_sum(tx.vout.iter().map(|output| output.value))?;

        Ok(TxTotals { input, output })
    }

    fn to_coins(&self, base_units: u128) -> Result<Decimal, CodecError> {
        let units = Decimal::from_u128(base_units)
            .ok_or_else(|| CodecError::OutOfRange(base_units.to_string()))?;
        Ok(units / Decimal::from(self.schedule.base_units_per_coin))
    }
}

fn checked_sum(mut values: impl Iterator<Item = Decimal>) -> Result<Decimal, CodecError> {
    values.try_fold(Decimal::ZERO, |acc, value| {
        acc.checked_add(value)
            .ok_or_else(|| CodecError::OutOfRange(format!("{acc} + {value}")))
    })
}

/// Difficulty encoded by compact target bits.
///
/// `0xffff / mantissa`, shifted by powers of 256 until the exponent byte meets
/// the reference shift. A zero mantissa yields infinity.
pub fn difficulty(bits: u32) -> f64 {
    let mut shift = (bits >> 24) & 0xff;
    let mut diff = f64::from(0x0000_ffff_u32) / f64::from(bits & 0x00ff_ffff);

    while shift < DIFFICULTY_REFERENCE_SHIFT {
        diff *= 256.0;
        shift += 1;
    }
    while shift > DIFFICULTY_REFERENCE_SHIFT {
        diff /= 256.0;
        shift -= 1;
    }

    diff
}
