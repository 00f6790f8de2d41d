//! Magnitude prefixes (kilo, mega, ...) for hashrates, difficulties and sizes.

use rust_decimal::prelude::*;

use super::error::ScaleError;

/// One step of the exponent scale table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentScale {
    pub value: f64,
    pub name: &'static str,
    pub abbreviation: &'static str,
    pub exponent: u32,
    /// Short wording used in prose ("B" for billions)
    pub text_desc: Option<&'static str>,
}

/// Scales ordered by descending magnitude, ending in the 1x sentinel
pub const EXPONENT_SCALES: [ExponentScale; 12] = [
    ExponentScale { value: 1e33, name: "?", abbreviation: "V", exponent: 33, text_desc: None },
    ExponentScale { value: 1e30, name: "?", abbreviation: "W", exponent: 30, text_desc: None },
    ExponentScale { value: 1e27, name: "?", abbreviation: "X", exponent: 27, text_desc: None },
    ExponentScale { value: 1e24, name: "yotta", abbreviation: "Y", exponent: 24, text_desc: None },
    ExponentScale { value: 1e21, name: "zetta", abbreviation: "Z", exponent: 21, text_desc: None },
    ExponentScale { value: 1e18, name: "exa", abbreviation: "E", exponent: 18, text_desc: None },
    ExponentScale { value: 1e15, name: "peta", abbreviation: "P", exponent: 15, text_desc: Some("Q") },
    ExponentScale { value: 1e12, name: "tera", abbreviation: "T", exponent: 12, text_desc: Some("T") },
    ExponentScale { value: 1e9, name: "giga", abbreviation: "G", exponent: 9, text_desc: Some("B") },
    ExponentScale { value: 1e6, name: "mega", abbreviation: "M", exponent: 6, text_desc: Some("M") },
    ExponentScale { value: 1e3, name: "kilo", abbreviation: "K", exponent: 3, text_desc: Some("thou") },
    ExponentScale { value: 1.0, name: "", abbreviation: "", exponent: 0, text_desc: Some("") },
];

/// Index of the 1x entry
pub const UNIT_SCALE_INDEX: usize = EXPONENT_SCALES.len() - 1;

/// Largest-magnitude scale that keeps `n` at or above 1 once divided.
///
/// Values below 1 map to the unit sentinel. NaN matches nothing and is reported
/// as unrepresentable.
pub fn best_scale_index(n: f64) -> Result<usize, ScaleError> {
    if n < 1.0 {
        return Ok(UNIT_SCALE_INDEX);
    }

    EXPONENT_SCALES
        .iter()
        .position(|scale| n / scale.value >= 1.0)
        .ok_or(ScaleError::Unrepresentable(n))
}

/// One shared scale for a set of values, driven by the largest value.
///
/// Every value can then be rendered with the same prefix; smaller members may
/// show as fractions below 1 but never above the step ratio of the largest.
pub fn common_scale_index(ns: &[f64]) -> Result<usize, ScaleError> {
    let mut best = UNIT_SCALE_INDEX;
    for &n in ns {
        best = best.min(best_scale_index(n)?);
    }
    Ok(best)
}

/// Scale `n` and round it to `decimal_places`.
///
/// Uses the best index for `n` unless one is supplied (e.g. from
/// [`common_scale_index`]).
pub fn format_large_number(
    n: f64,
    decimal_places: u32,
    scale_index: Option<usize>,
) -> Result<(Decimal, &'static ExponentScale), ScaleError> {
    let index = match scale_index {
        Some(index) => index,
        None => best_scale_index(n)?,
    };
    let scale = EXPONENT_SCALES
        .get(index)
        .ok_or(ScaleError::IndexOutOfBounds(index))?;

    let fraction = Decimal::from_f64(n / scale.value).ok_or(ScaleError::Unrepresentable(n))?;
    let rounded = fraction
        .round_dp_with_strategy(decimal_places, RoundingStrategy::MidpointAwayFromZero)
        .normalize();

    Ok((rounded, scale))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_table_ends_with_unit_sentinel() {
        let sentinel = EXPONENT_SCALES[UNIT_SCALE_INDEX];
        assert_eq!(sentinel.value, 1.0);
        assert_eq!(sentinel.exponent, 0);

        for pair in EXPONENT_SCALES.windows(2) {
            assert!(pair[0].value > pair[1].value);
        }
    }

    #[test]
    fn test_every_finite_non_negative_value_has_a_scale() {
        for n in [0.0, 0.5, 1.0, 999.0, 1e3, 1e10, 1e33, 1e40, f64::MAX] {
            assert!(best_scale_index(n).is_ok(), "no scale for {n}");
        }
    }

    #[test]
    fn test_below_one_maps_to_sentinel() {
        assert_eq!(best_scale_index(0.5).unwrap(), UNIT_SCALE_INDEX);
        assert_eq!(best_scale_index(0.0).unwrap(), UNIT_SCALE_INDEX);
    }

    #[test]
    fn test_scaled_fraction_stays_within_one_step() {
        let mut n = 1.0;
        while n < 1e33 {
            for candidate in [n, n * 1.7, n * 999.0] {
                let index = best_scale_index(candidate).unwrap();
                let fraction = candidate / EXPONENT_SCALES[index].value;
                assert!(fraction >= 1.0, "{candidate} scaled below 1");
                assert!(fraction < 1000.0, "{candidate} scaled to {fraction}");
            }
            n *= 1000.0;
        }
    }

    #[test]
    fn test_nan_is_unrepresentable() {
        assert!(matches!(
            best_scale_index(f64::NAN),
            Err(ScaleError::Unrepresentable(_))
        ));
    }

    #[test]
    fn test_common_scale_follows_largest_value() {
        let values = [1.0, 5000.0, 2_000_000.0];
        let index = common_scale_index(&values).unwrap();
        assert_eq!(index, best_scale_index(2_000_000.0).unwrap());
        assert_eq!(EXPONENT_SCALES[index].abbreviation, "M");

        for n in values {
            let (fraction, _) = format_large_number(n, 6, Some(index)).unwrap();
            assert!(fraction >= Decimal::ZERO);
            assert!(fraction < dec!(1000));
        }
    }

    #[test]
    fn test_common_scale_of_empty_set_is_sentinel() {
        assert_eq!(common_scale_index(&[]).unwrap(), UNIT_SCALE_INDEX);
    }

    #[test]
    fn test_format_large_number() {
        let (value, scale) = format_large_number(1_234_567.0, 2, None).unwrap();
        assert_eq!(value, dec!(1.23));
        assert_eq!(scale.name, "mega");

        let (value, scale) = format_large_number(512.0, 1, None).unwrap();
        assert_eq!(value, dec!(512));
        assert_eq!(scale.abbreviation, "");
    }

    #[test]
    fn test_format_large_number_rejects_bad_index() {
        assert_eq!(
            format_large_number(1.0, 2, Some(99)),
            Err(ScaleError::IndexOutOfBounds(99))
        );
    }
}
