//! Fixed-point money helpers.
//!
//! Amounts are `rust_decimal::Decimal` end to end. Line values stay unrounded; rounding to
//! `MONEY_SCALE` happens only when a figure is aggregated or displayed.

use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept on aggregated/displayed monetary figures.
pub const MONEY_SCALE: u32 = 2;

/// Round an aggregated monetary value (half away from zero, commercial rounding).
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `percent` of `base`, unrounded.
pub fn percent_of(base: Decimal, percent: Decimal) -> Decimal {
    base * percent / Decimal::ONE_HUNDRED
}

/// Sum unrounded values, then round once.
pub fn rounded_sum<I>(values: I) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    round_money(values.into_iter().sum())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_money(Decimal::new(1005, 3)), Decimal::new(101, 2));
        assert_eq!(round_money(Decimal::new(-1005, 3)), Decimal::new(-101, 2));
    }

    #[test]
    fn summing_before_rounding_avoids_drift() {
        // three lines of 0.333...: per-line rounding would give 0.99
        let third = Decimal::ONE / Decimal::from(3);
        assert_eq!(rounded_sum([third, third, third]), Decimal::new(100, 2));
    }

    #[test]
    fn percent_of_is_unrounded() {
        assert_eq!(
            percent_of(Decimal::new(1999, 2), Decimal::from(24)),
            Decimal::new(47976, 4)
        );
    }
}
