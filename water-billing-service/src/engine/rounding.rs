use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places of every monetary value the engine emits.
pub const MONEY_DP: u32 = 2;

/// Round to cents, half away from zero.
///
/// Applied to each charge component independently and then to the total;
/// historical bills were produced that way.
#[inline]
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn midpoint_rounds_away_from_zero() {
        assert_eq!(round_money(dec!(99.925)), dec!(99.93));
        assert_eq!(round_money(dec!(0.005)), dec!(0.01));
        assert_eq!(round_money(dec!(99.924)), dec!(99.92));
    }

    #[test]
    fn already_rounded_values_are_untouched() {
        assert_eq!(round_money(dec!(365)), dec!(365));
        assert_eq!(round_money(dec!(12.30)), dec!(12.30));
    }
}
