//! Meter-rent lookup.
//!
//! Rent tables are keyed by free-form size labels ("3/4", "1", "0.5",
//! "1 1/2 inch"). A requested size is matched in this order:
//!
//! 1. exact label match against the size's decimal string;
//! 2. numeric match: every label is parsed, the closest one within
//!    [`exact_hit_epsilon`] wins, otherwise the first label that parsed at
//!    all is used;
//! 3. the conventional fraction label for the size ("3/4" for 0.75);
//! 4. zero.
//!
//! Step 2's "first parsed label" fallback picks an unrelated rent when no
//! label matches numerically. Existing bills were priced with it, so it is
//! kept; changing it would alter historical totals.

use crate::models::MeterRentPrice;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Tolerance for treating a parsed label as the requested size.
fn exact_hit_epsilon() -> Decimal {
    Decimal::new(1, 6)
}

/// Conventional fraction labels for common sizes.
fn fraction_label(meter_size: Decimal) -> Option<&'static str> {
    match meter_size.normalize().to_string().as_str() {
        "0.5" => Some("1/2"),
        "0.75" => Some("3/4"),
        "1.25" => Some("1 1/4"),
        "1.5" => Some("1 1/2"),
        "2.5" => Some("2 1/2"),
        _ => None,
    }
}

/// Numeric value of a size label.
///
/// Characters other than digits, `.`, `/` and whitespace are dropped first,
/// so "3/4\"" and "20mm" parse. Supports `a/b` and mixed `w a/b` forms.
pub fn parse_size_label(label: &str) -> Option<Decimal> {
    let cleaned: String = label
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '/' || c.is_whitespace())
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    let parts: Vec<&str> = cleaned.split_whitespace().collect();
    match parts.as_slice() {
        [single] => parse_number_or_fraction(single),
        [whole, fraction] if fraction.contains('/') && !whole.contains('/') => {
            let whole = Decimal::from_str(whole).ok()?;
            let fraction = parse_fraction(fraction)?;
            whole.checked_add(fraction)
        }
        _ => None,
    }
}

fn parse_number_or_fraction(token: &str) -> Option<Decimal> {
    if token.contains('/') {
        parse_fraction(token)
    } else {
        Decimal::from_str(token).ok()
    }
}

fn parse_fraction(token: &str) -> Option<Decimal> {
    let (numerator, denominator) = token.split_once('/')?;
    let numerator = Decimal::from_str(numerator).ok()?;
    let denominator = Decimal::from_str(denominator).ok()?;
    numerator.checked_div(denominator)
}

/// Flat rent for `meter_size`, or zero when no table entry resolves.
pub fn resolve_meter_rent(rent_table: &[MeterRentPrice], meter_size: Decimal) -> Decimal {
    let size_label = meter_size.normalize().to_string();

    if let Some(price) = rent_table.iter().find(|p| p.size_label == size_label) {
        return price.amount;
    }

    let mut first_parsed: Option<Decimal> = None;
    let mut closest: Option<(Decimal, Decimal)> = None;
    for price in rent_table {
        let Some(value) = parse_size_label(&price.size_label) else {
            continue;
        };
        first_parsed.get_or_insert(price.amount);

        let distance = (value - meter_size).abs();
        if closest.map_or(true, |(best, _)| distance < best) {
            closest = Some((distance, price.amount));
        }
    }

    if let Some((distance, amount)) = closest {
        if distance < exact_hit_epsilon() {
            return amount;
        }
    }
    if let Some(amount) = first_parsed {
        tracing::debug!(
            meter_size = %meter_size,
            "No rent label matches meter size, using first parsed label"
        );
        return amount;
    }

    if let Some(label) = fraction_label(meter_size) {
        if let Some(price) = rent_table.iter().find(|p| p.size_label.trim() == label) {
            return price.amount;
        }
    }

    Decimal::ZERO
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn table(entries: &[(&str, Decimal)]) -> Vec<MeterRentPrice> {
        entries
            .iter()
            .map(|(label, amount)| MeterRentPrice {
                size_label: label.to_string(),
                amount: *amount,
            })
            .collect()
    }

    #[test]
    fn exact_label_match_wins() {
        let rents = table(&[("1", dec!(80)), ("0.75", dec!(50))]);
        assert_eq!(resolve_meter_rent(&rents, dec!(0.75)), dec!(50));
    }

    #[test]
    fn exact_match_ignores_trailing_zeros_on_the_size() {
        let rents = table(&[("1", dec!(80))]);
        assert_eq!(resolve_meter_rent(&rents, dec!(1.00)), dec!(80));
    }

    #[test]
    fn fraction_label_resolves_for_decimal_size() {
        let rents = table(&[("3/4", dec!(50))]);
        assert_eq!(resolve_meter_rent(&rents, dec!(0.75)), dec!(50));
    }

    #[test]
    fn numeric_match_picks_the_equal_label_not_the_first() {
        let rents = table(&[("1/2", dec!(30)), ("1 1/4\"", dec!(95)), ("3/4", dec!(50))]);
        assert_eq!(resolve_meter_rent(&rents, dec!(1.25)), dec!(95));
        assert_eq!(resolve_meter_rent(&rents, dec!(0.75)), dec!(50));
    }

    #[test]
    fn labels_with_units_parse() {
        assert_eq!(parse_size_label("20mm"), Some(dec!(20)));
        assert_eq!(parse_size_label("1 1/2 inch"), Some(dec!(1.5)));
        assert_eq!(parse_size_label("3/4\""), Some(dec!(0.75)));
        assert_eq!(parse_size_label("large"), None);
        assert_eq!(parse_size_label("1/0"), None);
    }

    // Known latent behaviour: an unmatched size takes the first parsed label's rent.
    #[test]
    fn unmatched_size_falls_back_to_first_parsed_label() {
        let rents = table(&[("label", dec!(5)), ("1/2", dec!(30)), ("3/4", dec!(50))]);
        assert_eq!(resolve_meter_rent(&rents, dec!(4)), dec!(30));
    }

    #[test]
    fn nothing_parseable_and_no_fraction_label_is_zero() {
        let rents = table(&[("small", dec!(10)), ("large", dec!(40))]);
        assert_eq!(resolve_meter_rent(&rents, dec!(2)), Decimal::ZERO);
    }

    #[test]
    fn empty_table_is_zero() {
        assert_eq!(resolve_meter_rent(&[], dec!(0.75)), Decimal::ZERO);
    }
}
