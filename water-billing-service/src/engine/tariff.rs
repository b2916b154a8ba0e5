//! Tariff tier calculator.
//!
//! Prices one period of metered usage against a tariff. Pure and
//! synchronous; invalid input (negative usage, no tiers) yields an all-zero
//! breakdown instead of an error.

use crate::engine::meter_rent::resolve_meter_rent;
use crate::engine::rounding::round_money;
use crate::models::{
    BillBreakdown, CustomerType, FeeCharge, FeeKind, RateTier, TariffConfiguration, TierCharge,
    TierLimit,
};
use rust_decimal::Decimal;

/// Index of the bracket rental accounts are always priced at.
const RENTAL_TIER_INDEX: usize = 3;

/// Usage and meter attributes for one pricing call.
#[derive(Debug, Clone, PartialEq)]
pub struct MeteredUsage {
    pub usage_m3: Decimal,
    pub meter_size: Decimal,
    pub sewerage_connected: bool,
    /// Usage priced for sewerage instead of `usage_m3`.
    pub sewerage_usage_override: Option<Decimal>,
    /// Usage priced for the base water charge instead of `usage_m3`.
    pub base_usage_override: Option<Decimal>,
}

impl MeteredUsage {
    pub fn new(usage_m3: Decimal, meter_size: Decimal) -> Self {
        Self {
            usage_m3,
            meter_size,
            sewerage_connected: false,
            sewerage_usage_override: None,
            base_usage_override: None,
        }
    }

    pub fn with_sewerage(mut self, connected: bool) -> Self {
        self.sewerage_connected = connected;
        self
    }
}

/// Compute the full bill breakdown for `metered` under `tariff`.
///
/// Each component is rounded to cents on its own; percentage components are
/// taken from the rounded base charge and the total is the rounded sum of the
/// rounded components.
pub fn compute_bill(tariff: &TariffConfiguration, metered: &MeteredUsage) -> BillBreakdown {
    if metered.usage_m3 < Decimal::ZERO || tariff.tiers.is_empty() {
        tracing::debug!(
            usage_m3 = %metered.usage_m3,
            tiers = tariff.tiers.len(),
            "Usage or tariff not billable, returning zero breakdown"
        );
        return BillBreakdown::default();
    }

    let customer_type = tariff.customer_type;
    let tiers = sorted_tiers(&tariff.tiers);

    let base_usage = clamp_override(metered.base_usage_override).unwrap_or(metered.usage_m3);
    let (base_raw, tier_breakdown) = price_water(customer_type, &tiers, base_usage);
    let base_water_charge = round_money(base_raw);

    let maintenance_fee = round_money(tariff.maintenance_percentage * base_water_charge);
    let sanitation_fee = round_money(tariff.sanitation_percentage * base_water_charge);

    let vat_amount = if vat_applies(tariff, metered.usage_m3) {
        round_money(tariff.vat_rate * base_water_charge)
    } else {
        Decimal::ZERO
    };

    let meter_rent = round_money(resolve_meter_rent(
        &tariff.meter_rent_prices,
        metered.meter_size,
    ));

    let (sewerage_charge, sewerage_breakdown) =
        if metered.sewerage_connected && !tariff.sewerage_tiers.is_empty() {
            let sewerage_usage =
                clamp_override(metered.sewerage_usage_override).unwrap_or(metered.usage_m3);
            let sewerage_tiers = sorted_tiers(&tariff.sewerage_tiers);
            let (raw, breakdown) = price_sewerage(customer_type, &sewerage_tiers, sewerage_usage);
            (round_money(raw), breakdown)
        } else {
            (Decimal::ZERO, Vec::new())
        };

    let additional_fees = fee_charges(tariff, base_water_charge);
    let additional_fees_charge = round_money(additional_fees.iter().map(|f| f.amount).sum());

    let mut breakdown = BillBreakdown {
        total_bill: Decimal::ZERO,
        base_water_charge,
        maintenance_fee,
        sanitation_fee,
        vat_amount,
        meter_rent,
        sewerage_charge,
        additional_fees_charge,
        tier_breakdown,
        sewerage_breakdown,
        additional_fees,
    };
    breakdown.total_bill = round_money(breakdown.component_sum());

    tracing::debug!(
        customer_type = customer_type.as_str(),
        usage_m3 = %metered.usage_m3,
        total_bill = %breakdown.total_bill,
        "Bill computed"
    );

    breakdown
}

fn clamp_override(value: Option<Decimal>) -> Option<Decimal> {
    value.map(|v| v.max(Decimal::ZERO))
}

/// Tiers in ascending limit order, unbounded last. Stable for equal limits.
fn sorted_tiers(tiers: &[RateTier]) -> Vec<RateTier> {
    let mut sorted = tiers.to_vec();
    sorted.sort_by(|a, b| a.upper_limit.cmp(&b.upper_limit));
    sorted
}

fn price_water(
    customer_type: CustomerType,
    tiers: &[RateTier],
    usage: Decimal,
) -> (Decimal, Vec<TierCharge>) {
    match customer_type {
        CustomerType::Domestic => progressive_charge(tiers, usage),
        CustomerType::NonDomestic => flat_bracket_charge(tiers, usage),
        CustomerType::RentalDomestic | CustomerType::RentalNonDomestic => {
            rental_charge(tiers, usage)
        }
    }
}

fn price_sewerage(
    customer_type: CustomerType,
    tiers: &[RateTier],
    usage: Decimal,
) -> (Decimal, Vec<TierCharge>) {
    if customer_type.is_domestic_class() {
        progressive_charge(tiers, usage)
    } else {
        flat_bracket_charge(tiers, usage)
    }
}

/// Fill brackets in order, each charged at its own rate.
///
/// Usage left over after a bounded last bracket is charged at that
/// bracket's rate.
fn progressive_charge(tiers: &[RateTier], usage: Decimal) -> (Decimal, Vec<TierCharge>) {
    let mut total = Decimal::ZERO;
    let mut charges = Vec::new();
    let mut remaining = usage;
    let mut previous_limit = Decimal::ZERO;
    let last_index = tiers.len().saturating_sub(1);

    for (index, tier) in tiers.iter().enumerate() {
        if remaining <= Decimal::ZERO {
            break;
        }

        let in_tier = match tier.upper_limit {
            TierLimit::Bounded(limit) if index < last_index => {
                let width = (limit - previous_limit).max(Decimal::ZERO);
                previous_limit = limit;
                remaining.min(width)
            }
            _ => remaining,
        };
        if in_tier <= Decimal::ZERO {
            continue;
        }

        let amount = in_tier * tier.rate;
        total += amount;
        remaining -= in_tier;
        charges.push(tier_charge(index, tier, in_tier, amount));
    }

    (total, charges)
}

/// Whole usage at the rate of the first bracket that covers it, or the last
/// bracket when none does.
fn flat_bracket_charge(tiers: &[RateTier], usage: Decimal) -> (Decimal, Vec<TierCharge>) {
    let selected = tiers
        .iter()
        .enumerate()
        .find(|(_, tier)| tier.upper_limit.covers(usage))
        .or_else(|| tiers.iter().enumerate().last());

    match selected {
        Some((index, tier)) => single_rate_charge(index, tier, usage),
        None => (Decimal::ZERO, Vec::new()),
    }
}

/// Whole usage at the fourth bracket's rate, or the last bracket's when the
/// tariff has fewer.
fn rental_charge(tiers: &[RateTier], usage: Decimal) -> (Decimal, Vec<TierCharge>) {
    let index = if tiers.len() > RENTAL_TIER_INDEX {
        RENTAL_TIER_INDEX
    } else {
        tiers.len().saturating_sub(1)
    };

    match tiers.get(index) {
        Some(tier) => single_rate_charge(index, tier, usage),
        None => (Decimal::ZERO, Vec::new()),
    }
}

fn single_rate_charge(index: usize, tier: &RateTier, usage: Decimal) -> (Decimal, Vec<TierCharge>) {
    let amount = usage * tier.rate;
    let charges = if usage > Decimal::ZERO {
        vec![tier_charge(index, tier, usage, amount)]
    } else {
        Vec::new()
    };
    (amount, charges)
}

fn tier_charge(index: usize, tier: &RateTier, usage: Decimal, amount: Decimal) -> TierCharge {
    TierCharge {
        tier_index: u32::try_from(index).unwrap_or(u32::MAX),
        rate: tier.rate,
        usage,
        amount: round_money(amount),
    }
}

/// VAT is charged to non-domestic classes always and to domestic classes
/// above the usage threshold.
fn vat_applies(tariff: &TariffConfiguration, usage: Decimal) -> bool {
    if tariff.customer_type.is_domestic_class() {
        usage > tariff.domestic_vat_threshold_m3
    } else {
        true
    }
}

/// Fees with a positive charge; anything else is left out of both the list
/// and the sum.
fn fee_charges(tariff: &TariffConfiguration, base_water_charge: Decimal) -> Vec<FeeCharge> {
    tariff
        .additional_fees
        .iter()
        .filter_map(|fee| {
            let amount = round_money(match fee.kind {
                FeeKind::Percentage => fee.value * base_water_charge,
                FeeKind::Flat => fee.value,
            });
            (amount > Decimal::ZERO).then(|| FeeCharge {
                name: fee.name.clone(),
                kind: fee.kind,
                amount,
            })
        })
        .collect()
}
