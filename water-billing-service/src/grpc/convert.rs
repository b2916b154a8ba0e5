//! Conversions between protobuf messages and domain models.

use crate::grpc::proto;
use crate::models::{
    AdditionalFee, BillBreakdown, BillRecord, BillingRunSummary, CustomerType, FeeCharge, FeeKind,
    MeterBillingOutcome, MeterRentPrice, PaymentStatus, PenaltyTier, RateTier,
    TariffConfiguration, TierCharge, TierLimit,
};
use chrono::{DateTime, NaiveDate, Utc};
use prost_types::Timestamp;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::str::FromStr;
use uuid::Uuid;

fn invalid(message: String) -> AppError {
    AppError::BadRequest(anyhow::anyhow!(message))
}

pub fn parse_uuid(field: &str, s: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(s).map_err(|_| invalid(format!("Invalid {}: '{}'", field, s)))
}

pub fn parse_decimal(field: &str, s: &str) -> Result<Decimal, AppError> {
    Decimal::from_str(s.trim()).map_err(|_| invalid(format!("Invalid {}: '{}'", field, s)))
}

/// Empty strings mean zero.
pub fn parse_decimal_or_zero(field: &str, s: &str) -> Result<Decimal, AppError> {
    if s.trim().is_empty() {
        Ok(Decimal::ZERO)
    } else {
        parse_decimal(field, s)
    }
}

pub fn parse_date(field: &str, s: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| invalid(format!("Invalid {}: '{}', expected YYYY-MM-DD", field, s)))
}

pub fn parse_customer_type(value: i32) -> Result<CustomerType, AppError> {
    CustomerType::from_proto(value)
        .ok_or_else(|| invalid(format!("Invalid customer_type: {}", value)))
}

/// Money on the wire always carries two decimals.
fn money(value: Decimal) -> String {
    let mut value = value;
    value.rescale(2);
    value.to_string()
}

fn datetime_to_timestamp(dt: DateTime<Utc>) -> Option<Timestamp> {
    Some(Timestamp {
        seconds: dt.timestamp(),
        nanos: i32::try_from(dt.timestamp_subsec_nanos()).unwrap_or(0),
    })
}

// =============================================================================
// Tariffs
// =============================================================================

fn rate_tier_from_proto(field: &str, tier: proto::RateTier) -> Result<RateTier, AppError> {
    let upper_limit = TierLimit::parse(&tier.upper_limit)
        .ok_or_else(|| invalid(format!("Invalid {} upper_limit: '{}'", field, tier.upper_limit)))?;
    Ok(RateTier::new(
        parse_decimal(&format!("{} rate", field), &tier.rate)?,
        upper_limit,
    ))
}

fn rate_tiers_from_proto(field: &str, tiers: Vec<proto::RateTier>) -> Result<Vec<RateTier>, AppError> {
    tiers
        .into_iter()
        .map(|tier| rate_tier_from_proto(field, tier))
        .collect()
}

/// Build a tariff from its wire form. Unset penalty settings keep their
/// defaults.
pub fn tariff_from_proto(tariff: proto::Tariff) -> Result<TariffConfiguration, AppError> {
    let customer_type = parse_customer_type(tariff.customer_type)?;
    let effective_date = parse_date("effective_date", &tariff.effective_date)?;
    let tiers = rate_tiers_from_proto("tiers", tariff.tiers)?;

    let mut config = TariffConfiguration::new(customer_type, effective_date, tiers);
    config.sewerage_tiers = rate_tiers_from_proto("sewerage_tiers", tariff.sewerage_tiers)?;
    config.maintenance_percentage =
        parse_decimal_or_zero("maintenance_percentage", &tariff.maintenance_percentage)?;
    config.sanitation_percentage =
        parse_decimal_or_zero("sanitation_percentage", &tariff.sanitation_percentage)?;
    config.vat_rate = parse_decimal_or_zero("vat_rate", &tariff.vat_rate)?;
    config.domestic_vat_threshold_m3 =
        parse_decimal_or_zero("domestic_vat_threshold_m3", &tariff.domestic_vat_threshold_m3)?;

    config.meter_rent_prices = tariff
        .meter_rent_prices
        .into_iter()
        .map(|price| -> Result<MeterRentPrice, AppError> {
            Ok(MeterRentPrice {
                amount: parse_decimal("meter rent amount", &price.amount)?,
                size_label: price.size_label,
            })
        })
        .collect::<Result<_, _>>()?;

    config.additional_fees = tariff
        .additional_fees
        .into_iter()
        .map(|fee| -> Result<AdditionalFee, AppError> {
            let kind = FeeKind::from_proto(fee.kind)
                .ok_or_else(|| invalid(format!("Invalid kind for fee '{}'", fee.name)))?;
            Ok(AdditionalFee {
                value: parse_decimal("fee value", &fee.value)?,
                kind,
                name: fee.name,
            })
        })
        .collect::<Result<_, _>>()?;

    if tariff.penalty_month_threshold > 0 {
        config.penalty_month_threshold = tariff.penalty_month_threshold;
    }
    if !tariff.bank_lending_rate.trim().is_empty() {
        config.bank_lending_rate = parse_decimal("bank_lending_rate", &tariff.bank_lending_rate)?;
    }
    config.penalty_tiered_rates = tariff
        .penalty_tiered_rates
        .into_iter()
        .map(|tier| -> Result<PenaltyTier, AppError> {
            Ok(PenaltyTier {
                month_age: tier.month_age,
                extra_rate: parse_decimal("extra_rate", &tier.extra_rate)?,
            })
        })
        .collect::<Result<_, _>>()?;

    Ok(config)
}

fn rate_tier_to_proto(tier: &RateTier) -> proto::RateTier {
    proto::RateTier {
        rate: tier.rate.to_string(),
        upper_limit: tier.upper_limit.to_string(),
    }
}

pub fn tariff_to_proto(tariff_id: Uuid, tariff: &TariffConfiguration) -> proto::Tariff {
    proto::Tariff {
        tariff_id: tariff_id.to_string(),
        customer_type: tariff.customer_type.to_proto(),
        effective_date: tariff.effective_date.format("%Y-%m-%d").to_string(),
        tiers: tariff.tiers.iter().map(rate_tier_to_proto).collect(),
        sewerage_tiers: tariff.sewerage_tiers.iter().map(rate_tier_to_proto).collect(),
        maintenance_percentage: tariff.maintenance_percentage.to_string(),
        sanitation_percentage: tariff.sanitation_percentage.to_string(),
        meter_rent_prices: tariff
            .meter_rent_prices
            .iter()
            .map(|p| proto::MeterRentPrice {
                size_label: p.size_label.clone(),
                amount: money(p.amount),
            })
            .collect(),
        vat_rate: tariff.vat_rate.to_string(),
        domestic_vat_threshold_m3: tariff.domestic_vat_threshold_m3.to_string(),
        additional_fees: tariff
            .additional_fees
            .iter()
            .map(|f| proto::AdditionalFee {
                name: f.name.clone(),
                kind: f.kind.to_proto(),
                value: f.value.to_string(),
            })
            .collect(),
        penalty_month_threshold: tariff.penalty_month_threshold,
        bank_lending_rate: tariff.bank_lending_rate.to_string(),
        penalty_tiered_rates: tariff
            .penalty_tiered_rates
            .iter()
            .map(|t| proto::PenaltyTier {
                month_age: t.month_age,
                extra_rate: t.extra_rate.to_string(),
            })
            .collect(),
    }
}

// =============================================================================
// Pricing
// =============================================================================

fn tier_charge_to_proto(charge: TierCharge) -> proto::TierCharge {
    proto::TierCharge {
        tier_index: charge.tier_index,
        rate: charge.rate.to_string(),
        usage: charge.usage.to_string(),
        amount: money(charge.amount),
    }
}

fn fee_charge_to_proto(charge: FeeCharge) -> proto::FeeCharge {
    proto::FeeCharge {
        name: charge.name,
        kind: charge.kind.to_proto(),
        amount: money(charge.amount),
    }
}

pub fn breakdown_to_proto(breakdown: BillBreakdown) -> proto::BillBreakdown {
    proto::BillBreakdown {
        total_bill: money(breakdown.total_bill),
        base_water_charge: money(breakdown.base_water_charge),
        maintenance_fee: money(breakdown.maintenance_fee),
        sanitation_fee: money(breakdown.sanitation_fee),
        vat_amount: money(breakdown.vat_amount),
        meter_rent: money(breakdown.meter_rent),
        sewerage_charge: money(breakdown.sewerage_charge),
        additional_fees_charge: money(breakdown.additional_fees_charge),
        tier_breakdown: breakdown
            .tier_breakdown
            .into_iter()
            .map(tier_charge_to_proto)
            .collect(),
        sewerage_breakdown: breakdown
            .sewerage_breakdown
            .into_iter()
            .map(tier_charge_to_proto)
            .collect(),
        additional_fees: breakdown
            .additional_fees
            .into_iter()
            .map(fee_charge_to_proto)
            .collect(),
    }
}

// =============================================================================
// Bills
// =============================================================================

pub fn bill_to_proto(bill: BillRecord) -> proto::Bill {
    proto::Bill {
        bill_id: bill.bill_id.to_string(),
        meter_id: bill.meter_id.to_string(),
        month_year: bill.month_year,
        period_end: bill.period_end.format("%Y-%m-%d").to_string(),
        previous_reading: bill.previous_reading.to_string(),
        current_reading: bill.current_reading.to_string(),
        bulk_usage: bill.bulk_usage.to_string(),
        total_individual_usage: bill.total_individual_usage.to_string(),
        difference_usage: bill.difference_usage.to_string(),
        rule_of_three_applied: bill.rule_of_three_applied,
        base_water_charge: money(bill.base_water_charge),
        maintenance_fee: money(bill.maintenance_fee),
        sanitation_fee: money(bill.sanitation_fee),
        vat_amount: money(bill.vat_amount),
        meter_rent: money(bill.meter_rent),
        sewerage_charge: money(bill.sewerage_charge),
        additional_fees_charge: money(bill.additional_fees_charge),
        this_month_bill_amount: money(bill.this_month_bill_amount),
        total_bill_amount: money(bill.total_bill_amount),
        balance_carried_forward: money(bill.balance_carried_forward),
        amount_paid: money(bill.amount_paid),
        debit_30: money(bill.debit_30),
        debit_30_to_60: money(bill.debit_30_to_60),
        debit_60_plus: money(bill.debit_60_plus),
        penalty_amount: money(bill.penalty_amount),
        payment_status: PaymentStatus::from_string(&bill.payment_status).to_proto(),
        created_at: datetime_to_timestamp(bill.created_utc),
    }
}

pub fn billing_run_to_proto(summary: BillingRunSummary) -> proto::RunBillingResponse {
    let count = |n: usize| i32::try_from(n).unwrap_or(i32::MAX);

    proto::RunBillingResponse {
        status: summary.status().as_str().to_string(),
        meters_processed: count(summary.meters_processed()),
        meters_succeeded: count(summary.meters_succeeded()),
        meters_failed: count(summary.meters_failed()),
        results: summary
            .results
            .into_iter()
            .map(|result| {
                let status = result.outcome.status().to_string();
                let (bill_id, error_message) = match result.outcome {
                    MeterBillingOutcome::Billed(bill) => (bill.bill_id.to_string(), String::new()),
                    MeterBillingOutcome::Failed { error_message } => (String::new(), error_message),
                };
                proto::MeterBillingResult {
                    meter_id: result.meter_id.to_string(),
                    status,
                    bill_id,
                    error_message,
                }
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn proto_tariff() -> proto::Tariff {
        proto::Tariff {
            customer_type: 1,
            effective_date: "2024-01-01".to_string(),
            tiers: vec![
                proto::RateTier {
                    rate: "10".to_string(),
                    upper_limit: "7".to_string(),
                },
                proto::RateTier {
                    rate: "20".to_string(),
                    upper_limit: "unbounded".to_string(),
                },
            ],
            additional_fees: vec![proto::AdditionalFee {
                name: "Levy".to_string(),
                kind: 1,
                value: "0.01".to_string(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn tariff_defaults_apply_to_unset_fields() {
        let tariff = tariff_from_proto(proto_tariff()).unwrap();

        assert_eq!(tariff.customer_type, CustomerType::Domestic);
        assert_eq!(tariff.tiers[1].upper_limit, TierLimit::Unbounded);
        assert_eq!(tariff.maintenance_percentage, Decimal::ZERO);
        assert_eq!(tariff.penalty_month_threshold, 3);
        assert_eq!(tariff.bank_lending_rate, dec!(0.15));
        assert_eq!(tariff.additional_fees[0].kind, FeeKind::Percentage);
    }

    #[test]
    fn tariff_rejects_unknown_customer_type() {
        let mut tariff = proto_tariff();
        tariff.customer_type = 0;
        assert!(matches!(
            tariff_from_proto(tariff),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn tariff_rejects_malformed_limit() {
        let mut tariff = proto_tariff();
        tariff.tiers[0].upper_limit = "seven".to_string();
        assert!(tariff_from_proto(tariff).is_err());
    }

    #[test]
    fn money_has_two_decimals() {
        assert_eq!(money(dec!(365)), "365.00");
        assert_eq!(money(dec!(7.3)), "7.30");
    }
}
