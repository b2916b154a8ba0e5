//! Bill models.

use crate::models::aging::HistoricalBillRecord;
use crate::models::meter::MeterStateDelta;
use crate::models::tariff::FeeKind;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Payment status of a bill and of the meter account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "paid" => PaymentStatus::Paid,
            _ => PaymentStatus::Unpaid,
        }
    }

    pub fn to_proto(&self) -> i32 {
        match self {
            PaymentStatus::Unpaid => 1,
            PaymentStatus::Paid => 2,
        }
    }
}

/// Charge for the usage that fell into one bracket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierCharge {
    pub tier_index: u32,
    pub rate: Decimal,
    pub usage: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeCharge {
    pub name: String,
    pub kind: FeeKind,
    pub amount: Decimal,
}

/// Priced bill for one period; every monetary field has two decimals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillBreakdown {
    pub total_bill: Decimal,
    pub base_water_charge: Decimal,
    pub maintenance_fee: Decimal,
    pub sanitation_fee: Decimal,
    pub vat_amount: Decimal,
    pub meter_rent: Decimal,
    pub sewerage_charge: Decimal,
    pub additional_fees_charge: Decimal,
    pub tier_breakdown: Vec<TierCharge>,
    pub sewerage_breakdown: Vec<TierCharge>,
    pub additional_fees: Vec<FeeCharge>,
}

impl BillBreakdown {
    /// Sum of the charge components, before the total is rounded.
    pub fn component_sum(&self) -> Decimal {
        self.base_water_charge
            + self.maintenance_fee
            + self.sanitation_fee
            + self.vat_amount
            + self.meter_rent
            + self.sewerage_charge
            + self.additional_fees_charge
    }

    /// Per-tier and per-fee detail kept alongside the bill row for audit.
    pub fn detail_json(&self) -> serde_json::Value {
        serde_json::json!({
            "tier_breakdown": self.tier_breakdown,
            "sewerage_breakdown": self.sewerage_breakdown,
            "additional_fees": self.additional_fees,
        })
    }
}

/// Bill produced by a billing cycle, ready to be inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBillRecord {
    pub meter_id: Uuid,
    pub month_year: String,
    pub period_end: NaiveDate,
    pub customer_type: String,
    pub previous_reading: Decimal,
    pub current_reading: Decimal,
    pub bulk_usage: Decimal,
    pub total_individual_usage: Decimal,
    pub difference_usage: Decimal,
    pub rule_of_three_applied: bool,
    pub base_water_charge: Decimal,
    pub maintenance_fee: Decimal,
    pub sanitation_fee: Decimal,
    pub vat_amount: Decimal,
    pub meter_rent: Decimal,
    pub sewerage_charge: Decimal,
    pub additional_fees_charge: Decimal,
    /// Current-period bill (`BillBreakdown::total_bill`).
    pub this_month_bill_amount: Decimal,
    /// Current-period bill plus carried balance plus penalty.
    pub total_bill_amount: Decimal,
    pub balance_carried_forward: Decimal,
    pub debit_30: Decimal,
    pub debit_30_to_60: Decimal,
    pub debit_60_plus: Decimal,
    pub penalty_amount: Decimal,
    pub payment_status: PaymentStatus,
    pub breakdown_detail: serde_json::Value,
}

impl NewBillRecord {
    /// Materialize the stored row for this bill.
    pub fn into_record(self, bill_id: Uuid, created_utc: DateTime<Utc>) -> BillRecord {
        BillRecord {
            bill_id,
            meter_id: self.meter_id,
            month_year: self.month_year,
            period_end: self.period_end,
            customer_type: self.customer_type,
            previous_reading: self.previous_reading,
            current_reading: self.current_reading,
            bulk_usage: self.bulk_usage,
            total_individual_usage: self.total_individual_usage,
            difference_usage: self.difference_usage,
            rule_of_three_applied: self.rule_of_three_applied,
            base_water_charge: self.base_water_charge,
            maintenance_fee: self.maintenance_fee,
            sanitation_fee: self.sanitation_fee,
            vat_amount: self.vat_amount,
            meter_rent: self.meter_rent,
            sewerage_charge: self.sewerage_charge,
            additional_fees_charge: self.additional_fees_charge,
            this_month_bill_amount: self.this_month_bill_amount,
            total_bill_amount: self.total_bill_amount,
            balance_carried_forward: self.balance_carried_forward,
            amount_paid: Decimal::ZERO,
            debit_30: self.debit_30,
            debit_30_to_60: self.debit_30_to_60,
            debit_60_plus: self.debit_60_plus,
            penalty_amount: self.penalty_amount,
            payment_status: self.payment_status.as_str().to_string(),
            breakdown_detail: Some(self.breakdown_detail),
            created_utc,
        }
    }
}

/// Stored bill row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct BillRecord {
    pub bill_id: Uuid,
    pub meter_id: Uuid,
    pub month_year: String,
    pub period_end: NaiveDate,
    pub customer_type: String,
    pub previous_reading: Decimal,
    pub current_reading: Decimal,
    pub bulk_usage: Decimal,
    pub total_individual_usage: Decimal,
    pub difference_usage: Decimal,
    pub rule_of_three_applied: bool,
    pub base_water_charge: Decimal,
    pub maintenance_fee: Decimal,
    pub sanitation_fee: Decimal,
    pub vat_amount: Decimal,
    pub meter_rent: Decimal,
    pub sewerage_charge: Decimal,
    pub additional_fees_charge: Decimal,
    pub this_month_bill_amount: Decimal,
    pub total_bill_amount: Decimal,
    pub balance_carried_forward: Decimal,
    pub amount_paid: Decimal,
    pub debit_30: Decimal,
    pub debit_30_to_60: Decimal,
    pub debit_60_plus: Decimal,
    pub penalty_amount: Decimal,
    pub payment_status: String,
    pub breakdown_detail: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
}

impl BillRecord {
    pub fn to_historical(&self) -> HistoricalBillRecord {
        HistoricalBillRecord {
            total_bill_amount: self.total_bill_amount,
            this_month_bill_amount: Some(self.this_month_bill_amount),
            amount_paid: self.amount_paid,
            balance_carried_forward: self.balance_carried_forward,
        }
    }
}

/// Everything a billing cycle writes: the new bill and the meter update.
#[derive(Debug, Clone, PartialEq)]
pub struct BillingCyclePayload {
    pub bill: NewBillRecord,
    pub meter_delta: MeterStateDelta,
}

/// Filter parameters for listing bills.
#[derive(Debug, Clone, Default)]
pub struct ListBillsFilter {
    pub page_size: i32,
}
