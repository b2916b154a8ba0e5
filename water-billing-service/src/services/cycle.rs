//! Billing-cycle orchestration.
//!
//! One cycle reads a bulk meter and its sub-metered customers, prices the
//! difference usage, ages the carried balance and writes the bill together
//! with the meter update in a single store transaction.

use crate::config::BillingSettings;
use crate::engine::{allocate_aging, compute_bill, round_money, MeteredUsage};
use crate::models::{
    BillBreakdown, BillRecord, BillingCyclePayload, BillingPeriod, BillingRunSummary,
    CustomerUsage, HistoricalBillRecord, MeterBillingOutcome, MeterBillingResult, MeterState,
    MeterStateDelta, NewBillRecord, PaymentStatus, PenaltyConfig, TariffConfiguration,
};
use crate::services::metrics::{
    record_billed_amount, record_cycle, record_error, record_rule_of_three,
};
use crate::services::store::{BillingStore, BillingTransaction};
use futures::stream::{self, StreamExt};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use service_core::error::AppError;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Usage billed when the measured difference is implausible.
fn minimum_difference_usage() -> Decimal {
    Decimal::from(3)
}

/// Billed usage of a bulk meter after the anomaly correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DifferenceUsage {
    pub bulk_usage: Decimal,
    pub total_individual_usage: Decimal,
    /// Usage actually billed.
    pub billed: Decimal,
    pub corrected: bool,
}

/// Rule of three.
///
/// Domain rule from the utility's billing practice: when the sub-meters
/// read more than the bulk meter, or the difference is zero, negative, one
/// or two cubic metres, the account is billed three cubic metres instead.
/// Fractional differences such as 1.5 are billed as measured.
pub fn apply_rule_of_three(
    bulk_usage: Decimal,
    total_individual_usage: Decimal,
) -> DifferenceUsage {
    let difference = bulk_usage - total_individual_usage;
    let corrected = bulk_usage < total_individual_usage
        || difference <= Decimal::ZERO
        || difference == Decimal::ONE
        || difference == Decimal::TWO;

    DifferenceUsage {
        bulk_usage,
        total_individual_usage,
        billed: if corrected {
            minimum_difference_usage()
        } else {
            difference
        },
        corrected,
    }
}

/// Compute the bill and meter update for one cycle.
///
/// Pure; the orchestrator supplies the inputs from the locked transaction.
/// A missing tariff prices to zero and ages with the default penalty
/// settings.
pub fn build_cycle_payload(
    meter: &MeterState,
    customers: &[CustomerUsage],
    tariff: Option<&TariffConfiguration>,
    history_newest_first: &[HistoricalBillRecord],
    period: BillingPeriod,
    carry_balance: bool,
) -> BillingCyclePayload {
    let total_individual_usage: Decimal = customers.iter().map(CustomerUsage::usage).sum();
    let difference = apply_rule_of_three(meter.bulk_usage(), total_individual_usage);

    let metered = MeteredUsage::new(difference.billed, meter.meter_size)
        .with_sewerage(meter.sewerage_connected);
    let breakdown = tariff.map_or_else(BillBreakdown::default, |t| compute_bill(t, &metered));

    let penalty_config = tariff.map_or_else(PenaltyConfig::default, |t| t.penalty_config());
    let aging = allocate_aging(
        meter.outstanding_balance,
        history_newest_first,
        &penalty_config,
    );

    let total_payable =
        round_money(breakdown.total_bill + meter.outstanding_balance + aging.penalty_amount);

    let meter_delta = MeterStateDelta {
        previous_reading: meter.current_reading,
        outstanding_balance: if carry_balance {
            total_payable
        } else {
            Decimal::ZERO
        },
        payment_status: if carry_balance {
            PaymentStatus::Unpaid
        } else {
            PaymentStatus::Paid
        },
    };

    let bill = NewBillRecord {
        meter_id: meter.meter_id,
        month_year: period.to_string(),
        period_end: period.period_end(),
        customer_type: meter.customer_type.as_str().to_string(),
        previous_reading: meter.previous_reading,
        current_reading: meter.current_reading,
        bulk_usage: difference.bulk_usage,
        total_individual_usage: difference.total_individual_usage,
        difference_usage: difference.billed,
        rule_of_three_applied: difference.corrected,
        base_water_charge: breakdown.base_water_charge,
        maintenance_fee: breakdown.maintenance_fee,
        sanitation_fee: breakdown.sanitation_fee,
        vat_amount: breakdown.vat_amount,
        meter_rent: breakdown.meter_rent,
        sewerage_charge: breakdown.sewerage_charge,
        additional_fees_charge: breakdown.additional_fees_charge,
        this_month_bill_amount: breakdown.total_bill,
        total_bill_amount: total_payable,
        balance_carried_forward: meter.outstanding_balance,
        debit_30: aging.debit_30,
        debit_30_to_60: aging.debit_30_to_60,
        debit_60_plus: aging.debit_60_plus,
        penalty_amount: aging.penalty_amount,
        payment_status: meter_delta.payment_status,
        breakdown_detail: breakdown.detail_json(),
    };

    BillingCyclePayload { bill, meter_delta }
}

/// Runs billing cycles against a [`BillingStore`].
pub struct BillingCycleOrchestrator<S> {
    store: S,
    settings: BillingSettings,
}

impl<S: BillingStore> BillingCycleOrchestrator<S> {
    pub fn new(store: S, settings: BillingSettings) -> Self {
        Self { store, settings }
    }

    /// Bill one meter for `period`.
    ///
    /// `carry_balance` falls back to the configured default. Any failure
    /// rolls back both the bill insert and the meter update.
    #[instrument(skip(self), fields(meter_id = %meter_id, month_year = %period))]
    pub async fn run_cycle(
        &self,
        meter_id: Uuid,
        period: BillingPeriod,
        carry_balance: Option<bool>,
    ) -> Result<BillRecord, AppError> {
        let carry_balance = carry_balance.unwrap_or(self.settings.carry_balance);

        match self.execute_cycle(meter_id, period, carry_balance).await {
            Ok(bill) => {
                record_cycle("success");
                record_billed_amount(
                    &bill.customer_type,
                    bill.this_month_bill_amount.to_f64().unwrap_or(0.0),
                );
                info!(
                    bill_id = %bill.bill_id,
                    difference_usage = %bill.difference_usage,
                    total_bill_amount = %bill.total_bill_amount,
                    "Billing cycle completed"
                );
                Ok(bill)
            }
            Err(e) => {
                record_cycle("failed");
                record_error(e.kind(), "run_cycle");
                warn!(error = %e, "Billing cycle failed");
                Err(e)
            }
        }
    }

    async fn execute_cycle(
        &self,
        meter_id: Uuid,
        period: BillingPeriod,
        carry_balance: bool,
    ) -> Result<BillRecord, AppError> {
        let mut tx = self.store.begin().await?;

        let meter = tx.lock_meter(meter_id).await?;
        let month_year = period.to_string();
        if tx.bill_exists(meter_id, &month_year).await? {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Meter {} already billed for {}",
                meter.meter_number,
                month_year
            )));
        }

        let customers = tx.associated_customer_usages(meter_id).await?;
        let tariff = tx
            .effective_tariff(meter.customer_type, period.period_end())
            .await?;
        if tariff.is_none() {
            warn!(
                customer_type = meter.customer_type.as_str(),
                billing_date = %period.period_end(),
                "No effective tariff, billing zero charges"
            );
        }
        let history = tx
            .historical_bills(meter_id, period.period_end(), self.settings.aging_window)
            .await?;

        let payload = build_cycle_payload(
            &meter,
            &customers,
            tariff.as_ref(),
            &history,
            period,
            carry_balance,
        );
        if payload.bill.rule_of_three_applied {
            record_rule_of_three();
            info!(
                bulk_usage = %payload.bill.bulk_usage,
                total_individual_usage = %payload.bill.total_individual_usage,
                "Difference usage corrected to the minimum"
            );
        }

        let bill = tx.insert_bill(&payload.bill).await?;
        tx.update_meter(meter_id, meter.previous_reading, &payload.meter_delta)
            .await?;
        tx.commit().await?;

        Ok(bill)
    }

    /// Bill every meter due for `period`, each in its own transaction.
    ///
    /// Per-meter failures are recorded in the summary and do not stop the
    /// run.
    #[instrument(skip(self), fields(month_year = %period))]
    pub async fn run_billing(
        &self,
        period: BillingPeriod,
        carry_balance: Option<bool>,
    ) -> Result<BillingRunSummary, AppError> {
        let meter_ids = self.store.meters_due_for_billing(&period).await?;
        info!(meters = meter_ids.len(), "Starting billing run");

        let results: Vec<MeterBillingResult> = stream::iter(meter_ids)
            .map(|meter_id| async move {
                let outcome = match self.run_cycle(meter_id, period, carry_balance).await {
                    Ok(bill) => MeterBillingOutcome::Billed(bill),
                    Err(e) => MeterBillingOutcome::Failed {
                        error_message: e.to_string(),
                    },
                };
                MeterBillingResult { meter_id, outcome }
            })
            .buffered(self.settings.batch_concurrency.max(1))
            .collect()
            .await;

        let summary = BillingRunSummary { period, results };
        info!(
            status = summary.status().as_str(),
            processed = summary.meters_processed(),
            succeeded = summary.meters_succeeded(),
            failed = summary.meters_failed(),
            "Billing run finished"
        );

        Ok(summary)
    }
}
