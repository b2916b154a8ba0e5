//! Repository seam between the billing-cycle orchestrator and storage.

use crate::models::{
    BillRecord, BillingPeriod, CustomerType, CustomerUsage, HistoricalBillRecord, MeterState,
    MeterStateDelta, NewBillRecord, TariffConfiguration,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

/// Storage that can open billing transactions.
#[async_trait]
pub trait BillingStore: Send + Sync {
    type Transaction: BillingTransaction;

    async fn begin(&self) -> Result<Self::Transaction, AppError>;

    /// Active meters with no bill for `period` yet.
    async fn meters_due_for_billing(&self, period: &BillingPeriod) -> Result<Vec<Uuid>, AppError>;
}

/// One billing cycle's unit of work.
///
/// Dropping a transaction without calling [`BillingTransaction::commit`]
/// discards every write made through it.
#[async_trait]
pub trait BillingTransaction: Send + Sized {
    /// Load the meter and hold it exclusively until the transaction ends.
    /// Fails with `NotFound` for unknown or inactive meters.
    async fn lock_meter(&mut self, meter_id: Uuid) -> Result<MeterState, AppError>;

    async fn associated_customer_usages(
        &mut self,
        meter_id: Uuid,
    ) -> Result<Vec<CustomerUsage>, AppError>;

    /// Most recent tariff for `customer_type` effective on or before
    /// `billing_date`.
    async fn effective_tariff(
        &mut self,
        customer_type: CustomerType,
        billing_date: NaiveDate,
    ) -> Result<Option<TariffConfiguration>, AppError>;

    /// Up to `limit` bills that ended before `before`, newest first.
    async fn historical_bills(
        &mut self,
        meter_id: Uuid,
        before: NaiveDate,
        limit: i64,
    ) -> Result<Vec<HistoricalBillRecord>, AppError>;

    async fn bill_exists(&mut self, meter_id: Uuid, month_year: &str) -> Result<bool, AppError>;

    /// Fails with `Conflict` when the meter already has a bill for the month.
    async fn insert_bill(&mut self, bill: &NewBillRecord) -> Result<BillRecord, AppError>;

    /// Apply `delta` only if the meter's previous reading is still
    /// `expected_previous_reading`; fails with `Conflict` otherwise.
    async fn update_meter(
        &mut self,
        meter_id: Uuid,
        expected_previous_reading: Decimal,
        delta: &MeterStateDelta,
    ) -> Result<(), AppError>;

    async fn commit(self) -> Result<(), AppError>;
}
