//! Domain models for water-billing-service.

mod aging;
mod bill;
mod billing_run;
mod meter;
mod period;
mod tariff;

pub use aging::{AgingResult, HistoricalBillRecord, PenaltyConfig};
pub use bill::{
    BillBreakdown, BillRecord, BillingCyclePayload, FeeCharge, ListBillsFilter, NewBillRecord,
    PaymentStatus, TierCharge,
};
pub use billing_run::{
    BillingRunStatus, BillingRunSummary, MeterBillingOutcome, MeterBillingResult,
};
pub use meter::{CustomerUsage, MeterRow, MeterState, MeterStateDelta};
pub use period::BillingPeriod;
pub use tariff::{
    AdditionalFee, CustomerType, FeeKind, MeterRentPrice, PenaltyTier, RateTier,
    TariffConfiguration, TariffRow, TierLimit,
};
