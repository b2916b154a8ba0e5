//! Services module for water-billing-service.

pub mod cycle;
pub mod database;
pub mod metrics;
pub mod store;

pub use cycle::{apply_rule_of_three, build_cycle_payload, BillingCycleOrchestrator, DifferenceUsage};
pub use database::{Database, PgBillingTransaction};
pub use metrics::{
    get_metrics, init_metrics, record_billed_amount, record_cycle, record_error,
    record_grpc_request, record_grpc_request_duration, record_rule_of_three,
};
pub use store::{BillingStore, BillingTransaction};
