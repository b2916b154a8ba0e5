//! Batch billing run model.

use crate::models::bill::BillRecord;
use crate::models::period::BillingPeriod;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregate status of a batch billing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingRunStatus {
    Completed,
    Failed,
}

impl BillingRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingRunStatus::Completed => "completed",
            BillingRunStatus::Failed => "failed",
        }
    }
}

/// Outcome of one meter's cycle inside a batch run.
#[derive(Debug, Clone)]
pub enum MeterBillingOutcome {
    Billed(BillRecord),
    Failed { error_message: String },
}

impl MeterBillingOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            MeterBillingOutcome::Billed(_) => "success",
            MeterBillingOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MeterBillingResult {
    pub meter_id: Uuid,
    pub outcome: MeterBillingOutcome,
}

/// Result of billing every due meter for one period.
#[derive(Debug, Clone)]
pub struct BillingRunSummary {
    pub period: BillingPeriod,
    pub results: Vec<MeterBillingResult>,
}

impl BillingRunSummary {
    pub fn meters_processed(&self) -> usize {
        self.results.len()
    }

    pub fn meters_succeeded(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, MeterBillingOutcome::Billed(_)))
            .count()
    }

    pub fn meters_failed(&self) -> usize {
        self.meters_processed() - self.meters_succeeded()
    }

    /// Completed unless every processed meter failed.
    pub fn status(&self) -> BillingRunStatus {
        if !self.results.is_empty() && self.meters_succeeded() == 0 {
            BillingRunStatus::Failed
        } else {
            BillingRunStatus::Completed
        }
    }
}
