//! Debt-aging model.

use crate::models::tariff::PenaltyTier;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A prior bill as seen by the aging walk.
///
/// Lists of these are ordered newest period first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalBillRecord {
    /// Amount payable on that bill, carried balance included.
    pub total_bill_amount: Decimal,
    /// Principal billed for that period alone.
    #[serde(default)]
    pub this_month_bill_amount: Option<Decimal>,
    #[serde(default)]
    pub amount_paid: Decimal,
    /// Only meaningful on the oldest record in the window.
    #[serde(default)]
    pub balance_carried_forward: Decimal,
}

impl HistoricalBillRecord {
    /// Principal, falling back to the bill total when not recorded.
    pub fn principal(&self) -> Decimal {
        self.this_month_bill_amount.unwrap_or(self.total_bill_amount)
    }

    pub fn unpaid(&self) -> Decimal {
        (self.principal() - self.amount_paid).max(Decimal::ZERO)
    }
}

/// Late-payment penalty settings, taken from the tariff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyConfig {
    pub month_threshold: u32,
    pub bank_lending_rate: Decimal,
    pub tiered_rates: Vec<PenaltyTier>,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            month_threshold: 3,
            bank_lending_rate: Decimal::new(15, 2),
            tiered_rates: Vec::new(),
        }
    }
}

/// Aging buckets and penalty for one billing run.
///
/// Each bucket is a snapshot of the total of the bill at that age, not the
/// portion of the outstanding balance attributed to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingResult {
    pub debit_30: Decimal,
    pub debit_30_to_60: Decimal,
    pub debit_60_plus: Decimal,
    pub penalty_amount: Decimal,
}
