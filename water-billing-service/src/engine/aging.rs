//! Debt-aging allocator.
//!
//! Walks prior bills newest first, attributing the outstanding balance to
//! each bill's unpaid principal until it is used up. The bucket fields record
//! the total of the bill at age one, two and three months; the penalty is
//! charged on the sum of the totals of every bill the walk touched.

use crate::engine::rounding::round_money;
use crate::models::{AgingResult, HistoricalBillRecord, PenaltyConfig};
use rust_decimal::Decimal;

/// Balances at or below one cent are considered settled.
fn settled_threshold() -> Decimal {
    Decimal::new(1, 2)
}

#[derive(Debug, Default)]
struct AgingWalk {
    debit_30: Decimal,
    debit_30_to_60: Decimal,
    debit_60_plus: Decimal,
    penalty_base: Decimal,
    max_age_months: u32,
    remaining: Decimal,
    bills_consumed: usize,
}

fn walk_bills(outstanding_balance: Decimal, bills: &[HistoricalBillRecord]) -> AgingWalk {
    let mut walk = AgingWalk {
        remaining: outstanding_balance,
        ..AgingWalk::default()
    };

    for (index, bill) in bills.iter().enumerate() {
        if walk.remaining <= settled_threshold() {
            break;
        }

        let aged = walk.remaining.min(bill.unpaid());
        if aged <= Decimal::ZERO {
            continue;
        }

        let age_months = u32::try_from(index + 1).unwrap_or(u32::MAX);
        walk.max_age_months = walk.max_age_months.max(age_months);
        match age_months {
            1 => walk.debit_30 = bill.total_bill_amount,
            2 => walk.debit_30_to_60 = bill.total_bill_amount,
            3 => walk.debit_60_plus = bill.total_bill_amount,
            _ => {}
        }

        walk.penalty_base += bill.total_bill_amount;
        walk.remaining -= aged;
        walk.bills_consumed = index + 1;
    }

    walk
}

/// Extra rate of the tiered entry with the largest `month_age` not above
/// `max_age_months`.
fn extra_penalty_rate(config: &PenaltyConfig, max_age_months: u32) -> Decimal {
    config
        .tiered_rates
        .iter()
        .filter(|tier| tier.month_age <= max_age_months)
        .max_by_key(|tier| tier.month_age)
        .map_or(Decimal::ZERO, |tier| tier.extra_rate)
}

/// Age `outstanding_balance` across `bills_newest_first` and compute the
/// late-payment penalty.
pub fn allocate_aging(
    outstanding_balance: Decimal,
    bills_newest_first: &[HistoricalBillRecord],
    config: &PenaltyConfig,
) -> AgingResult {
    if outstanding_balance <= settled_threshold() {
        return AgingResult::default();
    }

    let walk = walk_bills(outstanding_balance, bills_newest_first);

    let penalty_amount = if walk.max_age_months >= config.month_threshold {
        let rate = config.bank_lending_rate + extra_penalty_rate(config, walk.max_age_months);
        round_money(walk.penalty_base * rate)
    } else {
        Decimal::ZERO
    };

    tracing::debug!(
        outstanding_balance = %outstanding_balance,
        bills_consumed = walk.bills_consumed,
        max_age_months = walk.max_age_months,
        penalty_amount = %penalty_amount,
        "Aging allocated"
    );

    AgingResult {
        debit_30: round_money(walk.debit_30),
        debit_30_to_60: round_money(walk.debit_30_to_60),
        debit_60_plus: round_money(walk.debit_60_plus),
        penalty_amount,
    }
}
