//! Billing period model.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::fmt;
use std::str::FromStr;

/// A calendar billing month, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BillingPeriod {
    year: i32,
    month: u32,
}

impl BillingPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self, AppError> {
        if !(1..=12).contains(&month) || NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Invalid billing period: {}-{:02}",
                year,
                month
            )));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Last day of the month; tariffs are looked up as of this date.
    pub fn period_end(&self) -> NaiveDate {
        let (next_year, next_month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .and_then(|d| d.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for BillingPeriod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid =
            || AppError::BadRequest(anyhow::anyhow!("Invalid month_year '{}', expected YYYY-MM", s));

        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.is_empty() || month.len() > 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;

        Self::new(year, month)
    }
}

impl TryFrom<String> for BillingPeriod {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BillingPeriod> for String {
    fn from(period: BillingPeriod) -> Self {
        period.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_month_year() {
        let period: BillingPeriod = "2024-03".parse().unwrap();
        assert_eq!(period.year(), 2024);
        assert_eq!(period.month(), 3);
        assert_eq!(period.to_string(), "2024-03");
    }

    #[test]
    fn rejects_malformed_month_year() {
        assert!("2024-13".parse::<BillingPeriod>().is_err());
        assert!("2024".parse::<BillingPeriod>().is_err());
        assert!("24-03".parse::<BillingPeriod>().is_err());
        assert!("2024-00".parse::<BillingPeriod>().is_err());
    }

    #[test]
    fn period_end_handles_leap_february_and_december() {
        let feb: BillingPeriod = "2024-02".parse().unwrap();
        assert_eq!(feb.period_end(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let dec: BillingPeriod = "2023-12".parse().unwrap();
        assert_eq!(dec.period_end(), NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
    }

    #[test]
    fn periods_order_chronologically() {
        let a: BillingPeriod = "2023-12".parse().unwrap();
        let b: BillingPeriod = "2024-01".parse().unwrap();
        assert!(a < b);
    }
}
