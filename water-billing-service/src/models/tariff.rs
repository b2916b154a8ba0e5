//! Tariff configuration model.

use crate::models::aging::PenaltyConfig;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use service_core::error::AppError;
use sqlx::types::Json;
use sqlx::FromRow;
use std::cmp::Ordering;
use uuid::Uuid;
use validator::Validate;

/// Customer classification a tariff is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerType {
    Domestic,
    NonDomestic,
    RentalDomestic,
    RentalNonDomestic,
}

impl CustomerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerType::Domestic => "domestic",
            CustomerType::NonDomestic => "non_domestic",
            CustomerType::RentalDomestic => "rental_domestic",
            CustomerType::RentalNonDomestic => "rental_non_domestic",
        }
    }

    /// Accepts the stored snake_case form as well as the labels used on
    /// customer records ("Non-domestic", "rental-domestic").
    pub fn from_string(s: &str) -> Option<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "domestic" => Some(CustomerType::Domestic),
            "non_domestic" => Some(CustomerType::NonDomestic),
            "rental_domestic" => Some(CustomerType::RentalDomestic),
            "rental_non_domestic" => Some(CustomerType::RentalNonDomestic),
            _ => None,
        }
    }

    pub fn from_proto(value: i32) -> Option<Self> {
        match value {
            1 => Some(CustomerType::Domestic),
            2 => Some(CustomerType::NonDomestic),
            3 => Some(CustomerType::RentalDomestic),
            4 => Some(CustomerType::RentalNonDomestic),
            _ => None,
        }
    }

    pub fn to_proto(&self) -> i32 {
        match self {
            CustomerType::Domestic => 1,
            CustomerType::NonDomestic => 2,
            CustomerType::RentalDomestic => 3,
            CustomerType::RentalNonDomestic => 4,
        }
    }

    /// Domestic and rental-domestic share progressive pricing and the VAT
    /// usage threshold.
    pub fn is_domestic_class(&self) -> bool {
        matches!(self, CustomerType::Domestic | CustomerType::RentalDomestic)
    }
}

/// Upper bound of a tariff bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierLimit {
    Bounded(Decimal),
    Unbounded,
}

impl TierLimit {
    /// True when `usage` falls at or below this limit.
    pub fn covers(&self, usage: Decimal) -> bool {
        match self {
            TierLimit::Bounded(limit) => usage <= *limit,
            TierLimit::Unbounded => true,
        }
    }

    /// Parse a limit label; empty, "unbounded", "infinity" and "inf" mean
    /// no upper bound.
    pub fn parse(label: &str) -> Option<Self> {
        let trimmed = label.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "unbounded" | "infinity" | "inf" => Some(TierLimit::Unbounded),
            _ => trimmed.parse::<Decimal>().ok().map(TierLimit::Bounded),
        }
    }
}

impl Ord for TierLimit {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (TierLimit::Bounded(a), TierLimit::Bounded(b)) => a.cmp(b),
            (TierLimit::Bounded(_), TierLimit::Unbounded) => Ordering::Less,
            (TierLimit::Unbounded, TierLimit::Bounded(_)) => Ordering::Greater,
            (TierLimit::Unbounded, TierLimit::Unbounded) => Ordering::Equal,
        }
    }
}

impl PartialOrd for TierLimit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for TierLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TierLimit::Bounded(limit) => write!(f, "{}", limit),
            TierLimit::Unbounded => write!(f, "unbounded"),
        }
    }
}

impl Serialize for TierLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TierLimit::Bounded(limit) => Serialize::serialize(limit, serializer),
            TierLimit::Unbounded => serializer.serialize_str("unbounded"),
        }
    }
}

impl<'de> Deserialize<'de> for TierLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawLimit {
            Amount(Decimal),
            Label(String),
        }

        match Option::<RawLimit>::deserialize(deserializer)? {
            None => Ok(TierLimit::Unbounded),
            Some(RawLimit::Amount(limit)) => Ok(TierLimit::Bounded(limit)),
            Some(RawLimit::Label(label)) => TierLimit::parse(&label).ok_or_else(|| {
                serde::de::Error::custom(format!("invalid tier limit: {}", label))
            }),
        }
    }
}

/// One bracket of a tariff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTier {
    pub rate: Decimal,
    #[serde(alias = "limit")]
    pub upper_limit: TierLimit,
}

impl RateTier {
    pub fn new(rate: Decimal, upper_limit: TierLimit) -> Self {
        Self { rate, upper_limit }
    }
}

/// Flat monthly rent for a meter size label ("3/4", "1", "0.5").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterRentPrice {
    pub size_label: String,
    pub amount: Decimal,
}

/// How an additional fee is charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeKind {
    /// Fraction of the base water charge.
    Percentage,
    Flat,
}

impl FeeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeKind::Percentage => "percentage",
            FeeKind::Flat => "flat",
        }
    }

    pub fn from_proto(value: i32) -> Option<Self> {
        match value {
            1 => Some(FeeKind::Percentage),
            2 => Some(FeeKind::Flat),
            _ => None,
        }
    }

    pub fn to_proto(&self) -> i32 {
        match self {
            FeeKind::Percentage => 1,
            FeeKind::Flat => 2,
        }
    }
}

/// Ad-hoc fee configured on a tariff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditionalFee {
    pub name: String,
    pub kind: FeeKind,
    pub value: Decimal,
}

/// Extra penalty rate once the oldest unpaid bill reaches `month_age`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyTier {
    pub month_age: u32,
    pub extra_rate: Decimal,
}

fn default_penalty_month_threshold() -> u32 {
    3
}

fn default_bank_lending_rate() -> Decimal {
    Decimal::new(15, 2)
}

/// Tariff reference data, keyed by customer type and effective date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TariffConfiguration {
    pub customer_type: CustomerType,
    pub effective_date: NaiveDate,
    #[validate(length(min = 1, message = "at least one rate tier is required"))]
    pub tiers: Vec<RateTier>,
    #[serde(default)]
    pub sewerage_tiers: Vec<RateTier>,
    #[serde(default)]
    pub maintenance_percentage: Decimal,
    #[serde(default)]
    pub sanitation_percentage: Decimal,
    #[serde(default)]
    pub meter_rent_prices: Vec<MeterRentPrice>,
    #[serde(default)]
    pub vat_rate: Decimal,
    #[serde(default)]
    pub domestic_vat_threshold_m3: Decimal,
    #[serde(default)]
    pub additional_fees: Vec<AdditionalFee>,
    #[serde(default = "default_penalty_month_threshold")]
    pub penalty_month_threshold: u32,
    #[serde(default = "default_bank_lending_rate")]
    pub bank_lending_rate: Decimal,
    #[serde(default)]
    pub penalty_tiered_rates: Vec<PenaltyTier>,
}

impl TariffConfiguration {
    /// Tariff with the given brackets and every other setting at its default.
    pub fn new(customer_type: CustomerType, effective_date: NaiveDate, tiers: Vec<RateTier>) -> Self {
        Self {
            customer_type,
            effective_date,
            tiers,
            sewerage_tiers: Vec::new(),
            maintenance_percentage: Decimal::ZERO,
            sanitation_percentage: Decimal::ZERO,
            meter_rent_prices: Vec::new(),
            vat_rate: Decimal::ZERO,
            domestic_vat_threshold_m3: Decimal::ZERO,
            additional_fees: Vec::new(),
            penalty_month_threshold: default_penalty_month_threshold(),
            bank_lending_rate: default_bank_lending_rate(),
            penalty_tiered_rates: Vec::new(),
        }
    }

    pub fn penalty_config(&self) -> PenaltyConfig {
        PenaltyConfig {
            month_threshold: self.penalty_month_threshold,
            bank_lending_rate: self.bank_lending_rate,
            tiered_rates: self.penalty_tiered_rates.clone(),
        }
    }

    /// Boundary validation for tariffs entering the system.
    ///
    /// The calculators tolerate anything (empty tiers price to zero); this
    /// rejects configurations that would silently produce wrong bills.
    pub fn validate_config(&self) -> Result<(), AppError> {
        self.validate()?;

        check_tiers("tiers", &self.tiers)?;
        check_tiers("sewerage_tiers", &self.sewerage_tiers)?;

        let fractions = [
            ("maintenance_percentage", self.maintenance_percentage),
            ("sanitation_percentage", self.sanitation_percentage),
            ("vat_rate", self.vat_rate),
            ("domestic_vat_threshold_m3", self.domestic_vat_threshold_m3),
            ("bank_lending_rate", self.bank_lending_rate),
        ];
        for (name, value) in fractions {
            if value < Decimal::ZERO {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "{} must not be negative",
                    name
                )));
            }
        }

        if self.meter_rent_prices.iter().any(|p| p.amount < Decimal::ZERO) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "meter rent amounts must not be negative"
            )));
        }

        if self.additional_fees.iter().any(|f| f.name.trim().is_empty()) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "additional fees must be named"
            )));
        }

        Ok(())
    }
}

fn check_tiers(field: &str, tiers: &[RateTier]) -> Result<(), AppError> {
    if tiers.iter().any(|t| t.rate < Decimal::ZERO) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "{}: rates must not be negative",
            field
        )));
    }

    let ascending = tiers
        .windows(2)
        .all(|pair| pair[0].upper_limit < pair[1].upper_limit);
    if !ascending {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "{}: limits must be strictly ascending with only the last tier unbounded",
            field
        )));
    }

    Ok(())
}

/// Tariff row as stored; JSON columns hold the list-shaped settings.
#[derive(Debug, Clone, FromRow)]
pub struct TariffRow {
    pub tariff_id: Uuid,
    pub customer_type: String,
    pub effective_date: NaiveDate,
    pub tiers: Json<Vec<RateTier>>,
    pub sewerage_tiers: Json<Vec<RateTier>>,
    pub maintenance_percentage: Decimal,
    pub sanitation_percentage: Decimal,
    pub meter_rent_prices: Json<Vec<MeterRentPrice>>,
    pub vat_rate: Decimal,
    pub domestic_vat_threshold_m3: Decimal,
    pub additional_fees: Json<Vec<AdditionalFee>>,
    pub penalty_month_threshold: i32,
    pub bank_lending_rate: Decimal,
    pub penalty_tiered_rates: Json<Vec<PenaltyTier>>,
    pub created_utc: DateTime<Utc>,
}

impl TryFrom<TariffRow> for TariffConfiguration {
    type Error = AppError;

    fn try_from(row: TariffRow) -> Result<Self, Self::Error> {
        let customer_type = CustomerType::from_string(&row.customer_type).ok_or_else(|| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Tariff {} has unknown customer type '{}'",
                row.tariff_id,
                row.customer_type
            ))
        })?;

        Ok(Self {
            customer_type,
            effective_date: row.effective_date,
            tiers: row.tiers.0,
            sewerage_tiers: row.sewerage_tiers.0,
            maintenance_percentage: row.maintenance_percentage,
            sanitation_percentage: row.sanitation_percentage,
            meter_rent_prices: row.meter_rent_prices.0,
            vat_rate: row.vat_rate,
            domestic_vat_threshold_m3: row.domestic_vat_threshold_m3,
            additional_fees: row.additional_fees.0,
            penalty_month_threshold: u32::try_from(row.penalty_month_threshold)
                .unwrap_or_else(|_| default_penalty_month_threshold()),
            bank_lending_rate: row.bank_lending_rate,
            penalty_tiered_rates: row.penalty_tiered_rates.0,
        })
    }
}
