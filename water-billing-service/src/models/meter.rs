//! Bulk meter and sub-metered customer models.

use crate::models::bill::PaymentStatus;
use crate::models::tariff::CustomerType;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use uuid::Uuid;

/// Bulk meter state at the start of a billing cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterState {
    pub meter_id: Uuid,
    pub meter_number: String,
    pub customer_type: CustomerType,
    pub meter_size: Decimal,
    pub sewerage_connected: bool,
    pub previous_reading: Decimal,
    pub current_reading: Decimal,
    /// Balance carried from the previous cycle.
    pub outstanding_balance: Decimal,
    pub payment_status: PaymentStatus,
}

impl MeterState {
    pub fn bulk_usage(&self) -> Decimal {
        self.current_reading - self.previous_reading
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct MeterRow {
    pub meter_id: Uuid,
    pub meter_number: String,
    pub customer_type: String,
    pub meter_size: Decimal,
    pub sewerage_connected: bool,
    pub previous_reading: Decimal,
    pub current_reading: Decimal,
    pub outstanding_balance: Decimal,
    pub payment_status: String,
}

impl TryFrom<MeterRow> for MeterState {
    type Error = AppError;

    fn try_from(row: MeterRow) -> Result<Self, Self::Error> {
        let customer_type = CustomerType::from_string(&row.customer_type).ok_or_else(|| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Meter {} has unknown customer type '{}'",
                row.meter_number,
                row.customer_type
            ))
        })?;

        Ok(Self {
            meter_id: row.meter_id,
            meter_number: row.meter_number,
            customer_type,
            meter_size: row.meter_size,
            sewerage_connected: row.sewerage_connected,
            previous_reading: row.previous_reading,
            current_reading: row.current_reading,
            outstanding_balance: row.outstanding_balance,
            payment_status: PaymentStatus::from_string(&row.payment_status),
        })
    }
}

/// Readings of a customer sub-metered behind a bulk meter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CustomerUsage {
    pub customer_id: Uuid,
    pub previous_reading: Decimal,
    pub current_reading: Decimal,
}

impl CustomerUsage {
    pub fn usage(&self) -> Decimal {
        self.current_reading - self.previous_reading
    }
}

/// Meter fields advanced by a billing cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterStateDelta {
    pub previous_reading: Decimal,
    pub outstanding_balance: Decimal,
    pub payment_status: PaymentStatus,
}
