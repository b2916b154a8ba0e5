//! Database service for water-billing-service.

use crate::models::{
    BillRecord, BillingPeriod, CustomerType, CustomerUsage, HistoricalBillRecord, ListBillsFilter,
    MeterRow, MeterState, MeterStateDelta, NewBillRecord, TariffConfiguration, TariffRow,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{BillingStore, BillingTransaction};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{PgExecutor, Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const TARIFF_COLUMNS: &str = "tariff_id, customer_type, effective_date, tiers, sewerage_tiers, \
     maintenance_percentage, sanitation_percentage, meter_rent_prices, vat_rate, \
     domestic_vat_threshold_m3, additional_fees, penalty_month_threshold, bank_lending_rate, \
     penalty_tiered_rates, created_utc";

const BILL_COLUMNS: &str = "bill_id, meter_id, month_year, period_end, customer_type, \
     previous_reading, current_reading, bulk_usage, total_individual_usage, difference_usage, \
     rule_of_three_applied, base_water_charge, maintenance_fee, sanitation_fee, vat_amount, \
     meter_rent, sewerage_charge, additional_fees_charge, this_month_bill_amount, \
     total_bill_amount, balance_carried_forward, amount_paid, debit_30, debit_30_to_60, \
     debit_60_plus, penalty_amount, payment_status, breakdown_detail, created_utc";

fn db_error(context: &str, e: sqlx::Error) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "water-billing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| db_error("Failed to connect", e))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Health check failed", e))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // =========================================================================
    // Tariff Operations
    // =========================================================================

    /// Store a tariff. One tariff per customer type and effective date.
    #[instrument(skip(self, tariff), fields(customer_type = tariff.customer_type.as_str(), effective_date = %tariff.effective_date))]
    pub async fn create_tariff(&self, tariff: &TariffConfiguration) -> Result<TariffRow, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_tariff"])
            .start_timer();

        let tariff_id = Uuid::new_v4();
        let query = format!(
            r#"
            INSERT INTO tariffs (tariff_id, customer_type, effective_date, tiers, sewerage_tiers,
                maintenance_percentage, sanitation_percentage, meter_rent_prices, vat_rate,
                domestic_vat_threshold_m3, additional_fees, penalty_month_threshold,
                bank_lending_rate, penalty_tiered_rates)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {}
            "#,
            TARIFF_COLUMNS
        );

        let row = sqlx::query_as::<_, TariffRow>(&query)
            .bind(tariff_id)
            .bind(tariff.customer_type.as_str())
            .bind(tariff.effective_date)
            .bind(Json(&tariff.tiers))
            .bind(Json(&tariff.sewerage_tiers))
            .bind(tariff.maintenance_percentage)
            .bind(tariff.sanitation_percentage)
            .bind(Json(&tariff.meter_rent_prices))
            .bind(tariff.vat_rate)
            .bind(tariff.domestic_vat_threshold_m3)
            .bind(Json(&tariff.additional_fees))
            .bind(i32::try_from(tariff.penalty_month_threshold).unwrap_or(i32::MAX))
            .bind(tariff.bank_lending_rate)
            .bind(Json(&tariff.penalty_tiered_rates))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    AppError::Conflict(anyhow::anyhow!(
                        "A {} tariff effective {} already exists",
                        tariff.customer_type.as_str(),
                        tariff.effective_date
                    ))
                }
                _ => db_error("Failed to create tariff", e),
            })?;

        timer.observe_duration();
        info!(tariff_id = %row.tariff_id, "Tariff created");

        Ok(row)
    }

    /// Tariff in force for `customer_type` on `billing_date`.
    #[instrument(skip(self), fields(customer_type = customer_type.as_str()))]
    pub async fn find_effective_tariff(
        &self,
        customer_type: CustomerType,
        billing_date: NaiveDate,
    ) -> Result<Option<TariffConfiguration>, AppError> {
        fetch_effective_tariff(&self.pool, customer_type, billing_date).await
    }

    // =========================================================================
    // Bill Operations
    // =========================================================================

    /// Bills for a meter, newest period first.
    #[instrument(skip(self, filter), fields(meter_id = %meter_id))]
    pub async fn list_bills(
        &self,
        meter_id: Uuid,
        filter: &ListBillsFilter,
    ) -> Result<Vec<BillRecord>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_bills"])
            .start_timer();

        let limit = if filter.page_size > 0 {
            filter.page_size.min(100)
        } else {
            24
        };
        let query = format!(
            "SELECT {} FROM bills WHERE meter_id = $1 ORDER BY period_end DESC LIMIT $2",
            BILL_COLUMNS
        );

        let bills = sqlx::query_as::<_, BillRecord>(&query)
            .bind(meter_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list bills", e))?;

        timer.observe_duration();

        Ok(bills)
    }
}

async fn fetch_effective_tariff<'e, E>(
    executor: E,
    customer_type: CustomerType,
    billing_date: NaiveDate,
) -> Result<Option<TariffConfiguration>, AppError>
where
    E: PgExecutor<'e>,
{
    let timer = DB_QUERY_DURATION
        .with_label_values(&["effective_tariff"])
        .start_timer();

    let query = format!(
        r#"
        SELECT {}
        FROM tariffs
        WHERE customer_type = $1 AND effective_date <= $2
        ORDER BY effective_date DESC
        LIMIT 1
        "#,
        TARIFF_COLUMNS
    );

    let row = sqlx::query_as::<_, TariffRow>(&query)
        .bind(customer_type.as_str())
        .bind(billing_date)
        .fetch_optional(executor)
        .await
        .map_err(|e| db_error("Failed to load tariff", e))?;

    timer.observe_duration();

    row.map(TariffConfiguration::try_from).transpose()
}

#[async_trait]
impl BillingStore for Database {
    type Transaction = PgBillingTransaction;

    async fn begin(&self) -> Result<PgBillingTransaction, AppError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;
        Ok(PgBillingTransaction { tx })
    }

    #[instrument(skip(self), fields(month_year = %period))]
    async fn meters_due_for_billing(&self, period: &BillingPeriod) -> Result<Vec<Uuid>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["meters_due_for_billing"])
            .start_timer();

        let meter_ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT m.meter_id
            FROM meters m
            WHERE m.is_active
              AND NOT EXISTS (
                  SELECT 1 FROM bills b WHERE b.meter_id = m.meter_id AND b.month_year = $1
              )
            ORDER BY m.meter_number
            "#,
        )
        .bind(period.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list meters due for billing", e))?;

        timer.observe_duration();

        Ok(meter_ids)
    }
}

/// A billing cycle's PostgreSQL transaction. Rolled back on drop.
pub struct PgBillingTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BillingTransaction for PgBillingTransaction {
    #[instrument(skip(self), fields(meter_id = %meter_id))]
    async fn lock_meter(&mut self, meter_id: Uuid) -> Result<MeterState, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["lock_meter"])
            .start_timer();

        let row = sqlx::query_as::<_, MeterRow>(
            r#"
            SELECT meter_id, meter_number, customer_type, meter_size, sewerage_connected,
                   previous_reading, current_reading, outstanding_balance, payment_status
            FROM meters
            WHERE meter_id = $1 AND is_active
            FOR UPDATE
            "#,
        )
        .bind(meter_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to lock meter", e))?;

        timer.observe_duration();

        let row = row
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Meter {} not found", meter_id)))?;
        MeterState::try_from(row)
    }

    async fn associated_customer_usages(
        &mut self,
        meter_id: Uuid,
    ) -> Result<Vec<CustomerUsage>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["customer_usages"])
            .start_timer();

        let customers = sqlx::query_as::<_, CustomerUsage>(
            r#"
            SELECT customer_id, previous_reading, current_reading
            FROM customers
            WHERE meter_id = $1 AND is_active
            "#,
        )
        .bind(meter_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to load customer usages", e))?;

        timer.observe_duration();

        Ok(customers)
    }

    async fn effective_tariff(
        &mut self,
        customer_type: CustomerType,
        billing_date: NaiveDate,
    ) -> Result<Option<TariffConfiguration>, AppError> {
        fetch_effective_tariff(&mut *self.tx, customer_type, billing_date).await
    }

    async fn historical_bills(
        &mut self,
        meter_id: Uuid,
        before: NaiveDate,
        limit: i64,
    ) -> Result<Vec<HistoricalBillRecord>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["historical_bills"])
            .start_timer();

        let rows = sqlx::query_as::<_, (Decimal, Option<Decimal>, Decimal, Decimal)>(
            r#"
            SELECT total_bill_amount, this_month_bill_amount, amount_paid, balance_carried_forward
            FROM bills
            WHERE meter_id = $1 AND period_end < $2
            ORDER BY period_end DESC
            LIMIT $3
            "#,
        )
        .bind(meter_id)
        .bind(before)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to load historical bills", e))?;

        timer.observe_duration();

        Ok(rows
            .into_iter()
            .map(
                |(total_bill_amount, this_month_bill_amount, amount_paid, balance_carried_forward)| {
                    HistoricalBillRecord {
                        total_bill_amount,
                        this_month_bill_amount,
                        amount_paid,
                        balance_carried_forward,
                    }
                },
            )
            .collect())
    }

    async fn bill_exists(&mut self, meter_id: Uuid, month_year: &str) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM bills WHERE meter_id = $1 AND month_year = $2)",
        )
        .bind(meter_id)
        .bind(month_year)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to check existing bill", e))
    }

    #[instrument(skip(self, bill), fields(meter_id = %bill.meter_id, month_year = %bill.month_year))]
    async fn insert_bill(&mut self, bill: &NewBillRecord) -> Result<BillRecord, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_bill"])
            .start_timer();

        let query = format!(
            r#"
            INSERT INTO bills (bill_id, meter_id, month_year, period_end, customer_type,
                previous_reading, current_reading, bulk_usage, total_individual_usage,
                difference_usage, rule_of_three_applied, base_water_charge, maintenance_fee,
                sanitation_fee, vat_amount, meter_rent, sewerage_charge, additional_fees_charge,
                this_month_bill_amount, total_bill_amount, balance_carried_forward, debit_30,
                debit_30_to_60, debit_60_plus, penalty_amount, payment_status, breakdown_detail)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21, $22, $23, $24, $25, $26, $27)
            RETURNING {}
            "#,
            BILL_COLUMNS
        );

        let record = sqlx::query_as::<_, BillRecord>(&query)
            .bind(Uuid::new_v4())
            .bind(bill.meter_id)
            .bind(&bill.month_year)
            .bind(bill.period_end)
            .bind(&bill.customer_type)
            .bind(bill.previous_reading)
            .bind(bill.current_reading)
            .bind(bill.bulk_usage)
            .bind(bill.total_individual_usage)
            .bind(bill.difference_usage)
            .bind(bill.rule_of_three_applied)
            .bind(bill.base_water_charge)
            .bind(bill.maintenance_fee)
            .bind(bill.sanitation_fee)
            .bind(bill.vat_amount)
            .bind(bill.meter_rent)
            .bind(bill.sewerage_charge)
            .bind(bill.additional_fees_charge)
            .bind(bill.this_month_bill_amount)
            .bind(bill.total_bill_amount)
            .bind(bill.balance_carried_forward)
            .bind(bill.debit_30)
            .bind(bill.debit_30_to_60)
            .bind(bill.debit_60_plus)
            .bind(bill.penalty_amount)
            .bind(bill.payment_status.as_str())
            .bind(&bill.breakdown_detail)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    AppError::Conflict(anyhow::anyhow!(
                        "Meter {} already billed for {}",
                        bill.meter_id,
                        bill.month_year
                    ))
                }
                _ => db_error("Failed to insert bill", e),
            })?;

        timer.observe_duration();

        Ok(record)
    }

    #[instrument(skip(self, delta), fields(meter_id = %meter_id))]
    async fn update_meter(
        &mut self,
        meter_id: Uuid,
        expected_previous_reading: Decimal,
        delta: &MeterStateDelta,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_meter"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE meters
            SET previous_reading = $3, outstanding_balance = $4, payment_status = $5,
                updated_utc = NOW()
            WHERE meter_id = $1 AND previous_reading = $2
            "#,
        )
        .bind(meter_id)
        .bind(expected_previous_reading)
        .bind(delta.previous_reading)
        .bind(delta.outstanding_balance)
        .bind(delta.payment_status.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| db_error("Failed to update meter", e))?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Meter {} was advanced by another billing cycle",
                meter_id
            )));
        }
        Ok(())
    }

    async fn commit(self) -> Result<(), AppError> {
        self.tx
            .commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))
    }
}
