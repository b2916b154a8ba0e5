//! Test helper module for water-billing-service integration tests.
//!
//! `MemoryStore` backs orchestrator tests without a database. `TestApp`
//! spawns the full service against PostgreSQL for the gRPC and HTTP tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use service_core::config::Config as CoreConfig;
use service_core::error::AppError;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;
use water_billing_service::config::{BillingSettings, DatabaseConfig, WaterBillingConfig};
use water_billing_service::models::{
    BillRecord, BillingPeriod, CustomerType, CustomerUsage, HistoricalBillRecord, MeterState,
    MeterStateDelta, NewBillRecord, PaymentStatus, RateTier, TariffConfiguration, TierLimit,
};
use water_billing_service::services::{init_metrics, BillingStore, BillingTransaction, Database};
use water_billing_service::startup::Application;

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Debug, Clone, Default)]
struct StoreState {
    meters: HashMap<Uuid, MeterState>,
    customers: HashMap<Uuid, Vec<CustomerUsage>>,
    tariffs: Vec<TariffConfiguration>,
    bills: Vec<BillRecord>,
}

#[derive(Debug, Default)]
struct FailurePlan {
    update_meter: std::sync::Mutex<HashSet<Uuid>>,
}

impl FailurePlan {
    fn update_fails_for(&self, meter_id: Uuid) -> bool {
        self.update_meter
            .lock()
            .map(|ids| ids.contains(&meter_id))
            .unwrap_or(false)
    }
}

/// Store that keeps everything in memory.
///
/// A transaction holds the whole store exclusively and works on a copy;
/// commit writes the copy back, drop discards it.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
    failures: Arc<FailurePlan>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_meter(
        &self,
        meter_number: &str,
        customer_type: CustomerType,
        previous_reading: Decimal,
        current_reading: Decimal,
    ) -> Uuid {
        let meter = MeterState {
            meter_id: Uuid::new_v4(),
            meter_number: meter_number.to_string(),
            customer_type,
            meter_size: dec!(0.75),
            sewerage_connected: false,
            previous_reading,
            current_reading,
            outstanding_balance: Decimal::ZERO,
            payment_status: PaymentStatus::Paid,
        };
        let meter_id = meter.meter_id;
        self.state.lock().await.meters.insert(meter_id, meter);
        meter_id
    }

    pub async fn add_customer(&self, meter_id: Uuid, previous_reading: Decimal, current_reading: Decimal) {
        self.state
            .lock()
            .await
            .customers
            .entry(meter_id)
            .or_default()
            .push(CustomerUsage {
                customer_id: Uuid::new_v4(),
                previous_reading,
                current_reading,
            });
    }

    pub async fn add_tariff(&self, tariff: TariffConfiguration) {
        self.state.lock().await.tariffs.push(tariff);
    }

    /// Record a new reading on the bulk meter.
    pub async fn read_meter(&self, meter_id: Uuid, current_reading: Decimal) {
        if let Some(meter) = self.state.lock().await.meters.get_mut(&meter_id) {
            meter.current_reading = current_reading;
        }
    }

    pub async fn meter(&self, meter_id: Uuid) -> MeterState {
        self.state
            .lock()
            .await
            .meters
            .get(&meter_id)
            .cloned()
            .expect("meter seeded")
    }

    pub async fn bills_for(&self, meter_id: Uuid) -> Vec<BillRecord> {
        self.state
            .lock()
            .await
            .bills
            .iter()
            .filter(|b| b.meter_id == meter_id)
            .cloned()
            .collect()
    }

    pub async fn customers_of(&self, meter_id: Uuid) -> Vec<CustomerUsage> {
        self.state
            .lock()
            .await
            .customers
            .get(&meter_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn fail_meter_update(&self, meter_id: Uuid) {
        self.failures.update_meter.lock().unwrap().insert(meter_id);
    }

    pub fn clear_failures(&self) {
        self.failures.update_meter.lock().unwrap().clear();
    }
}

pub struct MemoryTransaction {
    committed: OwnedMutexGuard<StoreState>,
    working: StoreState,
    failures: Arc<FailurePlan>,
}

#[async_trait]
impl BillingStore for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction, AppError> {
        let committed = self.state.clone().lock_owned().await;
        let working = committed.clone();
        Ok(MemoryTransaction {
            committed,
            working,
            failures: self.failures.clone(),
        })
    }

    async fn meters_due_for_billing(&self, period: &BillingPeriod) -> Result<Vec<Uuid>, AppError> {
        let state = self.state.lock().await;
        let month_year = period.to_string();
        let mut due: Vec<&MeterState> = state
            .meters
            .values()
            .filter(|m| {
                !state
                    .bills
                    .iter()
                    .any(|b| b.meter_id == m.meter_id && b.month_year == month_year)
            })
            .collect();
        due.sort_by(|a, b| a.meter_number.cmp(&b.meter_number));
        Ok(due.into_iter().map(|m| m.meter_id).collect())
    }
}

#[async_trait]
impl BillingTransaction for MemoryTransaction {
    async fn lock_meter(&mut self, meter_id: Uuid) -> Result<MeterState, AppError> {
        self.working
            .meters
            .get(&meter_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Meter {} not found", meter_id)))
    }

    async fn associated_customer_usages(
        &mut self,
        meter_id: Uuid,
    ) -> Result<Vec<CustomerUsage>, AppError> {
        Ok(self.working.customers.get(&meter_id).cloned().unwrap_or_default())
    }

    async fn effective_tariff(
        &mut self,
        customer_type: CustomerType,
        billing_date: NaiveDate,
    ) -> Result<Option<TariffConfiguration>, AppError> {
        Ok(self
            .working
            .tariffs
            .iter()
            .filter(|t| t.customer_type == customer_type && t.effective_date <= billing_date)
            .max_by_key(|t| t.effective_date)
            .cloned())
    }

    async fn historical_bills(
        &mut self,
        meter_id: Uuid,
        before: NaiveDate,
        limit: i64,
    ) -> Result<Vec<HistoricalBillRecord>, AppError> {
        let mut bills: Vec<&BillRecord> = self
            .working
            .bills
            .iter()
            .filter(|b| b.meter_id == meter_id && b.period_end < before)
            .collect();
        bills.sort_by(|a, b| b.period_end.cmp(&a.period_end));
        Ok(bills
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(BillRecord::to_historical)
            .collect())
    }

    async fn bill_exists(&mut self, meter_id: Uuid, month_year: &str) -> Result<bool, AppError> {
        Ok(self
            .working
            .bills
            .iter()
            .any(|b| b.meter_id == meter_id && b.month_year == month_year))
    }

    async fn insert_bill(&mut self, bill: &NewBillRecord) -> Result<BillRecord, AppError> {
        if self.bill_exists(bill.meter_id, &bill.month_year).await? {
            return Err(AppError::Conflict(anyhow::anyhow!("Bill already exists")));
        }
        let record = bill.clone().into_record(Uuid::new_v4(), Utc::now());
        self.working.bills.push(record.clone());
        Ok(record)
    }

    async fn update_meter(
        &mut self,
        meter_id: Uuid,
        expected_previous_reading: Decimal,
        delta: &MeterStateDelta,
    ) -> Result<(), AppError> {
        if self.failures.update_fails_for(meter_id) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "injected meter update failure"
            )));
        }

        let meter = self
            .working
            .meters
            .get_mut(&meter_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Meter {} not found", meter_id)))?;
        if meter.previous_reading != expected_previous_reading {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Meter {} was updated concurrently",
                meter_id
            )));
        }

        meter.previous_reading = delta.previous_reading;
        meter.outstanding_balance = delta.outstanding_balance;
        meter.payment_status = delta.payment_status;
        Ok(())
    }

    async fn commit(self) -> Result<(), AppError> {
        let MemoryTransaction {
            mut committed,
            working,
            ..
        } = self;
        *committed = working;
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Domestic tariff: 10 up to 7 m3, 15 up to 20 m3, 20 beyond.
pub fn domestic_tariff() -> TariffConfiguration {
    TariffConfiguration::new(
        CustomerType::Domestic,
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        vec![
            RateTier::new(dec!(10), TierLimit::Bounded(dec!(7))),
            RateTier::new(dec!(15), TierLimit::Bounded(dec!(20))),
            RateTier::new(dec!(20), TierLimit::Unbounded),
        ],
    )
}

pub fn period(month_year: &str) -> BillingPeriod {
    month_year.parse().unwrap()
}

// =============================================================================
// PostgreSQL-backed application
// =============================================================================

static SCHEMA_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Database URL for testing; PostgreSQL-backed tests are skipped when
/// `TEST_DATABASE_URL` is unset.
pub fn test_database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
}

fn unique_schema_name() -> String {
    let counter = SCHEMA_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("test_water_billing_{}_{}", std::process::id(), counter)
}

/// Test application wrapper for integration tests.
pub struct TestApp {
    pub http_address: String,
    pub grpc_address: String,
    pub http_port: u16,
    pub grpc_port: u16,
    pub db: Database,
    base_url: String,
    schema_name: String,
}

impl TestApp {
    /// Spawn a new test application on random ports in its own schema, or
    /// `None` when no test database is configured.
    pub async fn spawn() -> Option<Self> {
        let Some(base_url) = test_database_url() else {
            eprintln!("TEST_DATABASE_URL not set, skipping PostgreSQL-backed test");
            return None;
        };
        init_metrics();

        let schema_name = unique_schema_name();

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&base_url)
            .await
            .expect("Failed to connect to test database");

        sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema_name))
            .execute(&pool)
            .await
            .ok();
        sqlx::query(&format!("CREATE SCHEMA {}", schema_name))
            .execute(&pool)
            .await
            .expect("Failed to create test schema");
        pool.close().await;

        let separator = if base_url.contains('?') { "&" } else { "?" };
        let db_url_with_schema = format!(
            "{}{}options=-c search_path%3D{}",
            base_url, separator, schema_name
        );

        let config = WaterBillingConfig {
            common: CoreConfig {
                port: 0,
                grpc_port: None,
            },
            service_name: "water-billing-service-test".to_string(),
            service_version: "0.1.0".to_string(),
            log_level: "warn".to_string(),
            otlp_endpoint: None,
            database: DatabaseConfig {
                url: db_url_with_schema.clone(),
                max_connections: 5,
                min_connections: 1,
            },
            billing: BillingSettings::default(),
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let http_port = app.http_port();
        let grpc_port = app.grpc_port();
        let db = Database::new(&db_url_with_schema, 5, 1)
            .await
            .expect("Failed to create test database");

        let http_address = format!("http://127.0.0.1:{}", http_port);
        let grpc_address = format!("http://127.0.0.1:{}", grpc_port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::new();
        let health_url = format!("{}/health", http_address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Some(TestApp {
            http_address,
            grpc_address,
            http_port,
            grpc_port,
            db,
            base_url,
            schema_name,
        })
    }

    /// Create a gRPC client connected to this test app.
    pub async fn grpc_client(
        &self,
    ) -> water_billing_service::grpc::proto::water_billing_service_client::WaterBillingServiceClient<
        tonic::transport::Channel,
    > {
        water_billing_service::grpc::proto::water_billing_service_client::WaterBillingServiceClient::connect(
            self.grpc_address.clone(),
        )
        .await
        .expect("Failed to connect to gRPC server")
    }

    /// Insert an active bulk meter.
    pub async fn seed_meter(
        &self,
        meter_number: &str,
        customer_type: CustomerType,
        previous_reading: Decimal,
        current_reading: Decimal,
    ) -> Uuid {
        let meter_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO meters (meter_id, meter_number, customer_type, meter_size,
                                previous_reading, current_reading)
            VALUES ($1, $2, $3, 0.75, $4, $5)
            "#,
        )
        .bind(meter_id)
        .bind(meter_number)
        .bind(customer_type.as_str())
        .bind(previous_reading)
        .bind(current_reading)
        .execute(self.db.pool())
        .await
        .expect("Failed to seed meter");
        meter_id
    }

    pub async fn seed_customer(&self, meter_id: Uuid, previous_reading: Decimal, current_reading: Decimal) {
        sqlx::query(
            r#"
            INSERT INTO customers (customer_id, meter_id, previous_reading, current_reading)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(meter_id)
        .bind(previous_reading)
        .bind(current_reading)
        .execute(self.db.pool())
        .await
        .expect("Failed to seed customer");
    }

    /// Cleanup test resources (schema).
    pub async fn cleanup(&self) {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&self.base_url)
            .await
            .ok();

        if let Some(pool) = pool {
            let _ = sqlx::query(&format!(
                "DROP SCHEMA IF EXISTS {} CASCADE",
                self.schema_name
            ))
            .execute(&pool)
            .await;
            pool.close().await;
        }
    }
}
