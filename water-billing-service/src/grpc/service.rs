//! WaterBillingService gRPC implementation.

use crate::engine::{compute_bill, MeteredUsage};
use crate::grpc::convert::{
    bill_to_proto, billing_run_to_proto, breakdown_to_proto, parse_customer_type, parse_date,
    parse_decimal, parse_decimal_or_zero, parse_uuid, tariff_from_proto, tariff_to_proto,
};
use crate::grpc::proto::water_billing_service_server::WaterBillingService;
use crate::grpc::proto::*;
use crate::models::{BillBreakdown, BillingPeriod, ListBillsFilter, TariffConfiguration};
use crate::services::{
    record_error, record_grpc_request, record_grpc_request_duration, BillingCycleOrchestrator,
    Database,
};
use chrono::Utc;
use service_core::error::AppError;
use service_core::grpc::GrpcResult;
use std::sync::Arc;
use std::time::Instant;
use tonic::{Request, Response, Status};

/// WaterBillingService implementation.
pub struct WaterBillingServiceImpl {
    db: Arc<Database>,
    orchestrator: Arc<BillingCycleOrchestrator<Database>>,
}

impl WaterBillingServiceImpl {
    pub fn new(db: Arc<Database>, orchestrator: Arc<BillingCycleOrchestrator<Database>>) -> Self {
        Self { db, orchestrator }
    }

    async fn create_tariff_inner(
        &self,
        req: CreateTariffRequest,
    ) -> Result<CreateTariffResponse, AppError> {
        let tariff = req
            .tariff
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("tariff is required")))?;
        let tariff = tariff_from_proto(tariff)?;
        tariff.validate_config()?;

        let row = self.db.create_tariff(&tariff).await?;
        let tariff_id = row.tariff_id;
        let stored = TariffConfiguration::try_from(row)?;

        Ok(CreateTariffResponse {
            tariff: Some(tariff_to_proto(tariff_id, &stored)),
        })
    }

    async fn calculate_bill_inner(
        &self,
        req: CalculateBillRequest,
    ) -> Result<CalculateBillResponse, AppError> {
        let customer_type = parse_customer_type(req.customer_type)?;
        let billing_date = if req.billing_date.trim().is_empty() {
            Utc::now().date_naive()
        } else {
            parse_date("billing_date", &req.billing_date)?
        };

        let mut metered = MeteredUsage::new(
            parse_decimal("usage_m3", &req.usage_m3)?,
            parse_decimal_or_zero("meter_size", &req.meter_size)?,
        )
        .with_sewerage(req.sewerage_connected);
        metered.sewerage_usage_override = req
            .sewerage_usage_override
            .as_deref()
            .map(|v| parse_decimal("sewerage_usage_override", v))
            .transpose()?;
        metered.base_usage_override = req
            .base_usage_override
            .as_deref()
            .map(|v| parse_decimal("base_usage_override", v))
            .transpose()?;

        let tariff = self
            .db
            .find_effective_tariff(customer_type, billing_date)
            .await?;
        let tariff_found = tariff.is_some();
        let breakdown = match tariff {
            Some(tariff) => compute_bill(&tariff, &metered),
            None => {
                tracing::warn!(
                    customer_type = customer_type.as_str(),
                    billing_date = %billing_date,
                    "No effective tariff, returning zero breakdown"
                );
                BillBreakdown::default()
            }
        };

        Ok(CalculateBillResponse {
            breakdown: Some(breakdown_to_proto(breakdown)),
            tariff_found,
        })
    }

    async fn run_billing_cycle_inner(
        &self,
        req: RunBillingCycleRequest,
    ) -> Result<RunBillingCycleResponse, AppError> {
        let meter_id = parse_uuid("meter_id", &req.meter_id)?;
        let period: BillingPeriod = req.month_year.parse()?;

        let bill = self
            .orchestrator
            .run_cycle(meter_id, period, req.carry_balance)
            .await?;

        Ok(RunBillingCycleResponse {
            bill: Some(bill_to_proto(bill)),
        })
    }

    async fn run_billing_inner(&self, req: RunBillingRequest) -> Result<RunBillingResponse, AppError> {
        let period: BillingPeriod = req.month_year.parse()?;
        let summary = self
            .orchestrator
            .run_billing(period, req.carry_balance)
            .await?;
        Ok(billing_run_to_proto(summary))
    }

    async fn list_bills_inner(&self, req: ListBillsRequest) -> Result<ListBillsResponse, AppError> {
        let meter_id = parse_uuid("meter_id", &req.meter_id)?;
        let filter = ListBillsFilter {
            page_size: req.page_size,
        };

        let bills = self.db.list_bills(meter_id, &filter).await?;

        Ok(ListBillsResponse {
            bills: bills.into_iter().map(bill_to_proto).collect(),
        })
    }
}

/// Record request metrics and map the handler result onto the wire.
#[allow(clippy::result_large_err)]
fn finish<T>(method: &str, start: Instant, result: Result<T, AppError>) -> GrpcResult<T> {
    record_grpc_request_duration(method, start.elapsed().as_secs_f64());
    match result {
        Ok(body) => {
            record_grpc_request(method, "ok");
            Ok(Response::new(body))
        }
        Err(e) => {
            record_grpc_request(method, "error");
            record_error(e.kind(), method);
            Err(e.into())
        }
    }
}

#[tonic::async_trait]
impl WaterBillingService for WaterBillingServiceImpl {
    async fn create_tariff(
        &self,
        request: Request<CreateTariffRequest>,
    ) -> Result<Response<CreateTariffResponse>, Status> {
        let start = Instant::now();
        let result = self.create_tariff_inner(request.into_inner()).await;
        finish("CreateTariff", start, result)
    }

    async fn calculate_bill(
        &self,
        request: Request<CalculateBillRequest>,
    ) -> Result<Response<CalculateBillResponse>, Status> {
        let start = Instant::now();
        let result = self.calculate_bill_inner(request.into_inner()).await;
        finish("CalculateBill", start, result)
    }

    async fn run_billing_cycle(
        &self,
        request: Request<RunBillingCycleRequest>,
    ) -> Result<Response<RunBillingCycleResponse>, Status> {
        let start = Instant::now();
        let result = self.run_billing_cycle_inner(request.into_inner()).await;
        finish("RunBillingCycle", start, result)
    }

    async fn run_billing(
        &self,
        request: Request<RunBillingRequest>,
    ) -> Result<Response<RunBillingResponse>, Status> {
        let start = Instant::now();
        let result = self.run_billing_inner(request.into_inner()).await;
        finish("RunBilling", start, result)
    }

    async fn list_bills(
        &self,
        request: Request<ListBillsRequest>,
    ) -> Result<Response<ListBillsResponse>, Status> {
        let start = Instant::now();
        let result = self.list_bills_inner(request.into_inner()).await;
        finish("ListBills", start, result)
    }
}
