//! gRPC module for water-billing-service.

mod convert;
mod service;
mod trace_interceptor;

pub use service::WaterBillingServiceImpl;
pub use trace_interceptor::trace_context_interceptor;

/// Generated protobuf code.
pub mod proto {
    tonic::include_proto!("water.billing.v1");

    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("water_billing_descriptor");
}
