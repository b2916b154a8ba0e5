//! Water utility billing engine: tiered tariffs, sewerage, meter rent and
//! debt aging, served over gRPC.

pub mod config;
pub mod engine;
pub mod grpc;
pub mod models;
pub mod services;
pub mod startup;
