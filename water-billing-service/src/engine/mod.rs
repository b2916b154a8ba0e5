//! Billing calculators.
//!
//! Everything here is pure: no I/O, no shared state. Callers fetch inputs
//! from the store and persist the outputs.

pub mod aging;
pub mod meter_rent;
pub mod rounding;
pub mod tariff;

pub use aging::allocate_aging;
pub use meter_rent::resolve_meter_rent;
pub use rounding::round_money;
pub use tariff::{compute_bill, MeteredUsage};
