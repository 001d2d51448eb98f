//! Motor-control domain
//!
//! ## Modules
//!
//! - [`models`] - PV values, readings and attribute flags
//! - [`codec`] - text/byte conversion of transported values
//! - [`uuids`] - service, characteristic and descriptor identifiers
//! - [`pv`] - PV access contract and the timeout-aware client
//! - [`characteristic`] / [`descriptor`] - exposed attributes
//! - [`poller`] - change-driven notification polling
//! - [`service`] - assembly of the motor service
//! - [`settings`] - persisted configuration

pub mod characteristic;
pub mod codec;
pub mod descriptor;
pub mod models;
pub mod poller;
pub mod pv;
pub mod service;
pub mod settings;
pub mod uuids;
