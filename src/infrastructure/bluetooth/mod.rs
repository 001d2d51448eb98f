//! Bluetooth Module
//!
//! Publishes the motor service as a BLE peripheral through BlueZ.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   PeripheralService                      │
//! │   (adapter selection, registration, run loop, shutdown)  │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!              ┌────────┴────────┐
//!              │                 │
//!              ▼                 ▼
//!      ┌───────────────┐  ┌──────────────┐
//!      │ Advertisement │  │     GATT     │
//!      │               │  │              │
//!      │ - local name  │  │ - read/write │
//!      │ - mfr data    │  │ - notify ──► NotificationPoller
//!      │ - TX power    │  │ - descriptors│
//!      └───────────────┘  └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`advertisement`] - advertising payload built from settings
//! - [`gatt`] - translation of the motor service into a BlueZ application
//! - [`service`] - adapter lifecycle and registration handles

pub mod advertisement;
pub mod gatt;
pub mod service;

pub use service::PeripheralService;
