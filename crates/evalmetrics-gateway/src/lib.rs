//! evalmetrics gateway library entry.
//!
//! This crate wires configuration, the warehouse client, and the metrics
//! endpoint into an HTTP service. It is consumed by the binary (`main.rs`)
//! and by integration tests.

pub mod app_state;
pub mod config;
pub mod metrics;
pub mod router;
pub mod warehouse;
