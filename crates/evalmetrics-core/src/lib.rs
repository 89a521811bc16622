//! evalmetrics core: warehouse-agnostic row types, report format, and errors.
//!
//! This crate defines the metrics row shape, the plain-text report the
//! endpoint serves, and the error surface shared by the gateway. It carries
//! no transport or runtime dependencies.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `EvalError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod report;
pub mod row;

/// Shared result type.
pub use error::{EvalError, Result};
pub use report::Report;
pub use row::MetricsRow;
