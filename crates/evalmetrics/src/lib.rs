//! Top-level facade crate for evalmetrics.
//!
//! Re-exports core types and the gateway library so users can depend on a single crate.

pub mod core {
    pub use evalmetrics_core::*;
}

pub mod gateway {
    pub use evalmetrics_gateway::*;
}
