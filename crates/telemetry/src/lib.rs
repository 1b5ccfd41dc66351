//! Telemetry for the lead router: structured logging setup, component
//! health, and in-process counters.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
