//! fleet-core: shared types for the load-balancer fleet control plane.
//!
//! Holds the domain types passed between the statistics, autoscaling and
//! proxy-configuration crates, the common error type, the TOML
//! configuration model, and tracing initialisation for embedding processes.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod types;

pub use config::FleetConfig;
pub use error::{FleetError, FleetResult};
pub use types::*;
