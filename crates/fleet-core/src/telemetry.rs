//! Tracing subscriber setup for processes embedding the fleet crates.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{FleetError, FleetResult};

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence over `config.filter`. Fails if a global
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> FleetResult<()> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| FleetError::InvalidConfig(format!("tracing init: {e}")))
}

fn build_filter(config: &LoggingConfig) -> FleetResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| FleetError::InvalidConfig(format!("log filter {:?}: {e}", config.filter))),
    }
}
