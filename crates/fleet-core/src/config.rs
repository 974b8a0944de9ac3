//! fleet.toml configuration parser.
//!
//! Every section is optional; missing keys fall back to the layout of a
//! stock HAProxy install under `/etc/haproxy`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FleetError, FleetResult};
use crate::types::ThresholdConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FleetConfig {
    pub proxy: ProxyConfig,
    pub autoscale: AutoscaleConfig,
    pub health_check: HealthCheckConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Directory holding the base and merged config files.
    pub config_dir: PathBuf,
    /// Fragment directory. Defaults to `<config_dir>/sites-enabled`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sites_dir: Option<PathBuf>,
    /// File name of the merged config the proxy loads.
    pub main_config: String,
    /// File name of the base template.
    pub base_config: String,
    pub stats_socket: PathBuf,
    /// Name passed to `service <name> reload` and matched by the liveness check.
    pub service_name: String,
    /// Address the generated listeners bind to.
    pub listen_address: String,
    /// Application `n` listens on `start_port + n`.
    pub start_port: u16,
    /// Prepended to application names to form fragment owners.
    pub app_prefix: String,
    /// Rewrite the base template even if one already exists.
    pub overwrite_base: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("/etc/haproxy"),
            sites_dir: None,
            main_config: "haproxy.cfg".to_string(),
            base_config: "base.cfg".to_string(),
            stats_socket: PathBuf::from("/etc/haproxy/stats"),
            service_name: "haproxy".to_string(),
            listen_address: "0.0.0.0".to_string(),
            start_port: 10000,
            app_prefix: "gae_".to_string(),
            overwrite_base: true,
        }
    }
}

impl ProxyConfig {
    pub fn sites_dir(&self) -> PathBuf {
        self.sites_dir
            .clone()
            .unwrap_or_else(|| self.config_dir.join("sites-enabled"))
    }

    pub fn main_config_path(&self) -> PathBuf {
        self.config_dir.join(&self.main_config)
    }

    pub fn base_config_path(&self) -> PathBuf {
        self.config_dir.join(&self.base_config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutoscaleConfig {
    /// Period between decision cycles, e.g. "20s".
    pub poll_interval: String,
    /// Per-application budget for one stats feed query.
    pub feed_timeout: String,
    /// Thresholds used when an application is registered without its own.
    pub default_thresholds: ThresholdConfig,
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            poll_interval: "20s".to_string(),
            feed_timeout: "5s".to_string(),
            default_thresholds: ThresholdConfig::default(),
        }
    }
}

impl AutoscaleConfig {
    pub fn poll_interval(&self) -> FleetResult<Duration> {
        parse_duration(&self.poll_interval).ok_or_else(|| {
            FleetError::InvalidConfig(format!("poll_interval: {:?}", self.poll_interval))
        })
    }

    pub fn feed_timeout(&self) -> FleetResult<Duration> {
        parse_duration(&self.feed_timeout).ok_or_else(|| {
            FleetError::InvalidConfig(format!("feed_timeout: {:?}", self.feed_timeout))
        })
    }
}

/// Options appended to every generated `server` line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub max_conn: u32,
    pub inter_ms: u64,
    pub fast_inter_ms: u64,
    pub fall: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            max_conn: 1,
            inter_ms: 20_000,
            fast_inter_ms: 1_000,
            fall: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,fleet=debug".to_string(),
            json: false,
        }
    }
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> FleetResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FleetError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> FleetResult<Self> {
        let config: FleetConfig =
            toml::from_str(content).map_err(|e| FleetError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> FleetResult<String> {
        toml::to_string_pretty(self).map_err(|e| FleetError::InvalidConfig(e.to_string()))
    }

    /// Reject values that would only fail later, mid-operation.
    pub fn validate(&self) -> FleetResult<()> {
        if self.autoscale.poll_interval()?.is_zero() {
            return Err(FleetError::InvalidConfig(
                "poll_interval must be non-zero".to_string(),
            ));
        }
        self.autoscale.feed_timeout()?;
        if self.proxy.main_config == self.proxy.base_config {
            return Err(FleetError::InvalidConfig(
                "main_config and base_config must differ".to_string(),
            ));
        }
        if self.proxy.service_name.trim().is_empty() {
            return Err(FleetError::InvalidConfig(
                "service_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse a duration string like "500ms", "20s", "2m" (bare numbers are seconds).
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
