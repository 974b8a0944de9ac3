//! Domain types for the fleet control plane.
//!
//! These describe managed applications, their backend endpoints, the
//! thresholds that drive scaling decisions, and the decision itself.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of samples kept in every application's metric window.
pub const WINDOW_SIZE: usize = 10;

// ── Endpoints ──────────────────────────────────────────────────────

/// A backend server the proxy forwards traffic to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ── Scaling ────────────────────────────────────────────────────────

/// Per-application scaling thresholds, compared against window averages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Average request rate at or below which an idle app scales down.
    pub scale_down_request_rate: u64,
    /// Average request rate that must be exceeded to scale up.
    pub scale_up_request_rate: u64,
    /// Average queue depth that must be exceeded to scale up.
    pub scale_up_queue: u64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            scale_down_request_rate: 2,
            scale_up_request_rate: 5,
            scale_up_queue: 5,
        }
    }
}

/// The outcome of one decision cycle, consumed by an external provisioner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScaleSignal {
    ScaleUp,
    ScaleDown,
    NoChange,
}

impl ScaleSignal {
    /// Numeric code used in text exposition (0 = no change, 1 = up, 2 = down).
    pub fn code(self) -> u8 {
        match self {
            ScaleSignal::NoChange => 0,
            ScaleSignal::ScaleUp => 1,
            ScaleSignal::ScaleDown => 2,
        }
    }
}

impl fmt::Display for ScaleSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScaleSignal::ScaleUp => "scale_up",
            ScaleSignal::ScaleDown => "scale_down",
            ScaleSignal::NoChange => "no_change",
        };
        f.write_str(s)
    }
}

// ── Applications ───────────────────────────────────────────────────

/// A hosted application fronted by the proxy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Application {
    pub name: String,
    /// Position in the fleet, used to derive the listen port.
    pub app_number: u16,
    /// Backend servers in label order (`<owner>-0`, `<owner>-1`, ...).
    pub endpoints: Vec<Endpoint>,
    pub thresholds: ThresholdConfig,
}

impl Application {
    pub fn new(name: impl Into<String>, app_number: u16, thresholds: ThresholdConfig) -> Self {
        Self {
            name: name.into(),
            app_number,
            endpoints: Vec::new(),
            thresholds,
        }
    }

    /// Number of backend replicas currently configured.
    pub fn replicas(&self) -> usize {
        self.endpoints.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_display() {
        assert_eq!(Endpoint::new("10.0.0.4", 8080).to_string(), "10.0.0.4:8080");
    }

    #[test]
    fn signal_codes_are_stable() {
        assert_eq!(ScaleSignal::NoChange.code(), 0);
        assert_eq!(ScaleSignal::ScaleUp.code(), 1);
        assert_eq!(ScaleSignal::ScaleDown.code(), 2);
    }

    #[test]
    fn replicas_track_endpoints() {
        let mut app = Application::new("guestbook", 3, ThresholdConfig::default());
        assert_eq!(app.replicas(), 0);
        app.endpoints.push(Endpoint::new("10.0.0.1", 20000));
        app.endpoints.push(Endpoint::new("10.0.0.1", 20001));
        assert_eq!(app.replicas(), 2);
    }
}
