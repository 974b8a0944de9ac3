//! fleet-control: the control plane for a proxy-fronted application fleet.
//!
//! Two paths share the set of managed applications and nothing else:
//!
//! ```text
//!  register / set_servers / remove            every poll_interval
//!            │                                        │
//!            ▼                                        ▼
//!   ┌─────────────────┐                    ┌─────────────────────┐
//!   │  FleetManager   │── register ───────▶│ AutoScaleController │
//!   │  (one writer)   │── unregister ─────▶│  feed → window →    │
//!   └────────┬────────┘                    │  decide → signal    │
//!            │ fragments                   └──────────┬──────────┘
//!            ▼                                        │
//!   ┌─────────────────┐                               ▼
//!   │ReloadCoordinator│── reload ──▶ proxy     SignalCallback
//!   └─────────────────┘
//! ```
//!
//! [`Daemon`] builds both from a `FleetConfig` and runs the polling loop
//! until shutdown.

pub mod daemon;
pub mod manager;

pub use daemon::{log_signal, Daemon};
pub use manager::{FleetManager, ManagerSettings, PlatformService};
