//! fleet-proxy: keeps the proxy's configuration in step with the fleet.
//!
//! The proxy reads a single config file and has no include directive, so
//! each listener owner (an application or a platform service) keeps its own
//! fragment and the effective file is rebuilt from scratch on every change.
//!
//! # Components
//!
//! - **`listen`**: builds one owner's `listen` block from its server list
//! - **`fragments`**: one `<owner>.cfg` per owner in the sites directory
//! - **`base`**: the global/defaults template and directory layout
//! - **`control`**: reload/restart/stop/liveness of the proxy service
//! - **`reload`**: merges base + fragments, swaps the file in, reloads

pub mod base;
pub mod control;
pub mod fragments;
pub mod listen;
pub mod reload;

pub use base::{base_template, initialize_layout};
pub use control::{ProxyControl, ServiceProxyControl};
pub use fragments::{ConfigFragment, FragmentStore};
pub use listen::{ListenBlock, ServerOptions};
pub use reload::ReloadCoordinator;
