//! fleet-stats: reads traffic statistics from the proxy.
//!
//! The proxy exposes its counters as comma-separated lines on a unix
//! control socket. This crate fetches those lines and decodes the handful
//! of fixed-position fields the autoscaler cares about.
//!
//! # Architecture
//!
//! ```text
//! StatsFeed (trait)
//!   └── SocketStatsFeed → "show info;show stat" over the stats socket
//!
//! parse_record(line) → StatsSample { role, queue_current, request_rate, .. }
//! ```

pub mod feed;
pub mod record;

pub use feed::{SocketStatsFeed, StatsFeed, STATS_QUERY};
pub use record::{parse_record, proxy_name, ServiceRole, StatsSample, MIN_FIELDS};
