//! fleet-autoscale: metrics-driven scaling signals.
//!
//! Every tick, each managed application's stats are fetched from the proxy,
//! folded into a fixed-length window, and compared against the
//! application's thresholds.
//!
//! # Scaling Algorithm
//!
//! ```text
//! window  = last 10 samples of (request_rate, queue_depth), zero-filled
//! avg     = window sum / 10   (truncating)
//!
//! if avg.request_rate <= scale_down_request_rate and sum.queue_depth == 0:
//!     ScaleDown
//! elif avg.request_rate > scale_up_request_rate and avg.queue_depth > scale_up_queue:
//!     ScaleUp
//! else:
//!     NoChange
//! ```
//!
//! Requiring an empty queue across the whole window before shrinking, and
//! both load and backlog before growing, keeps a single noisy sample from
//! flipping the decision.

pub mod controller;
pub mod policy;
pub mod prometheus;
pub mod window;

pub use controller::{AutoScaleController, CycleReport, SignalCallback, SignalFuture};
pub use policy::decide;
pub use prometheus::render_prometheus;
pub use window::{MetricWindow, WindowSlot, WindowSum};
