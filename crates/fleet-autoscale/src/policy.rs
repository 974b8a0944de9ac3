//! Scaling policy: maps window aggregates to a scaling signal.

use fleet_core::{ScaleSignal, ThresholdConfig};

/// Decide whether an application should grow, shrink, or hold.
///
/// Rules, first match wins:
/// 1. average request rate at or below `scale_down_request_rate` and no
///    request queued anywhere in the window → `ScaleDown`
/// 2. average request rate above `scale_up_request_rate` and average
///    queue depth above `scale_up_queue` → `ScaleUp`
/// 3. otherwise → `NoChange`
pub fn decide(
    avg_request_rate: u64,
    avg_queue_depth: u64,
    window_sum_queue_depth: u64,
    thresholds: &ThresholdConfig,
) -> ScaleSignal {
    if avg_request_rate <= thresholds.scale_down_request_rate && window_sum_queue_depth == 0 {
        return ScaleSignal::ScaleDown;
    }

    if avg_request_rate > thresholds.scale_up_request_rate
        && avg_queue_depth > thresholds.scale_up_queue
    {
        return ScaleSignal::ScaleUp;
    }

    ScaleSignal::NoChange
}
