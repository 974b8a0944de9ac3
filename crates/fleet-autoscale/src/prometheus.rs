//! Prometheus text exposition of the latest decision cycle per application.

use std::fmt::Write;

use crate::controller::CycleReport;

/// Render cycle reports as Prometheus gauges with an `app` label.
pub fn render_prometheus(reports: &[CycleReport]) -> String {
    let mut out = String::new();

    gauge(
        &mut out,
        "fleet_window_request_rate_avg",
        "Average request rate over the metric window.",
        reports,
        |r| r.average.request_rate,
    );
    gauge(
        &mut out,
        "fleet_window_queue_depth_avg",
        "Average queue depth over the metric window.",
        reports,
        |r| r.average.queue_depth,
    );
    gauge(
        &mut out,
        "fleet_window_queue_depth_sum",
        "Total queued requests observed across the metric window.",
        reports,
        |r| r.sum.queue_depth,
    );
    gauge(
        &mut out,
        "fleet_scale_signal",
        "Last scaling signal (0 = no change, 1 = scale up, 2 = scale down).",
        reports,
        |r| u64::from(r.signal.code()),
    );

    out
}

fn gauge(
    out: &mut String,
    name: &str,
    help: &str,
    reports: &[CycleReport],
    value: impl Fn(&CycleReport) -> u64,
) {
    // Writing to a String cannot fail.
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} gauge");
    for r in reports {
        let _ = writeln!(out, "{name}{{app=\"{}\"}} {}", r.app, value(r));
    }
}
