//! Metrics collection.
//!
//! # Metrics
//! - `backhaul_watchdog_stalls_total` (counter): exchanges cancelled for lack of progress
//! - `backhaul_watchdog_active_watchers` (gauge): live watcher tasks
//! - `backhaul_backend_opened_total` (counter): backends built, by scheme and op
//!
//! # Design Decisions
//! - Emits through the `metrics` facade; wiring an exporter is the host's call
//! - Low-overhead metric updates (no-ops without an installed recorder)

/// Record an exchange cancelled by the watchdog.
pub fn record_stall() {
    metrics::counter!("backhaul_watchdog_stalls_total").increment(1);
}

pub fn watcher_started() {
    metrics::gauge!("backhaul_watchdog_active_watchers").increment(1.0);
}

pub fn watcher_stopped() {
    metrics::gauge!("backhaul_watchdog_active_watchers").decrement(1.0);
}

/// Record a backend created or opened through a factory.
pub fn record_backend_opened(scheme: &str, op: &'static str) {
    metrics::counter!(
        "backhaul_backend_opened_total",
        "scheme" => scheme.to_string(),
        "op" => op
    )
    .increment(1);
}
