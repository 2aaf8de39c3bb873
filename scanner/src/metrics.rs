//! Admission metrics.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `admission_scans_total{status,method}` - Terminal outcomes recorded in the ledger
//! - `admission_attempts_dropped_total{method}` - Attempts ignored because one was already in progress
//!
//! ## Histograms
//! - `admission_redemption_duration_seconds` - Round trip of one redemption call, timeouts included

use crate::types::{ScanMethod, ScanStatus};
use metrics::{describe_counter, describe_histogram};

/// Terminal outcomes by status and method
pub const SCANS_TOTAL: &str = "admission_scans_total";

/// Attempts dropped by the in-flight guard
pub const ATTEMPTS_DROPPED_TOTAL: &str = "admission_attempts_dropped_total";

/// Redemption call latency
pub const REDEMPTION_DURATION_SECONDS: &str = "admission_redemption_duration_seconds";

/// Register metric descriptions. Call once at startup, before recording.
pub fn register_admission_metrics() {
    describe_counter!(
        SCANS_TOTAL,
        "Scan attempts that reached a terminal outcome, by status (success, failed) and method (qr, manual)"
    );
    describe_counter!(
        ATTEMPTS_DROPPED_TOTAL,
        "Scan attempts ignored because another attempt was in progress or cooling down"
    );
    describe_histogram!(
        REDEMPTION_DURATION_SECONDS,
        "Time taken by one redemption service call"
    );

    tracing::info!("Admission metrics registered");
}

/// Record a terminal outcome
pub fn record_scan(status: ScanStatus, method: ScanMethod) {
    metrics::counter!(SCANS_TOTAL, "status" => status.as_str(), "method" => method.as_str())
        .increment(1);
}

/// Record an attempt dropped by the guard
pub fn record_dropped_attempt(method: ScanMethod) {
    metrics::counter!(ATTEMPTS_DROPPED_TOTAL, "method" => method.as_str()).increment(1);
}

/// Record the duration of one redemption call
pub fn record_redemption_duration(duration_secs: f64) {
    metrics::histogram!(REDEMPTION_DURATION_SECONDS).record(duration_secs);
}
