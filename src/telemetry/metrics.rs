//! Metric instrument factories for drainq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"drainq"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for drainq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("drainq")
}

/// Counter: triggers accepted and dispatched.
pub fn triggers_accepted() -> Counter<u64> {
    meter()
        .u64_counter("drainq.triggers.accepted")
        .with_description("Number of triggers accepted and dispatched")
        .build()
}

/// Counter: triggers refused because shutdown had begun.
pub fn triggers_rejected() -> Counter<u64> {
    meter()
        .u64_counter("drainq.triggers.rejected")
        .with_description("Number of triggers refused during shutdown")
        .build()
}

/// Counter: work units that reported completion.
/// Labels: `result` ("ok" | "error" | "panic" | "cancelled").
pub fn work_completed() -> Counter<u64> {
    meter()
        .u64_counter("drainq.work.completed")
        .with_description("Number of work units completed")
        .build()
}

/// Histogram: time from gate close to drain end, in milliseconds.
pub fn drain_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("drainq.shutdown.drain_duration_ms")
        .with_description("Shutdown drain duration in milliseconds")
        .with_unit("ms")
        .build()
}
