//! Work execution span helpers.
//!
//! Provides span creation and state-transition recording for work items
//! dispatched for a trigger.

use tracing::Span;
use uuid::Uuid;

/// Start a span for one work item's execution.
///
/// The `work.state` field is declared empty and can be updated via
/// [`record_state_transition`].
pub fn start_work_span(trigger: &str, trigger_id: &Uuid, slot: usize) -> Span {
    tracing::info_span!(
        "work.execute",
        "work.trigger" = trigger,
        "work.trigger_id" = %trigger_id,
        "work.slot" = slot,
        "work.state" = tracing::field::Empty,
    )
}

/// Record a state transition event on the given span.
///
/// Emits a tracing `info` event scoped to the span and sets `work.state`.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.record("work.state", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}
