//! Dispatch and shutdown coordination.
//!
//! The dispatcher accepts triggers, registers their work with the tracker and
//! launches it. On shutdown it closes its accepting gate, stops the transport,
//! then drains the tracker.
//!
//! The gate check and the registration for a trigger happen under one lock,
//! and `shutdown` flips the gate under that same lock. Once the gate is
//! closed no registration can follow, so a finished drain means every
//! registered unit has completed.

use crate::error::{Error, Result};
use crate::jobs::{JobCatalog, WorkBody};
use crate::model::{Acknowledgment, Trigger, WorkItem, WorkState};
use crate::telemetry::metrics;
use crate::telemetry::work::{record_state_transition, start_work_span};
use crate::tracker::{Completion, Tracker};
use chrono::Utc;
use opentelemetry::KeyValue;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{Instrument, Span, debug, error, info, warn};

/// Lifecycle of the dispatcher with respect to new triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Triggers are registered and launched.
    Accepting,
    /// Gate closed; waiting for the transport to stop and work to drain.
    Draining,
    /// Drain finished. The process may exit.
    Terminated,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Accepting => "accepting",
            Phase::Draining => "draining",
            Phase::Terminated => "terminated",
        };
        write!(f, "{s}")
    }
}

/// The transport side of shutdown: stop taking new triggers.
///
/// The returned future resolves once no new trigger can arrive.
pub trait StopAccepting: Send + Sync {
    fn stop_accepting(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Configuration for the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct DispatchConfig {
    /// Upper bound on drain. `None` waits for as long as work runs.
    pub drain_timeout: Option<Duration>,
}

/// How the drain step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStatus {
    /// Every registered unit completed.
    Drained,
    /// The drain timeout expired with work still outstanding.
    TimedOut { outstanding: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub status: DrainStatus,
    /// Time from gate close to drain end.
    pub elapsed: Duration,
}

/// What a call to [`Dispatcher::shutdown`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// This call ran the stop/drain sequence.
    Completed(DrainReport),
    /// Another call was already running it; this one waited for it to finish.
    AlreadyInProgress,
}

/// Accepts triggers, launches their work, and coordinates shutdown.
pub struct Dispatcher {
    catalog: Arc<JobCatalog>,
    tracker: Tracker,
    config: DispatchConfig,
    gate: Arc<Mutex<Phase>>,
    phase: Arc<watch::Sender<Phase>>,
}

impl Clone for Dispatcher {
    fn clone(&self) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
            tracker: self.tracker.clone(),
            config: self.config.clone(),
            gate: Arc::clone(&self.gate),
            phase: Arc::clone(&self.phase),
        }
    }
}

impl Dispatcher {
    pub fn new(catalog: Arc<JobCatalog>, config: DispatchConfig) -> Self {
        let (phase, _rx) = watch::channel(Phase::Accepting);
        Self {
            catalog,
            tracker: Tracker::new(),
            config,
            gate: Arc::new(Mutex::new(Phase::Accepting)),
            phase: Arc::new(phase),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        *self.gate.lock()
    }

    /// The tracker counting this dispatcher's outstanding work.
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Register and launch the work for trigger `name`.
    ///
    /// Returns as soon as the work is registered and spawned; the work itself
    /// runs on the tokio runtime this is called from. Fails with
    /// `Error::NotAccepting` once shutdown has begun.
    pub fn handle_trigger(&self, name: &str) -> Result<Acknowledgment> {
        let trigger = Trigger::new(name);
        let plan = self.catalog.plan_for(name).clone();

        let completions = {
            let gate = self.gate.lock();
            let phase = *gate;
            if phase != Phase::Accepting {
                metrics::triggers_rejected().add(1, &[]);
                debug!(trigger = name, %phase, "trigger rejected");
                return Err(Error::NotAccepting { phase });
            }
            self.tracker.enlist(plan.len())?
        };

        let ack = Acknowledgment {
            trigger: trigger.clone(),
            units: plan.len(),
            acknowledged_at: Utc::now(),
        };

        for ((slot, body), completion) in plan.into_iter().enumerate().zip(completions) {
            let item = WorkItem::new(trigger.clone(), slot + 1);
            tokio::spawn(run_unit(item, body, completion));
        }

        metrics::triggers_accepted().add(1, &[]);
        info!(
            trigger = name,
            trigger_id = %trigger.id,
            units = ack.units,
            outstanding = self.tracker.outstanding(),
            "job started"
        );
        Ok(ack)
    }

    /// Stop accepting triggers, stop the transport, and drain.
    ///
    /// Only the first call runs the sequence. Later or concurrent calls wait
    /// for it to reach `Terminated` and return `AlreadyInProgress`.
    pub async fn shutdown<T: StopAccepting>(&self, transport: &T) -> ShutdownOutcome {
        if !self.close_gate() {
            info!("shutdown already in progress");
            self.wait_terminated().await;
            return ShutdownOutcome::AlreadyInProgress;
        }

        let started = Instant::now();
        info!(
            outstanding = self.tracker.outstanding(),
            "shutdown initiated, no longer accepting triggers"
        );

        if let Err(e) = transport.stop_accepting().await {
            info!(error = %e, "transport stop reported an error, draining anyway");
        } else {
            info!("transport shut down");
        }

        info!(
            outstanding = self.tracker.outstanding(),
            "waiting for running jobs to finish"
        );
        let status = match self.config.drain_timeout {
            None => {
                self.tracker.drain().await;
                DrainStatus::Drained
            }
            Some(limit) => match tokio::time::timeout(limit, self.tracker.drain()).await {
                Ok(()) => DrainStatus::Drained,
                Err(_) => {
                    let outstanding = self.tracker.outstanding();
                    warn!(
                        outstanding,
                        timeout_secs = limit.as_secs_f64(),
                        "drain timed out, abandoning outstanding work"
                    );
                    DrainStatus::TimedOut { outstanding }
                }
            },
        };

        let elapsed = started.elapsed();
        metrics::drain_duration_ms().record(elapsed.as_secs_f64() * 1000.0, &[]);

        {
            let mut gate = self.gate.lock();
            *gate = Phase::Terminated;
            self.phase.send_replace(Phase::Terminated);
        }
        info!(elapsed_ms = elapsed.as_millis() as u64, "shutdown complete");

        ShutdownOutcome::Completed(DrainReport { status, elapsed })
    }

    /// Wait until a shutdown has run to completion.
    pub async fn wait_terminated(&self) {
        let mut rx = self.phase.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|phase| *phase == Phase::Terminated).await;
    }

    /// Flip `Accepting → Draining`. Returns false if already flipped.
    fn close_gate(&self) -> bool {
        let mut gate = self.gate.lock();
        if *gate != Phase::Accepting {
            return false;
        }
        *gate = Phase::Draining;
        self.phase.send_replace(Phase::Draining);
        true
    }
}

/// Run one unit to completion and release its registration.
///
/// The body runs in its own task so that a panic is observed here as a
/// `JoinError` rather than tearing down the completion path.
async fn run_unit(mut item: WorkItem, body: Arc<dyn WorkBody>, completion: Completion) {
    let span = start_work_span(&item.trigger.name, &item.trigger.id.0, item.slot);

    async move {
        advance(&mut item, WorkState::Running);

        let handle = tokio::spawn(body.run(item.clone()).in_current_span());
        let result = match handle.await {
            Ok(Ok(())) => "ok",
            Ok(Err(e)) => {
                warn!(
                    trigger = %item.trigger.name,
                    slot = item.slot,
                    error = %e,
                    "work failed"
                );
                "error"
            }
            Err(e) if e.is_panic() => {
                error!(
                    trigger = %item.trigger.name,
                    slot = item.slot,
                    "work panicked"
                );
                "panic"
            }
            Err(e) => {
                error!(
                    trigger = %item.trigger.name,
                    slot = item.slot,
                    error = %e,
                    "work task cancelled"
                );
                "cancelled"
            }
        };

        advance(&mut item, WorkState::Done);
        metrics::work_completed().add(1, &[KeyValue::new("result", result)]);

        match completion.finish() {
            Ok(remaining) => debug!(outstanding = remaining, "work done"),
            Err(e) => error!(
                trigger = %item.trigger.name,
                trigger_id = %item.trigger.id,
                slot = item.slot,
                error = %e,
                "completion rejected by tracker"
            ),
        }
    }
    .instrument(span)
    .await
}

fn advance(item: &mut WorkItem, to: WorkState) {
    match item.advance(to) {
        Some(from) => record_state_transition(&Span::current(), &from.to_string(), &to.to_string()),
        None => error!(
            trigger = %item.trigger.name,
            slot = item.slot,
            from = %item.state,
            to = %to,
            "invalid work state transition"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopTransport {
        stops: AtomicUsize,
    }

    impl StopAccepting for NoopTransport {
        async fn stop_accepting(&self) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn dispatcher(units: usize, ms: u64) -> Dispatcher {
        let catalog = JobCatalog::uniform(units, Duration::from_millis(ms)).unwrap();
        Dispatcher::new(Arc::new(catalog), DispatchConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_registers_plan_before_returning() {
        let d = dispatcher(3, 1_000);
        let ack = d.handle_trigger("alpha").unwrap();
        assert_eq!(ack.units, 3);
        assert_eq!(ack.body(), "job alpha started");
        assert_eq!(d.tracker().outstanding(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn triggers_rejected_after_gate_closes() {
        let d = dispatcher(1, 10);
        let transport = NoopTransport {
            stops: AtomicUsize::new(0),
        };
        let outcome = d.shutdown(&transport).await;
        assert!(matches!(outcome, ShutdownOutcome::Completed(_)));
        assert_eq!(d.phase(), Phase::Terminated);

        let err = d.handle_trigger("late").unwrap_err();
        assert!(matches!(
            err,
            Error::NotAccepting {
                phase: Phase::Terminated
            }
        ));
        assert_eq!(d.tracker().outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn second_shutdown_waits_and_does_not_rerun() {
        let d = dispatcher(3, 5_000);
        d.handle_trigger("alpha").unwrap();
        let transport = NoopTransport {
            stops: AtomicUsize::new(0),
        };

        let (first, second) = tokio::join!(d.shutdown(&transport), d.shutdown(&transport));

        let outcomes = [first, second];
        let completed = outcomes
            .iter()
            .filter(|o| matches!(o, ShutdownOutcome::Completed(_)))
            .count();
        assert_eq!(completed, 1);
        assert!(outcomes.contains(&ShutdownOutcome::AlreadyInProgress));
        assert_eq!(transport.stops.load(Ordering::SeqCst), 1);
        assert_eq!(d.tracker().outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_timeout_reports_leftover_work() {
        let catalog = JobCatalog::uniform(2, Duration::from_secs(60)).unwrap();
        let d = Dispatcher::new(
            Arc::new(catalog),
            DispatchConfig {
                drain_timeout: Some(Duration::from_secs(1)),
            },
        );
        d.handle_trigger("slow").unwrap();
        let transport = NoopTransport {
            stops: AtomicUsize::new(0),
        };

        match d.shutdown(&transport).await {
            ShutdownOutcome::Completed(report) => {
                assert_eq!(report.status, DrainStatus::TimedOut { outstanding: 2 });
            }
            other => panic!("expected Completed, got {other:?}"),
        }
        assert_eq!(d.phase(), Phase::Terminated);
    }
}
