//! Run orchestration
//!
//! Owns the queue for the duration of a run, activates targets strictly in
//! order (the observatory is a single exclusively-owned resource), applies
//! the global stop time, and fans status events out to registered
//! observers. Observer callbacks run synchronously on the orchestrator's
//! task, so they see transitions in exactly the order they occurred; a
//! panicking observer is logged and dropped from the rest of the run,
//! never aborting it.

use crate::context::RunContext;
use crate::controller::SharedControllerOps;
use crate::error::ControllerError;
use crate::executor::ObservationExecutor;
use crate::meridian;
use crate::queue::ObservationQueue;
use crate::report::{
    RunReport, ScheduleSummary, StatusEvent, TargetRecord, TargetSummary, TimelineEntry,
    TimelinePreview, Transition,
};
use crate::target::{TargetStatus, OVERHEAD_FACTOR};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Token returned by [`ObserverRegistry::add`]; pass it back to remove the
/// observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(u64);

type ObserverFn = Box<dyn Fn(&StatusEvent) + Send + Sync>;

/// Thread-safe set of status observers.
#[derive(Default)]
pub struct ObserverRegistry {
    next_id: AtomicU64,
    observers: Mutex<Vec<(u64, ObserverFn)>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, observer: impl Fn(&StatusEvent) + Send + Sync + 'static) -> ObserverId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.observers
            .lock()
            .expect("observer registry poisoned")
            .push((id, Box::new(observer)));
        ObserverId(id)
    }

    pub fn remove(&self, id: ObserverId) {
        self.observers
            .lock()
            .expect("observer registry poisoned")
            .retain(|(existing, _)| *existing != id.0);
    }

    /// Invoke every observer. A panic in one callback is caught, logged,
    /// and the offending observer removed.
    pub fn dispatch(&self, event: &StatusEvent) {
        let mut observers = self.observers.lock().expect("observer registry poisoned");
        observers.retain(|(id, observer)| {
            let outcome = catch_unwind(AssertUnwindSafe(|| observer(event)));
            if outcome.is_err() {
                tracing::warn!(
                    observer_id = id,
                    target_name = %event.target_name,
                    "status observer panicked and was removed"
                );
            }
            outcome.is_ok()
        });
    }
}

pub struct Orchestrator {
    ctx: Arc<RunContext>,
    controller: SharedControllerOps,
    observers: Arc<ObserverRegistry>,
}

impl Orchestrator {
    pub fn new(ctx: Arc<RunContext>, controller: SharedControllerOps) -> Self {
        Self {
            ctx,
            controller,
            observers: Arc::new(ObserverRegistry::new()),
        }
    }

    pub fn observers(&self) -> Arc<ObserverRegistry> {
        self.observers.clone()
    }

    pub fn context(&self) -> Arc<RunContext> {
        self.ctx.clone()
    }

    /// Run every target in `queue` to a terminal state, or until the global
    /// stop time / an operator stop cuts the run short.
    pub async fn run(&self, queue: ObservationQueue) -> Result<RunReport, ControllerError> {
        let started_at = self.ctx.now();
        let run_id = Uuid::new_v4();
        let total = queue.len();
        tracing::info!(%run_id, targets = total, dryrun = self.ctx.config.dryrun, "run starting");

        self.controller.connect().await?;

        let observers = self.observers.clone();
        let sink: crate::executor::EventSink =
            Arc::new(move |event: StatusEvent| observers.dispatch(&event));
        let executor =
            ObservationExecutor::new(self.ctx.clone(), self.controller.clone(), sink.clone());

        let mut targets = queue.into_targets();
        let mut records: Vec<TargetRecord> = Vec::with_capacity(targets.len());

        for (position, target) in targets.iter_mut().enumerate() {
            let now = self.ctx.now();
            let stopped = self.ctx.is_cancelled();
            if stopped || self.ctx.past_cutoff(now) {
                let reason = if stopped {
                    "operator cancellation before activation"
                } else {
                    "global stop time reached before activation"
                };
                target.status = TargetStatus::Skipped;
                let transition = Transition {
                    state: TargetStatus::Skipped,
                    at: now,
                    detail: Some(reason.to_string()),
                };
                sink(StatusEvent {
                    target_name: target.name.clone(),
                    old_state: TargetStatus::Pending,
                    new_state: TargetStatus::Skipped,
                    at: now,
                    detail: Some(reason.to_string()),
                });
                records.push(TargetRecord {
                    name: target.name.clone(),
                    terminal_state: TargetStatus::Skipped,
                    reason: Some(reason.to_string()),
                    transitions: vec![transition],
                });
                continue;
            }

            tracing::info!(
                target_name = %target.name,
                position = position + 1,
                total,
                "activating target"
            );
            records.push(executor.execute(target).await);
        }

        let finished_at = self.ctx.now();
        let totals = RunReport::tally(&records);
        tracing::info!(
            %run_id,
            completed = totals.completed,
            partial = totals.completed_partial,
            failed = totals.failed,
            skipped = totals.skipped,
            "run finished"
        );

        Ok(RunReport {
            run_id,
            dryrun: self.ctx.config.dryrun,
            started_at,
            finished_at,
            records,
            totals,
        })
    }

    /// Preview the timeline without ever reaching imaging: queue order plus
    /// each target's predicted meridian window.
    pub fn validate_only(&self, queue: &ObservationQueue) -> TimelinePreview {
        let config = &self.ctx.config;
        let entries = queue
            .iter()
            .map(|target| {
                let estimated_end = target.start_time
                    + chrono::Duration::from_std(target.estimated_duration())
                        .unwrap_or_else(|_| chrono::Duration::seconds(0));
                match meridian::window_for_target(
                    target,
                    &config.site,
                    &config.meridian,
                    target.start_time,
                ) {
                    Ok(window) => TimelineEntry {
                        name: target.name.clone(),
                        start_time: target.start_time,
                        estimated_end,
                        transit_time: Some(window.transit_time),
                        pause_start: Some(window.pause_start),
                        resume_at: Some(window.resume_at),
                        note: (!target.enable_meridian_wait)
                            .then(|| "meridian wait disabled".to_string()),
                    },
                    Err(err) => TimelineEntry {
                        name: target.name.clone(),
                        start_time: target.start_time,
                        estimated_end,
                        transit_time: None,
                        pause_start: None,
                        resume_at: None,
                        note: Some(format!("meridian prediction failed: {err}")),
                    },
                }
            })
            .collect();
        TimelinePreview { entries }
    }

    /// Aggregate statistics over the plan. Pure function of the queue; the
    /// controller is never touched.
    pub fn summary(queue: &ObservationQueue) -> ScheduleSummary {
        let targets: Vec<TargetSummary> = queue
            .iter()
            .map(|target| TargetSummary {
                name: target.name.clone(),
                start_time: target.start_time,
                frames: target.total_frames(),
                exposure_secs: target.total_exposure_secs(),
                estimated_duration: target.estimated_duration(),
            })
            .collect();

        let total_exposure_secs: f64 = targets.iter().map(|t| t.exposure_secs).sum();
        let total_duration_secs = total_exposure_secs * OVERHEAD_FACTOR;

        ScheduleSummary {
            targets,
            total_exposure_secs,
            total_overhead_secs: total_duration_secs - total_exposure_secs,
            total_duration: Duration::from_secs_f64(total_duration_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;
    use crate::config::ScheduleConfig;
    use crate::controller::SimulatedController;
    use crate::target::{FilterExposure, Target};
    use chrono::{DateTime, TimeZone, Utc};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 3, 20, 0, 0).unwrap()
    }

    fn filters(exposure: f64, count: u32) -> Vec<FilterExposure> {
        vec![FilterExposure { filter: "L".into(), exposure_secs: exposure, count, binning: 1 }]
    }

    fn quick_target(name: &str, offset_min: i64, priority: i32) -> Target {
        let mut target = Target::new(
            name,
            5.0,
            30.0,
            base_time() + chrono::Duration::minutes(offset_min),
            priority,
            filters(60.0, 5),
        );
        target.enable_meridian_wait = false;
        target
    }

    fn dry_orchestrator(stop_time: Option<DateTime<Utc>>) -> (Orchestrator, Arc<SimulatedController>) {
        let clock = SimulatedClock::starting_at(base_time());
        let config = ScheduleConfig { stop_time, dryrun: true, ..ScheduleConfig::default() };
        let ctx = Arc::new(RunContext::new(config, Arc::new(clock)));
        let controller = Arc::new(SimulatedController::new(ctx.clock.clone()));
        (Orchestrator::new(ctx, controller.clone()), controller)
    }

    #[tokio::test]
    async fn runs_targets_sequentially_in_queue_order() {
        let (orchestrator, controller) = dry_orchestrator(None);
        let targets = vec![
            quick_target("second", 30, 2),
            quick_target("first", 30, 1),
            quick_target("third", 90, 1),
        ];
        let queue = ObservationQueue::build(&targets, &ScheduleConfig::default()).unwrap();

        let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        {
            let order = order.clone();
            orchestrator.observers().add(move |event: &StatusEvent| {
                if event.new_state == TargetStatus::Imaging {
                    order.lock().unwrap().push(event.target_name.clone());
                }
            });
        }

        let report = orchestrator.run(queue).await.unwrap();
        assert_eq!(report.totals.completed, 3);
        assert_eq!(*order.lock().unwrap(), ["first", "second", "third"]);
        assert_eq!(controller.submission_count(), 3);
    }

    #[tokio::test]
    async fn cutoff_marks_all_remaining_targets_skipped() {
        // First target runs 20:30-20:36; cutoff at 20:40 blocks the rest.
        let stop = base_time() + chrono::Duration::minutes(40);
        let (orchestrator, controller) = dry_orchestrator(Some(stop));
        let targets = vec![
            quick_target("runs", 30, 1),
            quick_target("skipped-a", 60, 1),
            quick_target("skipped-b", 70, 1),
        ];
        let queue = ObservationQueue::build(&targets, &ScheduleConfig::default()).unwrap();

        let report = orchestrator.run(queue).await.unwrap();
        assert_eq!(report.totals.completed, 1);
        assert_eq!(report.totals.skipped, 2);
        for record in &report.records[1..] {
            assert_eq!(record.terminal_state, TargetStatus::Skipped);
            assert!(record.reason.as_ref().unwrap().contains("cutoff")
                || record.reason.as_ref().unwrap().contains("stop time"));
        }
        assert_eq!(controller.submission_count(), 1);
    }

    #[tokio::test]
    async fn panicking_observer_does_not_abort_the_run() {
        let (orchestrator, _controller) = dry_orchestrator(None);
        let queue = ObservationQueue::build(
            &[quick_target("only", 10, 1)],
            &ScheduleConfig::default(),
        )
        .unwrap();

        orchestrator.observers().add(|_event: &StatusEvent| panic!("observer bug"));
        let seen = Arc::new(Mutex::new(0usize));
        {
            let seen = seen.clone();
            orchestrator.observers().add(move |_event| {
                *seen.lock().unwrap() += 1;
            });
        }

        let report = orchestrator.run(queue).await.unwrap();
        assert_eq!(report.totals.completed, 1);
        // The healthy observer kept receiving events.
        assert!(*seen.lock().unwrap() >= 3);
    }

    #[tokio::test]
    async fn observer_removal_stops_delivery() {
        let registry = ObserverRegistry::new();
        let seen = Arc::new(Mutex::new(0usize));
        let id = {
            let seen = seen.clone();
            registry.add(move |_event| {
                *seen.lock().unwrap() += 1;
            })
        };

        let event = StatusEvent {
            target_name: "t".into(),
            old_state: TargetStatus::Pending,
            new_state: TargetStatus::WaitingStart,
            at: base_time(),
            detail: None,
        };
        registry.dispatch(&event);
        registry.remove(id);
        registry.dispatch(&event);
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn dry_run_report_matches_timing_arithmetic_with_zero_network_calls() {
        let (orchestrator, controller) = dry_orchestrator(None);
        let targets = vec![quick_target("a", 30, 1), quick_target("b", 120, 1)];
        let queue = ObservationQueue::build(&targets, &ScheduleConfig::default()).unwrap();

        let report = orchestrator.run(queue).await.unwrap();
        assert!(report.dryrun);
        assert_eq!(report.totals.completed, 2);

        // 5 * 60 s * 1.2 = 360 s of imaging per target.
        let a = &report.records[0];
        let imaging_at = a
            .transitions
            .iter()
            .find(|t| t.state == TargetStatus::Imaging)
            .unwrap()
            .at;
        assert_eq!(imaging_at, base_time() + chrono::Duration::minutes(30));
        let completed_at = a.transitions.last().unwrap().at;
        assert_eq!(
            completed_at,
            base_time() + chrono::Duration::minutes(30) + chrono::Duration::seconds(360)
        );

        // Simulated controller saw both plans; nothing touched a network.
        assert_eq!(controller.submission_count(), 2);
    }

    #[test]
    fn summary_is_pure_arithmetic_over_the_queue() {
        let targets = vec![
            Target::new("a", 5.0, 30.0, base_time(), 1, filters(120.0, 10)),
            Target::new("b", 6.0, 20.0, base_time(), 2, filters(300.0, 4)),
        ];
        let queue = ObservationQueue::build(&targets, &ScheduleConfig::default()).unwrap();

        let summary = Orchestrator::summary(&queue);
        assert_eq!(summary.total_exposure_secs, 2400.0);
        assert!((summary.total_overhead_secs - 480.0).abs() < 1e-6);
        assert!((summary.total_duration.as_secs_f64() - 2880.0).abs() < 1e-6);
        assert_eq!(summary.targets.len(), 2);
    }

    #[tokio::test]
    async fn validate_only_previews_without_touching_the_controller() {
        let (orchestrator, controller) = dry_orchestrator(None);
        let mut with_window = quick_target("windowed", 30, 1);
        with_window.enable_meridian_wait = true;
        let queue = ObservationQueue::build(
            &[with_window, quick_target("plain", 60, 1)],
            &ScheduleConfig::default(),
        )
        .unwrap();

        let preview = orchestrator.validate_only(&queue);
        assert_eq!(preview.entries.len(), 2);
        for entry in &preview.entries {
            assert!(entry.transit_time.is_some());
            assert!(entry.pause_start.unwrap() < entry.resume_at.unwrap());
            assert!(entry.estimated_end > entry.start_time);
        }
        assert_eq!(preview.entries[1].note.as_deref(), Some("meridian wait disabled"));
        assert_eq!(controller.submission_count(), 0);
    }
}
