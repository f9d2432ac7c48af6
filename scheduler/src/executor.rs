//! Target observation state machine
//!
//! Drives one target through its lifecycle:
//!
//! ```text
//! PENDING -> WAITING_START -> MERIDIAN_CHECK -> IMAGING -> COMPLETED
//!                                  ^    |                    (or COMPLETED_PARTIAL
//!                                  |    v                     at the global cutoff)
//!                              PAUSED_MERIDIAN
//! ```
//!
//! `FAILED` and `SKIPPED` are reachable from every non-terminal state.
//! Cancellation resolves to `SKIPPED` while the target is still waiting and
//! to `FAILED` once a plan has been submitted; it is never reported as
//! success. Each transition is timestamped and handed to the event sink in
//! the order it occurred.

use crate::context::{RunContext, WaitOutcome};
use crate::controller::{PlanPoll, SharedControllerOps};
use crate::error::ControllerError;
use crate::meridian;
use crate::report::{StatusEvent, TargetRecord, Transition};
use crate::target::{Target, TargetStatus};
use chrono::Duration as ChronoDuration;
use std::sync::Arc;

/// Hard cap on how long the meridian gate may hold a target, so a wrong
/// prediction can never wedge the run.
const MERIDIAN_GATE_CAP_HOURS: i64 = 24;

pub type EventSink = Arc<dyn Fn(StatusEvent) + Send + Sync>;

pub struct ObservationExecutor {
    ctx: Arc<RunContext>,
    controller: SharedControllerOps,
    events: EventSink,
}

/// Where the state machine should go after a wait resolved.
enum AfterWait {
    Proceed,
    Terminal(TargetStatus, String),
}

impl ObservationExecutor {
    pub fn new(ctx: Arc<RunContext>, controller: SharedControllerOps, events: EventSink) -> Self {
        Self { ctx, controller, events }
    }

    /// Run one target to a terminal state and return its record.
    pub async fn execute(&self, target: &mut Target) -> TargetRecord {
        let mut record = TargetRecord {
            name: target.name.clone(),
            terminal_state: target.status,
            reason: None,
            transitions: Vec::new(),
        };

        // PENDING -> WAITING_START happens unconditionally on activation;
        // the cutoff check below may immediately skip out of it.
        self.transition(target, &mut record, TargetStatus::WaitingStart, None);

        if let Some(stop) = self.ctx.config.stop_time {
            if target.start_time >= stop {
                let reason = format!(
                    "start time {} is at or past the global cutoff {}",
                    target.start_time.format("%H:%M:%S"),
                    stop.format("%H:%M:%S"),
                );
                self.finish(target, &mut record, TargetStatus::Skipped, reason);
                return record;
            }
        }

        match self.wait_while_pending(target).await {
            AfterWait::Proceed => {}
            AfterWait::Terminal(state, reason) => {
                self.finish(target, &mut record, state, reason);
                return record;
            }
        }

        if target.enable_meridian_wait {
            match self.meridian_gate(target, &mut record).await {
                AfterWait::Proceed => {}
                AfterWait::Terminal(state, reason) => {
                    self.finish(target, &mut record, state, reason);
                    return record;
                }
            }
        } else {
            tracing::debug!(target_name = %target.name, "meridian wait disabled, going straight to imaging");
        }

        let (state, reason) = self.run_imaging(target, &mut record).await;
        match reason {
            Some(reason) => self.finish(target, &mut record, state, reason),
            None => {
                self.transition(target, &mut record, state, None);
                record.terminal_state = state;
            }
        }
        record
    }

    /// WAITING_START: interruptible wait until the target's start time.
    async fn wait_while_pending(&self, target: &Target) -> AfterWait {
        if self.ctx.now() < target.start_time {
            tracing::info!(
                target_name = %target.name,
                start = %target.start_time,
                "waiting for target start time"
            );
        }
        match self.ctx.wait_until(target.start_time).await {
            WaitOutcome::Elapsed => AfterWait::Proceed,
            WaitOutcome::Cancelled => AfterWait::Terminal(
                TargetStatus::Skipped,
                "operator cancellation while waiting for start time".into(),
            ),
            WaitOutcome::CutoffReached => AfterWait::Terminal(
                TargetStatus::Skipped,
                "global cutoff reached while waiting for start time".into(),
            ),
        }
    }

    /// MERIDIAN_CHECK / PAUSED_MERIDIAN loop. A long pause can land inside
    /// the *next* transit window, so the check repeats until no pause is
    /// required, bounded by [`MERIDIAN_GATE_CAP_HOURS`].
    async fn meridian_gate(&self, target: &mut Target, record: &mut TargetRecord) -> AfterWait {
        let entered_gate = self.ctx.now();

        loop {
            self.transition(target, record, TargetStatus::MeridianCheck, None);
            let now = self.ctx.now();

            if now - entered_gate > ChronoDuration::hours(MERIDIAN_GATE_CAP_HOURS) {
                return AfterWait::Terminal(
                    TargetStatus::Failed,
                    "meridian gate exceeded its one-day sanity cap".into(),
                );
            }

            let window = match meridian::window_for_target(
                target,
                &self.ctx.config.site,
                &self.ctx.config.meridian,
                now,
            ) {
                Ok(window) => window,
                Err(err) => {
                    return AfterWait::Terminal(
                        TargetStatus::Failed,
                        format!("meridian prediction failed: {err}"),
                    );
                }
            };

            if !window.contains(now) {
                tracing::debug!(
                    target_name = %target.name,
                    transit = %window.transit_time,
                    "outside meridian window, clear to image"
                );
                return AfterWait::Proceed;
            }

            // Resuming at or past the cutoff would start imaging that the
            // stop time forbids, so skip instead of pausing pointlessly.
            if self.ctx.past_cutoff(window.resume_at) {
                return AfterWait::Terminal(
                    TargetStatus::Skipped,
                    format!(
                        "meridian pause would resume at {} which is past the global cutoff",
                        window.resume_at.format("%H:%M:%S"),
                    ),
                );
            }

            let detail = format!(
                "transit {} , resuming {}",
                window.transit_time.format("%H:%M:%S"),
                window.resume_at.format("%H:%M:%S"),
            );
            self.transition(target, record, TargetStatus::PausedMeridian, Some(detail));
            tracing::info!(
                target_name = %target.name,
                transit = %window.transit_time,
                resume = %window.resume_at,
                "pausing for meridian flip"
            );

            match self.ctx.wait_until(window.resume_at).await {
                WaitOutcome::Elapsed => continue,
                WaitOutcome::Cancelled => {
                    return AfterWait::Terminal(
                        TargetStatus::Skipped,
                        "operator cancellation during meridian pause".into(),
                    );
                }
                WaitOutcome::CutoffReached => {
                    return AfterWait::Terminal(
                        TargetStatus::Skipped,
                        "global cutoff reached during meridian pause".into(),
                    );
                }
            }
        }
    }

    /// IMAGING: submit with bounded retries, then poll until the plan
    /// finishes, faults, or the global cutoff forces early termination.
    async fn run_imaging(
        &self,
        target: &mut Target,
        record: &mut TargetRecord,
    ) -> (TargetStatus, Option<String>) {
        self.transition(target, record, TargetStatus::Imaging, None);

        let plan = target.exposure_plan();
        let handle = match self.submit_with_retries(target).await {
            Ok(handle) => handle,
            Err(Submission::Failed(reason)) => return (TargetStatus::Failed, Some(reason)),
            Err(Submission::Cancelled) => {
                return (
                    TargetStatus::Failed,
                    Some("operator cancellation during plan submission".into()),
                );
            }
        };
        tracing::info!(
            target_name = %target.name,
            handle = %handle.0,
            exposure_secs = plan.total_exposure_secs(),
            "imaging plan submitted"
        );

        let mut consecutive_poll_errors = 0u32;
        loop {
            if self.ctx.is_cancelled() {
                self.abort_quietly(&handle).await;
                return (
                    TargetStatus::Failed,
                    Some("operator cancellation during imaging".into()),
                );
            }
            if self.ctx.past_cutoff(self.ctx.now()) {
                self.abort_quietly(&handle).await;
                return (
                    TargetStatus::CompletedPartial,
                    Some("global stop time reached during imaging".into()),
                );
            }

            match self.controller.poll(&handle).await {
                Ok(PlanPoll::Completed) => return (TargetStatus::Completed, None),
                Ok(PlanPoll::Running) => {
                    consecutive_poll_errors = 0;
                }
                Ok(PlanPoll::Faulted(reason)) => {
                    return (TargetStatus::Failed, Some(format!("device fault: {reason}")));
                }
                Ok(PlanPoll::Offline) => {
                    return (
                        TargetStatus::Failed,
                        Some("observatory went offline during imaging".into()),
                    );
                }
                Err(err) => {
                    consecutive_poll_errors += 1;
                    tracing::warn!(
                        target_name = %target.name,
                        error = %err,
                        attempt = consecutive_poll_errors,
                        "status poll failed"
                    );
                    if !err.is_retryable()
                        || consecutive_poll_errors > self.ctx.config.retry.max_retries
                    {
                        self.abort_quietly(&handle).await;
                        return (
                            TargetStatus::Failed,
                            Some(format!("status polling gave up: {err}")),
                        );
                    }
                }
            }

            match self.ctx.wait_for(self.ctx.config.poll_interval).await {
                WaitOutcome::Elapsed => {}
                WaitOutcome::Cancelled => {
                    self.abort_quietly(&handle).await;
                    return (
                        TargetStatus::Failed,
                        Some("operator cancellation during imaging".into()),
                    );
                }
                WaitOutcome::CutoffReached => {
                    self.abort_quietly(&handle).await;
                    return (
                        TargetStatus::CompletedPartial,
                        Some("global stop time reached during imaging".into()),
                    );
                }
            }
        }
    }

    async fn submit_with_retries(
        &self,
        target: &Target,
    ) -> Result<crate::controller::PlanHandle, Submission> {
        let plan = target.exposure_plan();
        let max_retries = self.ctx.config.retry.max_retries;
        let mut last_error: Option<ControllerError> = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let delay = self.ctx.config.retry.delay_for(attempt);
                tracing::info!(
                    target_name = %target.name,
                    attempt,
                    max_retries,
                    ?delay,
                    "retrying plan submission"
                );
                if self.ctx.wait_for(delay).await != WaitOutcome::Elapsed {
                    return Err(Submission::Cancelled);
                }
            }
            if self.ctx.is_cancelled() {
                return Err(Submission::Cancelled);
            }

            match self.controller.submit_plan(&plan).await {
                Ok(handle) => return Ok(handle),
                Err(err) if err.is_retryable() => {
                    tracing::warn!(
                        target_name = %target.name,
                        error = %err,
                        attempt = attempt + 1,
                        "plan submission failed"
                    );
                    last_error = Some(err);
                }
                Err(err) => {
                    return Err(Submission::Failed(format!("plan submission failed: {err}")));
                }
            }
        }

        let last = last_error.map(|e| e.to_string()).unwrap_or_else(|| "unknown error".into());
        Err(Submission::Failed(format!(
            "plan submission failed after {} attempts: {last}",
            max_retries + 1,
        )))
    }

    async fn abort_quietly(&self, handle: &crate::controller::PlanHandle) {
        if let Err(err) = self.controller.abort(handle).await {
            tracing::warn!(handle = %handle.0, error = %err, "plan abort failed");
        }
    }

    fn transition(
        &self,
        target: &mut Target,
        record: &mut TargetRecord,
        new_state: TargetStatus,
        detail: Option<String>,
    ) {
        let old_state = target.status;
        let at = self.ctx.now();
        target.status = new_state;
        record.transitions.push(Transition { state: new_state, at, detail: detail.clone() });
        tracing::debug!(
            target_name = %target.name,
            from = %old_state,
            to = %new_state,
            "state transition"
        );
        (self.events)(StatusEvent {
            target_name: target.name.clone(),
            old_state,
            new_state,
            at,
            detail,
        });
    }

    fn finish(
        &self,
        target: &mut Target,
        record: &mut TargetRecord,
        state: TargetStatus,
        reason: String,
    ) {
        tracing::info!(target_name = %target.name, terminal = %state, %reason, "target finished");
        self.transition(target, record, state, Some(reason.clone()));
        record.terminal_state = state;
        record.reason = Some(reason);
    }
}

enum Submission {
    Failed(String),
    Cancelled,
}
