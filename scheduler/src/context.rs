//! Per-run execution context
//!
//! One `RunContext` is built per run and passed explicitly to every
//! component: configuration, the time source, and the run-wide cancellation
//! flag. Nothing is held in ambient or global state.

use crate::clock::{SharedClock, SimulatedClock, SystemClock};
use crate::config::ScheduleConfig;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Outcome of an interruptible wait.
///
/// Deliberately not a boolean: "the wait returned" must never be read as
/// "the wait elapsed normally".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The deadline arrived.
    Elapsed,
    /// The operator cancelled the run.
    Cancelled,
    /// The global stop time arrived before the deadline.
    CutoffReached,
}

pub struct RunContext {
    pub config: Arc<ScheduleConfig>,
    pub clock: SharedClock,
    cancelled: AtomicBool,
    cancel_notify: Notify,
}

impl RunContext {
    pub fn new(config: ScheduleConfig, clock: SharedClock) -> Self {
        Self {
            config: Arc::new(config),
            clock,
            cancelled: AtomicBool::new(false),
            cancel_notify: Notify::new(),
        }
    }

    /// Build a context with the appropriate clock for the configured mode:
    /// simulated time (anchored at the current instant) for dry runs, the
    /// system clock otherwise.
    pub fn for_config(config: ScheduleConfig) -> Self {
        let clock: SharedClock = if config.dryrun {
            Arc::new(SimulatedClock::starting_at(Utc::now()))
        } else {
            Arc::new(SystemClock)
        };
        Self::new(config, clock)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Trip the run-wide cancellation flag and wake every pending wait.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.cancel_notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Whether the global stop time has passed at `instant`.
    pub fn past_cutoff(&self, instant: DateTime<Utc>) -> bool {
        self.config.stop_time.is_some_and(|stop| instant >= stop)
    }

    /// Wait until `deadline`, waking within one poll interval of
    /// cancellation and never sleeping past the global stop time.
    pub async fn wait_until(&self, deadline: DateTime<Utc>) -> WaitOutcome {
        loop {
            if self.is_cancelled() {
                return WaitOutcome::Cancelled;
            }
            let now = self.now();
            if now >= deadline {
                return WaitOutcome::Elapsed;
            }
            if self.past_cutoff(now) {
                return WaitOutcome::CutoffReached;
            }

            let remaining = (deadline - now)
                .to_std()
                .unwrap_or_else(|_| Duration::from_secs(0));
            let chunk = remaining.min(self.config.poll_interval);

            tokio::select! {
                _ = self.cancel_notify.notified() => return WaitOutcome::Cancelled,
                _ = self.clock.sleep(chunk) => {}
            }
        }
    }

    /// Wait for a fixed duration with the same cancellation contract.
    pub async fn wait_for(&self, duration: Duration) -> WaitOutcome {
        let deadline = self.now()
            + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::seconds(0));
        self.wait_until(deadline).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn simulated_context(stop_time: Option<DateTime<Utc>>) -> (Arc<RunContext>, SimulatedClock) {
        let start = Utc.with_ymd_and_hms(2025, 11, 3, 20, 0, 0).unwrap();
        let clock = SimulatedClock::starting_at(start);
        let config = ScheduleConfig {
            stop_time,
            dryrun: true,
            poll_interval: Duration::from_secs(30),
            ..ScheduleConfig::default()
        };
        (Arc::new(RunContext::new(config, Arc::new(clock.clone()))), clock)
    }

    #[tokio::test]
    async fn wait_elapses_at_deadline() {
        let (ctx, _clock) = simulated_context(None);
        let deadline = ctx.now() + chrono::Duration::hours(2);
        assert_eq!(ctx.wait_until(deadline).await, WaitOutcome::Elapsed);
        assert_eq!(ctx.now(), deadline);
    }

    #[tokio::test]
    async fn wait_stops_at_global_cutoff() {
        let start = Utc.with_ymd_and_hms(2025, 11, 3, 20, 0, 0).unwrap();
        let stop = start + chrono::Duration::hours(1);
        let (ctx, _clock) = simulated_context(Some(stop));

        let deadline = start + chrono::Duration::hours(3);
        assert_eq!(ctx.wait_until(deadline).await, WaitOutcome::CutoffReached);
        assert!(ctx.now() >= stop);
        assert!(ctx.now() < deadline);
    }

    #[tokio::test]
    async fn wait_already_cancelled_returns_immediately() {
        let (ctx, _clock) = simulated_context(None);
        ctx.cancel();
        let deadline = ctx.now() + chrono::Duration::hours(2);
        assert_eq!(ctx.wait_until(deadline).await, WaitOutcome::Cancelled);
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_real_wait_within_a_poll_tick() {
        let config = ScheduleConfig {
            poll_interval: Duration::from_millis(10),
            ..ScheduleConfig::default()
        };
        let ctx = Arc::new(RunContext::new(config, Arc::new(SystemClock)));
        let deadline = ctx.now() + chrono::Duration::seconds(30);

        let waiter = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.wait_until(deadline).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        let wall = std::time::Instant::now();
        ctx.cancel();

        let outcome = waiter.await.unwrap();
        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert!(wall.elapsed() < Duration::from_secs(1));
    }
}
