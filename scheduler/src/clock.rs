//! Wall-clock abstraction
//!
//! Every component that needs "now" or a timed suspension goes through
//! [`Clock`], so a dry run can fast-forward an entire night of waits while
//! exercising exactly the same timing arithmetic as a live run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Suspend for `duration`. A simulated clock advances instead of
    /// sleeping.
    async fn sleep(&self, duration: Duration);
}

pub type SharedClock = Arc<dyn Clock>;

/// The real wall clock, backed by tokio timers.
#[derive(Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Simulated time for dry runs and tests. `sleep` advances the shared
/// instant and yields once so concurrent tasks interleave.
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl SimulatedClock {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self { now: Arc::new(Mutex::new(start)) }
    }

    /// Jump directly to `instant`. Moving backwards is ignored so the
    /// simulated timeline stays monotonic.
    pub fn advance_to(&self, instant: DateTime<Utc>) {
        let mut now = self.now.lock().expect("simulated clock poisoned");
        if instant > *now {
            *now = instant;
        }
    }
}

#[async_trait]
impl Clock for SimulatedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("simulated clock poisoned")
    }

    async fn sleep(&self, duration: Duration) {
        {
            let mut now = self.now.lock().expect("simulated clock poisoned");
            *now += chrono::Duration::from_std(duration)
                .unwrap_or_else(|_| chrono::Duration::seconds(0));
        }
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn simulated_sleep_advances_instead_of_waiting() {
        let start = Utc.with_ymd_and_hms(2025, 11, 3, 20, 0, 0).unwrap();
        let clock = SimulatedClock::starting_at(start);
        let wall = std::time::Instant::now();

        clock.sleep(Duration::from_secs(8 * 3600)).await;

        assert_eq!(clock.now(), start + chrono::Duration::hours(8));
        assert!(wall.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn advance_to_is_monotonic() {
        let start = Utc.with_ymd_and_hms(2025, 11, 3, 20, 0, 0).unwrap();
        let clock = SimulatedClock::starting_at(start);
        clock.advance_to(start + chrono::Duration::minutes(5));
        clock.advance_to(start); // no-op
        assert_eq!(clock.now(), start + chrono::Duration::minutes(5));
    }
}
