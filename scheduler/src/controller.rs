//! Controller operations seam
//!
//! The executor never talks to the observatory directly; it goes through
//! [`ControllerOps`]. The real implementation wraps the HTTP client in the
//! binary crate, and [`SimulatedController`] stands in for dry runs and
//! tests, where submission always succeeds and a plan "completes" once the
//! run's clock passes its estimated end.

use crate::clock::SharedClock;
use crate::error::ControllerError;
use crate::target::ExposurePlan;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// Opaque handle to a submitted plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanHandle(pub String);

/// Result of polling a submitted plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanPoll {
    Running,
    Completed,
    /// The controller reports a device fault; the reason is surfaced on the
    /// target's terminal state.
    Faulted(String),
    /// The observatory reports itself offline.
    Offline,
}

/// Async interface to the remote imaging controller.
#[async_trait]
pub trait ControllerOps: Send + Sync {
    async fn connect(&self) -> Result<(), ControllerError>;

    async fn submit_plan(&self, plan: &ExposurePlan) -> Result<PlanHandle, ControllerError>;

    async fn poll(&self, handle: &PlanHandle) -> Result<PlanPoll, ControllerError>;

    async fn abort(&self, handle: &PlanHandle) -> Result<(), ControllerError>;
}

pub type SharedControllerOps = Arc<dyn ControllerOps>;

struct ActivePlan {
    handle: PlanHandle,
    ends_at: DateTime<Utc>,
}

/// Dry-run controller: no network traffic, same call surface and timing
/// arithmetic. Plans complete when the (usually simulated) clock reaches
/// their estimated end.
pub struct SimulatedController {
    clock: SharedClock,
    active: Mutex<Option<ActivePlan>>,
    submissions: Mutex<u32>,
}

impl SimulatedController {
    pub fn new(clock: SharedClock) -> Self {
        Self { clock, active: Mutex::new(None), submissions: Mutex::new(0) }
    }

    /// Plans submitted so far; dry-run reports use this to show what a live
    /// run would have sent.
    pub fn submission_count(&self) -> u32 {
        *self.submissions.lock().expect("simulated controller poisoned")
    }
}

#[async_trait]
impl ControllerOps for SimulatedController {
    async fn connect(&self) -> Result<(), ControllerError> {
        tracing::info!("[dryrun] controller connection simulated");
        Ok(())
    }

    async fn submit_plan(&self, plan: &ExposurePlan) -> Result<PlanHandle, ControllerError> {
        let ends_at = self.clock.now()
            + chrono::Duration::from_std(plan.estimated_duration())
                .unwrap_or_else(|_| chrono::Duration::seconds(0));
        let handle = PlanHandle(format!("dryrun-{}", plan.target_name));
        tracing::info!(
            target_name = %plan.target_name,
            %ends_at,
            "[dryrun] plan submission simulated"
        );

        let mut active = self.active.lock().expect("simulated controller poisoned");
        *active = Some(ActivePlan { handle: handle.clone(), ends_at });
        *self.submissions.lock().expect("simulated controller poisoned") += 1;
        Ok(handle)
    }

    async fn poll(&self, handle: &PlanHandle) -> Result<PlanPoll, ControllerError> {
        let active = self.active.lock().expect("simulated controller poisoned");
        match active.as_ref() {
            Some(plan) if plan.handle == *handle => {
                if self.clock.now() >= plan.ends_at {
                    Ok(PlanPoll::Completed)
                } else {
                    Ok(PlanPoll::Running)
                }
            }
            // Aborted or superseded plans read as complete.
            _ => Ok(PlanPoll::Completed),
        }
    }

    async fn abort(&self, handle: &PlanHandle) -> Result<(), ControllerError> {
        tracing::info!(handle = %handle.0, "[dryrun] plan abort simulated");
        let mut active = self.active.lock().expect("simulated controller poisoned");
        if active.as_ref().is_some_and(|p| p.handle == *handle) {
            *active = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;
    use crate::target::FilterExposure;
    use chrono::TimeZone;

    fn plan() -> ExposurePlan {
        ExposurePlan {
            target_name: "M31".into(),
            ra_hours: 0.71,
            dec_deg: 41.27,
            filters: vec![FilterExposure {
                filter: "L".into(),
                exposure_secs: 100.0,
                count: 10,
                binning: 1,
            }],
        }
    }

    #[tokio::test]
    async fn simulated_plan_completes_at_estimated_end() {
        let start = Utc.with_ymd_and_hms(2025, 11, 3, 21, 0, 0).unwrap();
        let clock = SimulatedClock::starting_at(start);
        let controller = SimulatedController::new(Arc::new(clock.clone()));

        let handle = controller.submit_plan(&plan()).await.unwrap();
        assert_eq!(controller.poll(&handle).await.unwrap(), PlanPoll::Running);

        // 1000 s of exposure * 1.2 overhead = 1200 s.
        clock.advance_to(start + chrono::Duration::seconds(1199));
        assert_eq!(controller.poll(&handle).await.unwrap(), PlanPoll::Running);
        clock.advance_to(start + chrono::Duration::seconds(1200));
        assert_eq!(controller.poll(&handle).await.unwrap(), PlanPoll::Completed);
        assert_eq!(controller.submission_count(), 1);
    }

    #[tokio::test]
    async fn aborted_plan_reads_complete() {
        let start = Utc.with_ymd_and_hms(2025, 11, 3, 21, 0, 0).unwrap();
        let clock = SimulatedClock::starting_at(start);
        let controller = SimulatedController::new(Arc::new(clock));

        let handle = controller.submit_plan(&plan()).await.unwrap();
        controller.abort(&handle).await.unwrap();
        assert_eq!(controller.poll(&handle).await.unwrap(), PlanPoll::Completed);
    }
}
