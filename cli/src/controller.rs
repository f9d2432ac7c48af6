//! Scheduler-to-ACP adapter
//!
//! Implements the scheduler's controller seam on top of the ACP HTTP
//! client: exposure plans become acquisition forms, the status endpoint
//! backs polling, and ACP's error classification is preserved so the
//! executor's retry policy sees the same transient/fatal split the wire
//! reported.

use async_trait::async_trait;
use nightwatch_acp::{AcpClient, AcpError, AcpImagingPlan, FilterSlot};
use nightwatch_scheduler::controller::{ControllerOps, PlanHandle, PlanPoll};
use nightwatch_scheduler::error::ControllerError;
use nightwatch_scheduler::{coords, ExposurePlan};

/// Submission settings shared by every plan in the run.
#[derive(Debug, Clone)]
pub struct PlanDefaults {
    pub dither: u32,
    pub auto_focus: bool,
    pub af_interval: u32,
}

pub struct AcpController {
    client: AcpClient,
    /// Filter wheel contents in slot order; plan filter names resolve to
    /// their index here.
    wheel: Vec<String>,
    defaults: PlanDefaults,
}

impl AcpController {
    pub fn new(client: AcpClient, wheel: Vec<String>, defaults: PlanDefaults) -> Self {
        Self { client, wheel, defaults }
    }

    fn filter_slot(&self, name: &str) -> Result<u32, ControllerError> {
        self.wheel
            .iter()
            .position(|configured| configured.eq_ignore_ascii_case(name))
            .map(|slot| slot as u32)
            .ok_or_else(|| {
                ControllerError::fatal(format!(
                    "filter {name:?} is not in the configured wheel {:?}",
                    self.wheel
                ))
            })
    }

    fn to_acp_plan(&self, plan: &ExposurePlan) -> Result<AcpImagingPlan, ControllerError> {
        let filters = plan
            .filters
            .iter()
            .map(|f| {
                Ok(FilterSlot {
                    filter_id: self.filter_slot(&f.filter)?,
                    count: f.count,
                    exposure_secs: f.exposure_secs.round() as u32,
                    binning: f.binning,
                })
            })
            .collect::<Result<Vec<_>, ControllerError>>()?;

        Ok(AcpImagingPlan {
            target: plan.target_name.clone(),
            ra: coords::format_ra(plan.ra_hours),
            dec: coords::format_dec(plan.dec_deg),
            filters,
            dither: self.defaults.dither,
            auto_focus: self.defaults.auto_focus,
            periodic_af_interval: self.defaults.af_interval,
        })
    }
}

fn map_err(err: AcpError) -> ControllerError {
    match &err {
        AcpError::Offline(message) => ControllerError::offline(message.clone()),
        _ if err.is_retryable() => ControllerError::transient(err.to_string()),
        _ => ControllerError::fatal(err.to_string()),
    }
}

#[async_trait]
impl ControllerOps for AcpController {
    async fn connect(&self) -> Result<(), ControllerError> {
        self.client.connect().await.map_err(map_err)
    }

    async fn submit_plan(&self, plan: &ExposurePlan) -> Result<PlanHandle, ControllerError> {
        let acp_plan = self.to_acp_plan(plan)?;

        // A plan left over from an aborted run would make ACP refuse the
        // new one; clear it and let the server settle.
        if let Err(err) = self.client.stop_script().await {
            tracing::debug!(error = %err, "pre-submission stop returned an error, continuing");
        }

        self.client.submit_plan(&acp_plan).await.map_err(map_err)?;
        Ok(PlanHandle(plan.target_name.clone()))
    }

    async fn poll(&self, _handle: &PlanHandle) -> Result<PlanPoll, ControllerError> {
        let status = self.client.system_status().await.map_err(map_err)?;
        if status.is_offline() {
            return Ok(PlanPoll::Offline);
        }
        if status.is_running() {
            return Ok(PlanPoll::Running);
        }
        Ok(PlanPoll::Completed)
    }

    async fn abort(&self, handle: &PlanHandle) -> Result<(), ControllerError> {
        tracing::info!(target_name = %handle.0, "aborting running plan");
        self.client.stop_script().await.map_err(map_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nightwatch_acp::{Credentials, TimeoutConfig};
    use nightwatch_scheduler::FilterExposure;

    fn controller() -> AcpController {
        let client = AcpClient::new(
            "http://observatory.example",
            Credentials { username: "obs".into(), password: "x".into() },
            TimeoutConfig::default(),
        )
        .unwrap();
        AcpController::new(
            client,
            ["L", "R", "G", "B", "Ha"].map(String::from).to_vec(),
            PlanDefaults { dither: 5, auto_focus: true, af_interval: 120 },
        )
    }

    fn plan(filter: &str) -> ExposurePlan {
        ExposurePlan {
            target_name: "NGC 1499".into(),
            ra_hours: 4.018_753,
            dec_deg: 36.519_972,
            filters: vec![FilterExposure {
                filter: filter.into(),
                exposure_secs: 300.0,
                count: 12,
                binning: 1,
            }],
        }
    }

    #[test]
    fn plans_are_translated_to_acp_forms() {
        let controller = controller();
        let acp_plan = controller.to_acp_plan(&plan("Ha")).unwrap();
        assert_eq!(acp_plan.target, "NGC 1499");
        assert_eq!(acp_plan.filters[0].filter_id, 4);
        assert_eq!(acp_plan.filters[0].exposure_secs, 300);
        assert!(acp_plan.ra.starts_with("04:01:07"));
        assert!(acp_plan.dec.starts_with("+36:31:1"));
    }

    #[test]
    fn filter_lookup_is_case_insensitive_and_unknown_is_fatal() {
        let controller = controller();
        assert_eq!(controller.filter_slot("ha").unwrap(), 4);
        let err = controller.filter_slot("SII").unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn error_mapping_preserves_the_transient_fatal_split() {
        let offline = map_err(AcpError::Offline("the observatory is offline".into()));
        assert!(offline.is_retryable());
        let timeout = map_err(AcpError::Timeout { operation: "poll".into(), duration_ms: 5000 });
        assert!(timeout.is_retryable());
        let auth = map_err(AcpError::HttpError { status: 401, message: "unauthorized".into() });
        assert!(!auth.is_retryable());
    }
}
