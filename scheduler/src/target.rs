//! Target and exposure-plan data model

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Multiplier applied to raw exposure time when estimating wall-clock
/// duration: slews, filter changes, downloads and autofocus overhead.
pub const OVERHEAD_FACTOR: f64 = 1.2;

/// One filter's slice of an exposure plan. Immutable once the plan is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterExposure {
    /// Filter identifier as configured on the controller ("L", "Ha", ...).
    pub filter: String,
    /// Seconds per frame, > 0.
    pub exposure_secs: f64,
    /// Frames to take, > 0.
    pub count: u32,
    /// Binning factor, >= 1.
    #[serde(default = "default_binning")]
    pub binning: u32,
}

fn default_binning() -> u32 {
    1
}

impl FilterExposure {
    pub fn total_secs(&self) -> f64 {
        self.exposure_secs * f64::from(self.count)
    }
}

/// Lifecycle states of a target.
///
/// Transitions are monotonic except for the designed
/// `PausedMeridian -> MeridianCheck` cycle around a transit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetStatus {
    Pending,
    WaitingStart,
    MeridianCheck,
    PausedMeridian,
    Imaging,
    Completed,
    /// Imaging was cut short by the global stop time. Distinct from a full
    /// completion so reports never overstate what was captured.
    CompletedPartial,
    Failed,
    Skipped,
}

impl TargetStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TargetStatus::Completed
                | TargetStatus::CompletedPartial
                | TargetStatus::Failed
                | TargetStatus::Skipped
        )
    }
}

impl std::fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            TargetStatus::Pending => "PENDING",
            TargetStatus::WaitingStart => "WAITING_START",
            TargetStatus::MeridianCheck => "MERIDIAN_CHECK",
            TargetStatus::PausedMeridian => "PAUSED_MERIDIAN",
            TargetStatus::Imaging => "IMAGING",
            TargetStatus::Completed => "COMPLETED",
            TargetStatus::CompletedPartial => "COMPLETED_PARTIAL",
            TargetStatus::Failed => "FAILED",
            TargetStatus::Skipped => "SKIPPED",
        };
        f.write_str(text)
    }
}

/// One imaging target. Created at plan-build time, owned by the
/// orchestrator, mutated only by the executor handling it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    /// Right ascension in hours, parsed from the configured string.
    pub ra_hours: f64,
    /// Declination in degrees, parsed from the configured string.
    pub dec_deg: f64,
    pub start_time: DateTime<Utc>,
    /// Smaller number wins when start times tie.
    pub priority: i32,
    pub filters: Vec<FilterExposure>,
    /// Pause imaging around the meridian transit. Defaults to true.
    #[serde(default = "default_meridian_wait")]
    pub enable_meridian_wait: bool,
    /// Manually pinned transit time (time-of-day) overriding the computed
    /// one, for mounts with a known flip point.
    #[serde(default)]
    pub meridian_override: Option<NaiveTime>,
    #[serde(default = "default_status")]
    pub status: TargetStatus,
}

fn default_meridian_wait() -> bool {
    true
}

fn default_status() -> TargetStatus {
    TargetStatus::Pending
}

impl Target {
    pub fn new(
        name: impl Into<String>,
        ra_hours: f64,
        dec_deg: f64,
        start_time: DateTime<Utc>,
        priority: i32,
        filters: Vec<FilterExposure>,
    ) -> Self {
        Self {
            name: name.into(),
            ra_hours,
            dec_deg,
            start_time,
            priority,
            filters,
            enable_meridian_wait: true,
            meridian_override: None,
            status: TargetStatus::Pending,
        }
    }

    /// Raw shutter-open time across the whole plan.
    pub fn total_exposure_secs(&self) -> f64 {
        self.filters.iter().map(FilterExposure::total_secs).sum()
    }

    pub fn total_frames(&self) -> u32 {
        self.filters.iter().map(|f| f.count).sum()
    }

    /// Estimated wall-clock duration including operational overhead.
    pub fn estimated_duration(&self) -> Duration {
        Duration::from_secs_f64(self.total_exposure_secs() * OVERHEAD_FACTOR)
    }

    /// The immutable submission payload for the controller.
    pub fn exposure_plan(&self) -> ExposurePlan {
        ExposurePlan {
            target_name: self.name.clone(),
            ra_hours: self.ra_hours,
            dec_deg: self.dec_deg,
            filters: self.filters.clone(),
        }
    }
}

/// What gets submitted to the remote controller for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposurePlan {
    pub target_name: String,
    pub ra_hours: f64,
    pub dec_deg: f64,
    pub filters: Vec<FilterExposure>,
}

impl ExposurePlan {
    pub fn total_exposure_secs(&self) -> f64 {
        self.filters.iter().map(FilterExposure::total_secs).sum()
    }

    pub fn estimated_duration(&self) -> Duration {
        Duration::from_secs_f64(self.total_exposure_secs() * OVERHEAD_FACTOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_target() -> Target {
        Target::new(
            "NGC 1499",
            4.05,
            36.42,
            Utc.with_ymd_and_hms(2025, 11, 3, 21, 0, 0).unwrap(),
            1,
            vec![
                FilterExposure {
                    filter: "Ha".into(),
                    exposure_secs: 300.0,
                    count: 12,
                    binning: 1,
                },
                FilterExposure {
                    filter: "OIII".into(),
                    exposure_secs: 300.0,
                    count: 8,
                    binning: 2,
                },
            ],
        )
    }

    #[test]
    fn exposure_totals() {
        let target = sample_target();
        assert_eq!(target.total_exposure_secs(), 6000.0);
        assert_eq!(target.total_frames(), 20);
        assert!((target.estimated_duration().as_secs_f64() - 7200.0).abs() < 1e-6);
    }

    #[test]
    fn terminal_states() {
        assert!(TargetStatus::Completed.is_terminal());
        assert!(TargetStatus::CompletedPartial.is_terminal());
        assert!(TargetStatus::Skipped.is_terminal());
        assert!(!TargetStatus::PausedMeridian.is_terminal());
        assert!(!TargetStatus::Pending.is_terminal());
    }

    #[test]
    fn binning_defaults_to_one() {
        let json = r#"{"filter":"L","exposure_secs":60.0,"count":10}"#;
        let exposure: FilterExposure = serde_json::from_str(json).unwrap();
        assert_eq!(exposure.binning, 1);
    }
}
