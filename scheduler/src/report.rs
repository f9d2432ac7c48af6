//! Status events and run reporting

use crate::target::TargetStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Published to observers on every state transition, in the order the
/// transitions actually occurred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub target_name: String,
    pub old_state: TargetStatus,
    pub new_state: TargetStatus,
    pub at: DateTime<Utc>,
    pub detail: Option<String>,
}

/// One recorded transition in a target's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub state: TargetStatus,
    pub at: DateTime<Utc>,
    pub detail: Option<String>,
}

/// Full per-target outcome: terminal state, the reason when the target did
/// not fully complete, and the timestamped transition history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetRecord {
    pub name: String,
    pub terminal_state: TargetStatus,
    /// Human-readable reason; present for every non-`Completed` outcome.
    pub reason: Option<String>,
    pub transitions: Vec<Transition>,
}

impl TargetRecord {
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.transitions.first().map(|t| t.at)
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.transitions.last().map(|t| t.at)
    }
}

/// Aggregate outcome counts for a run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RunTotals {
    pub completed: usize,
    pub completed_partial: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Final report for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub dryrun: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub records: Vec<TargetRecord>,
    pub totals: RunTotals,
}

impl RunReport {
    pub fn tally(records: &[TargetRecord]) -> RunTotals {
        let mut totals = RunTotals::default();
        for record in records {
            match record.terminal_state {
                TargetStatus::Completed => totals.completed += 1,
                TargetStatus::CompletedPartial => totals.completed_partial += 1,
                TargetStatus::Failed => totals.failed += 1,
                TargetStatus::Skipped => totals.skipped += 1,
                // Non-terminal states never appear in a finished report.
                _ => {}
            }
        }
        totals
    }

    /// True when every target either completed or was legitimately cut
    /// short by the global stop time.
    pub fn is_clean(&self) -> bool {
        self.totals.failed == 0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Per-target slice of the pre-run summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSummary {
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub frames: u32,
    pub exposure_secs: f64,
    #[serde(with = "approx_secs")]
    pub estimated_duration: Duration,
}

/// Aggregate statistics computed from the plan without executing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSummary {
    pub targets: Vec<TargetSummary>,
    pub total_exposure_secs: f64,
    /// Slew/filter/download overhead implied by the duration estimate.
    pub total_overhead_secs: f64,
    #[serde(with = "approx_secs")]
    pub total_duration: Duration,
}

/// Timeline preview produced by validate-only mode: what would run when,
/// and where each target's meridian pause falls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelinePreview {
    pub entries: Vec<TimelineEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub estimated_end: DateTime<Utc>,
    /// None when prediction failed; the reason then lives in `note`.
    pub transit_time: Option<DateTime<Utc>>,
    pub pause_start: Option<DateTime<Utc>>,
    pub resume_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

mod approx_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn tally_counts_terminal_states() {
        let at = Utc.with_ymd_and_hms(2025, 11, 3, 21, 0, 0).unwrap();
        let record = |state: TargetStatus| TargetRecord {
            name: "t".into(),
            terminal_state: state,
            reason: None,
            transitions: vec![Transition { state, at, detail: None }],
        };
        let records = vec![
            record(TargetStatus::Completed),
            record(TargetStatus::Completed),
            record(TargetStatus::CompletedPartial),
            record(TargetStatus::Failed),
            record(TargetStatus::Skipped),
        ];
        let totals = RunReport::tally(&records);
        assert_eq!(totals.completed, 2);
        assert_eq!(totals.completed_partial, 1);
        assert_eq!(totals.failed, 1);
        assert_eq!(totals.skipped, 1);
    }

    #[test]
    fn report_serializes_to_json() {
        let at = Utc.with_ymd_and_hms(2025, 11, 3, 21, 0, 0).unwrap();
        let report = RunReport {
            run_id: Uuid::new_v4(),
            dryrun: true,
            started_at: at,
            finished_at: at,
            records: vec![],
            totals: RunTotals::default(),
        };
        let json = report.to_json().unwrap();
        assert!(json.contains("run_id"));
        assert!(report.is_clean());
    }
}
