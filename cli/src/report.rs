//! Plain-text rendering of summaries, timelines and run reports

use chrono::{DateTime, Utc};
use nightwatch_scheduler::{RunReport, ScheduleSummary, TimelinePreview};

fn hm(at: DateTime<Utc>) -> String {
    at.format("%m-%d %H:%M").to_string()
}

fn hours(secs: f64) -> String {
    format!("{:.1}h", secs / 3600.0)
}

/// Pre-run summary: what the plan adds up to without executing anything.
pub fn render_summary(summary: &ScheduleSummary) -> String {
    let mut out = String::new();
    out.push_str("schedule summary\n");
    out.push_str("================\n");
    for target in &summary.targets {
        out.push_str(&format!(
            "  {:<20} start {}  {:>4} frames  {:>7} exposure  (~{} on sky)\n",
            target.name,
            hm(target.start_time),
            target.frames,
            hours(target.exposure_secs),
            hours(target.estimated_duration.as_secs_f64()),
        ));
    }
    out.push_str(&format!(
        "total: {} target(s), {} exposure + {} overhead = {}\n",
        summary.targets.len(),
        hours(summary.total_exposure_secs),
        hours(summary.total_overhead_secs),
        hours(summary.total_duration.as_secs_f64()),
    ));
    out
}

/// Validate-only timeline: queue order with each target's meridian window.
pub fn render_timeline(preview: &TimelinePreview) -> String {
    let mut out = String::new();
    out.push_str("planned timeline\n");
    out.push_str("================\n");
    for entry in &preview.entries {
        out.push_str(&format!(
            "  {:<20} {} -> {}",
            entry.name,
            hm(entry.start_time),
            hm(entry.estimated_end),
        ));
        match (entry.transit_time, entry.pause_start, entry.resume_at) {
            (Some(transit), Some(pause), Some(resume)) => {
                out.push_str(&format!(
                    "  transit {} (pause {} -> {})",
                    transit.format("%H:%M"),
                    pause.format("%H:%M"),
                    resume.format("%H:%M"),
                ));
            }
            _ => {}
        }
        if let Some(note) = &entry.note {
            out.push_str(&format!("  [{note}]"));
        }
        out.push('\n');
    }
    out
}

/// Final report: terminal state and reason per target, plus totals.
pub fn render_report(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "run {} {}\n",
        report.run_id,
        if report.dryrun { "(dry run)" } else { "" }
    ));
    out.push_str("==========================================\n");
    for record in &report.records {
        let span = match (record.started_at(), record.ended_at()) {
            (Some(start), Some(end)) => format!("{} -> {}", hm(start), hm(end)),
            _ => String::from("-"),
        };
        out.push_str(&format!(
            "  {:<20} {:<18} {}\n",
            record.name,
            record.terminal_state.to_string(),
            span,
        ));
        if let Some(reason) = &record.reason {
            out.push_str(&format!("  {:<20} reason: {reason}\n", ""));
        }
    }
    out.push_str(&format!(
        "completed {}  partial {}  failed {}  skipped {}\n",
        report.totals.completed,
        report.totals.completed_partial,
        report.totals.failed,
        report.totals.skipped,
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use nightwatch_scheduler::report::{RunTotals, TargetRecord, Transition};
    use nightwatch_scheduler::TargetStatus;
    use uuid::Uuid;

    #[test]
    fn report_lists_reasons_for_unfinished_targets() {
        let at = Utc.with_ymd_and_hms(2025, 11, 3, 21, 0, 0).unwrap();
        let report = RunReport {
            run_id: Uuid::new_v4(),
            dryrun: true,
            started_at: at,
            finished_at: at,
            records: vec![
                TargetRecord {
                    name: "done".into(),
                    terminal_state: TargetStatus::Completed,
                    reason: None,
                    transitions: vec![Transition {
                        state: TargetStatus::Completed,
                        at,
                        detail: None,
                    }],
                },
                TargetRecord {
                    name: "late".into(),
                    terminal_state: TargetStatus::Skipped,
                    reason: Some("past global cutoff".into()),
                    transitions: vec![Transition {
                        state: TargetStatus::Skipped,
                        at,
                        detail: None,
                    }],
                },
            ],
            totals: RunTotals { completed: 1, completed_partial: 0, failed: 0, skipped: 1 },
        };
        let text = render_report(&report);
        assert!(text.contains("COMPLETED"));
        assert!(text.contains("SKIPPED"));
        assert!(text.contains("reason: past global cutoff"));
        assert!(text.contains("completed 1"));
    }
}
