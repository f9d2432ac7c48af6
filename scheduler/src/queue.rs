//! Target validation and ordering
//!
//! Builds the immutable execution plan for a run: every target is validated
//! up front (all problems reported in one pass, not just the first) and the
//! survivors are ordered by start time, then priority, then declaration
//! order.
//!
//! Priority is "smaller number wins": priority 1 outranks priority 2. The
//! sort is stable, so targets identical in both keys keep the order they
//! were declared in.

use crate::config::ScheduleConfig;
use crate::error::{ValidationError, ValidationIssue};
use crate::target::Target;

/// Ordered, read-only sequence of validated targets.
#[derive(Debug, Clone)]
pub struct ObservationQueue {
    targets: Vec<Target>,
}

impl ObservationQueue {
    /// Validate and order `targets`. The input is not mutated; a fresh,
    /// sorted queue is returned.
    pub fn build(targets: &[Target], config: &ScheduleConfig) -> Result<Self, ValidationError> {
        let mut issues = Vec::new();
        for (index, target) in targets.iter().enumerate() {
            validate_target(index, target, config, &mut issues);
        }
        if !issues.is_empty() {
            return Err(ValidationError { issues });
        }

        let mut ordered = targets.to_vec();
        // Stable sort: declaration order breaks remaining ties.
        ordered.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then(a.priority.cmp(&b.priority))
        });

        Ok(Self { targets: ordered })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Target> {
        self.targets.iter()
    }

    /// Hand the targets over to the orchestrator, which owns them for the
    /// duration of the run.
    pub fn into_targets(self) -> Vec<Target> {
        self.targets
    }
}

fn validate_target(
    index: usize,
    target: &Target,
    config: &ScheduleConfig,
    issues: &mut Vec<ValidationIssue>,
) {
    let name = if target.name.trim().is_empty() {
        "<unnamed>".to_string()
    } else {
        target.name.clone()
    };
    let mut push = |problem: String| {
        issues.push(ValidationIssue { index, name: name.clone(), problem });
    };

    if target.name.trim().is_empty() {
        push("name must not be empty".into());
    }
    if !(0.0..24.0).contains(&target.ra_hours) {
        push(format!("right ascension {:.4}h outside [0, 24)", target.ra_hours));
    }
    if !(-90.0..=90.0).contains(&target.dec_deg) {
        push(format!("declination {:.4}° outside [-90, 90]", target.dec_deg));
    }
    if target.filters.is_empty() {
        push("exposure plan has no filters".into());
    }
    for (slot, filter) in target.filters.iter().enumerate() {
        if filter.filter.trim().is_empty() {
            push(format!("filter #{} has no identifier", slot + 1));
        }
        if !(filter.exposure_secs > 0.0) {
            push(format!(
                "filter #{} exposure must be > 0 (got {})",
                slot + 1,
                filter.exposure_secs
            ));
        }
        if filter.count == 0 {
            push(format!("filter #{} image count must be > 0", slot + 1));
        }
        if filter.binning == 0 {
            push(format!("filter #{} binning must be >= 1", slot + 1));
        }
    }

    // Upper culmination altitude at the site; a target that never rises
    // above the configured minimum cannot produce data.
    if config.site.min_altitude_deg > 0.0 {
        let peak = 90.0 - (config.site.latitude_deg - target.dec_deg).abs();
        if peak < config.site.min_altitude_deg {
            push(format!(
                "never rises above {:.1}° at this site (minimum {:.1}°)",
                peak, config.site.min_altitude_deg
            ));
        }
    }
}
