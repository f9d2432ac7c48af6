//! Run-wide configuration records
//!
//! Everything here is immutable for the duration of a run. The structures
//! are deserialized once by the configuration loader and threaded through
//! [`crate::context::RunContext`]; no component reads ambient state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Observer location used for sidereal-time and transit computations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ObserverSite {
    /// Degrees, north positive. Valid range [-90, 90].
    pub latitude_deg: f64,
    /// Degrees, east positive. Valid range [-180, 180].
    pub longitude_deg: f64,
    /// Targets that can never rise above this altitude at the site are
    /// rejected during validation. Zero disables the check.
    pub min_altitude_deg: f64,
}

impl Default for ObserverSite {
    fn default() -> Self {
        Self { latitude_deg: 0.0, longitude_deg: 0.0, min_altitude_deg: 0.0 }
    }
}

/// Parameters of the protection window around a meridian transit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MeridianFlipConfig {
    /// Minutes before transit at which imaging must stop.
    pub stop_minutes_before: u32,
    /// Minutes after transit before imaging may resume.
    pub resume_minutes_after: u32,
    /// Extra margin applied to both sides of the window.
    pub safety_margin_minutes: u32,
}

impl Default for MeridianFlipConfig {
    fn default() -> Self {
        Self {
            stop_minutes_before: 10,
            resume_minutes_after: 10,
            safety_margin_minutes: 2,
        }
    }
}

/// Bounded exponential backoff for controller calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 3, base_delay_secs: 1, max_delay_secs: 30 }
    }
}

impl RetryConfig {
    /// Delay before retry `attempt` (1-based): base * 2^(attempt-1), capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = Duration::from_secs(self.base_delay_secs);
        let max = Duration::from_secs(self.max_delay_secs);
        base.checked_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            .unwrap_or(max)
            .min(max)
    }
}

/// Immutable configuration for one scheduling run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Global cutoff. Nothing may start or continue imaging at or past
    /// this instant.
    pub stop_time: Option<DateTime<Utc>>,
    pub site: ObserverSite,
    pub meridian: MeridianFlipConfig,
    /// Simulate the whole timeline without touching the controller.
    pub dryrun: bool,
    /// Cadence of status polls and the upper bound on cancellation latency.
    #[serde(with = "secs")]
    pub poll_interval: Duration,
    pub retry: RetryConfig,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            stop_time: None,
            site: ObserverSite::default(),
            meridian: MeridianFlipConfig::default(),
            dryrun: false,
            poll_interval: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}

/// Serialize a `Duration` as whole seconds.
mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
