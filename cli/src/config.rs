//! Configuration document loading
//!
//! The plan for a night is one YAML document with the same sections the
//! observatory operators have always used: `acp_server`, `schedule`,
//! `observatory`, `meridian_flip`, `global_settings`, `retry_settings` and
//! the target list. It is read once at startup; times are naive
//! "YYYY-MM-DD HH:MM:SS" strings interpreted as UTC, and coordinates are
//! sexagesimal strings parsed here into angle values.

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use nightwatch_scheduler::error::{ValidationError, ValidationIssue};
use nightwatch_scheduler::{
    coords, FilterExposure, MeridianFlipConfig, ObserverSite, RetryConfig, ScheduleConfig, Target,
};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    pub acp_server: ServerSection,
    #[serde(default)]
    pub schedule: ScheduleSection,
    #[serde(default)]
    pub observatory: ObservatorySection,
    #[serde(default)]
    pub meridian_flip: MeridianSection,
    #[serde(default)]
    pub global_settings: GlobalSection,
    #[serde(default)]
    pub retry_settings: RetrySection,
    pub targets: Vec<TargetSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    pub url: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Filter wheel contents in slot order; filter names in target plans
    /// must name one of these.
    #[serde(default = "default_wheel")]
    pub filters: Vec<String>,
}

fn default_wheel() -> Vec<String> {
    ["L", "R", "G", "B", "Ha", "OIII", "SII"].map(String::from).to_vec()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleSection {
    /// Global cutoff, "YYYY-MM-DD HH:MM:SS" UTC.
    pub stop_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservatorySection {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default = "default_min_altitude")]
    pub min_altitude: f64,
}

impl Default for ObservatorySection {
    fn default() -> Self {
        Self { latitude: 0.0, longitude: 0.0, min_altitude: default_min_altitude() }
    }
}

fn default_min_altitude() -> f64 {
    30.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeridianSection {
    #[serde(default = "default_stop_before")]
    pub stop_minutes_before: u32,
    #[serde(default = "default_resume_after")]
    pub resume_minutes_after: u32,
    #[serde(default = "default_safety_margin")]
    pub safety_margin: u32,
}

impl Default for MeridianSection {
    fn default() -> Self {
        Self {
            stop_minutes_before: default_stop_before(),
            resume_minutes_after: default_resume_after(),
            safety_margin: default_safety_margin(),
        }
    }
}

fn default_stop_before() -> u32 {
    10
}

fn default_resume_after() -> u32 {
    10
}

fn default_safety_margin() -> u32 {
    2
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlobalSection {
    #[serde(default)]
    pub dryrun: bool,
    #[serde(default = "default_dither")]
    pub dither: u32,
    #[serde(default = "default_true")]
    pub auto_focus: bool,
    #[serde(default = "default_af_interval")]
    pub af_interval: u32,
    /// Seconds between status polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

impl Default for GlobalSection {
    fn default() -> Self {
        Self {
            dryrun: false,
            dither: default_dither(),
            auto_focus: true,
            af_interval: default_af_interval(),
            poll_interval: default_poll_interval(),
        }
    }
}

fn default_dither() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_af_interval() -> u32 {
    120
}

fn default_poll_interval() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            max_delay: default_max_delay(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1
}

fn default_max_delay() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetSection {
    pub name: String,
    pub ra: String,
    pub dec: String,
    /// "YYYY-MM-DD HH:MM:SS" UTC.
    pub start_time: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enable_meridian_wait: bool,
    /// Optional manual transit time, "HH:MM:SS".
    #[serde(default)]
    pub meridian_time: Option<String>,
    pub filters: Vec<FilterSection>,
}

fn default_priority() -> i32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterSection {
    pub name: String,
    /// Seconds per frame.
    pub exposure: f64,
    pub count: u32,
    #[serde(default = "default_binning")]
    pub binning: u32,
}

fn default_binning() -> u32 {
    1
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read configuration file {}", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("cannot parse configuration file {}", path.display()))
    }

    /// Convert the document into the scheduler's typed records, collecting
    /// every malformed field instead of stopping at the first.
    pub fn into_schedule(&self) -> Result<(ScheduleConfig, Vec<Target>), ValidationError> {
        let mut issues = Vec::new();

        let stop_time = match &self.schedule.stop_time {
            Some(text) => match parse_instant(text) {
                Ok(instant) => Some(instant),
                Err(problem) => {
                    issues.push(ValidationIssue {
                        index: 0,
                        name: "<schedule>".into(),
                        problem: format!("stop_time: {problem}"),
                    });
                    None
                }
            },
            None => None,
        };

        let config = ScheduleConfig {
            stop_time,
            site: ObserverSite {
                latitude_deg: self.observatory.latitude,
                longitude_deg: self.observatory.longitude,
                min_altitude_deg: self.observatory.min_altitude,
            },
            meridian: MeridianFlipConfig {
                stop_minutes_before: self.meridian_flip.stop_minutes_before,
                resume_minutes_after: self.meridian_flip.resume_minutes_after,
                safety_margin_minutes: self.meridian_flip.safety_margin,
            },
            dryrun: self.global_settings.dryrun,
            poll_interval: Duration::from_secs(self.global_settings.poll_interval.max(1)),
            retry: RetryConfig {
                max_retries: self.retry_settings.max_retries,
                base_delay_secs: self.retry_settings.retry_delay,
                max_delay_secs: self.retry_settings.max_delay,
            },
        };

        if !(-90.0..=90.0).contains(&config.site.latitude_deg) {
            issues.push(ValidationIssue {
                index: 0,
                name: "<observatory>".into(),
                problem: format!("latitude {} outside [-90, 90]", config.site.latitude_deg),
            });
        }
        if !(-180.0..=180.0).contains(&config.site.longitude_deg) {
            issues.push(ValidationIssue {
                index: 0,
                name: "<observatory>".into(),
                problem: format!("longitude {} outside [-180, 180]", config.site.longitude_deg),
            });
        }

        let mut targets = Vec::with_capacity(self.targets.len());
        for (index, section) in self.targets.iter().enumerate() {
            match section.to_target(index) {
                Ok(target) => targets.push(target),
                Err(mut target_issues) => issues.append(&mut target_issues),
            }
        }

        if issues.is_empty() {
            Ok((config, targets))
        } else {
            Err(ValidationError { issues })
        }
    }
}

impl TargetSection {
    fn to_target(&self, index: usize) -> Result<Target, Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        let name = if self.name.trim().is_empty() { "<unnamed>" } else { &self.name };
        let mut push = |problem: String| {
            issues.push(ValidationIssue { index, name: name.to_string(), problem });
        };

        let ra_hours = match coords::parse_ra(&self.ra) {
            Ok(value) => value,
            Err(problem) => {
                push(problem);
                0.0
            }
        };
        let dec_deg = match coords::parse_dec(&self.dec) {
            Ok(value) => value,
            Err(problem) => {
                push(problem);
                0.0
            }
        };
        let start_time = match parse_instant(&self.start_time) {
            Ok(value) => value,
            Err(problem) => {
                push(format!("start_time: {problem}"));
                Utc::now()
            }
        };
        let meridian_override = match &self.meridian_time {
            Some(text) => match NaiveTime::parse_from_str(text, "%H:%M:%S") {
                Ok(time) => Some(time),
                Err(_) => {
                    push(format!("meridian_time {text:?} is not HH:MM:SS"));
                    None
                }
            },
            None => None,
        };

        if !issues.is_empty() {
            return Err(issues);
        }

        let filters = self
            .filters
            .iter()
            .map(|f| FilterExposure {
                filter: f.name.clone(),
                exposure_secs: f.exposure,
                count: f.count,
                binning: f.binning,
            })
            .collect();

        let mut target = Target::new(&self.name, ra_hours, dec_deg, start_time, self.priority, filters);
        target.enable_meridian_wait = self.enable_meridian_wait;
        target.meridian_override = meridian_override;
        Ok(target)
    }
}

fn parse_instant(text: &str) -> Result<DateTime<Utc>, String> {
    NaiveDateTime::parse_from_str(text.trim(), TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| format!("{text:?} is not \"{TIME_FORMAT}\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SAMPLE: &str = r#"
acp_server:
  url: http://observatory.example:8080/
  username: operator
  password: hunter2
  filters: [L, R, G, B, Ha, OIII, SII]

schedule:
  stop_time: "2025-11-04 05:30:00"

observatory:
  latitude: 39.9
  longitude: 116.4
  min_altitude: 30.0

meridian_flip:
  stop_minutes_before: 10
  resume_minutes_after: 10
  safety_margin: 2

global_settings:
  dryrun: true
  poll_interval: 15

retry_settings:
  max_retries: 5

targets:
  - name: NGC 1499
    ra: "04:01:07.51"
    dec: "+36:31:11.9"
    start_time: "2025-11-03 21:00:00"
    priority: 1
    meridian_time: "23:15:00"
    filters:
      - { name: Ha, exposure: 300, count: 12 }
      - { name: OIII, exposure: 300, count: 8, binning: 2 }
  - name: M 31
    ra: "00:42:44.3"
    dec: "+41:16:09"
    start_time: "2025-11-03 23:30:00"
    priority: 2
    enable_meridian_wait: false
    filters:
      - { name: L, exposure: 120, count: 30 }
"#;

    #[test]
    fn parses_the_full_document() {
        let file: FileConfig = serde_yaml::from_str(SAMPLE).unwrap();
        let (config, targets) = file.into_schedule().unwrap();

        assert!(config.dryrun);
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(
            config.stop_time,
            Some(Utc.with_ymd_and_hms(2025, 11, 4, 5, 30, 0).unwrap())
        );
        assert_eq!(config.site.latitude_deg, 39.9);

        assert_eq!(targets.len(), 2);
        let first = &targets[0];
        assert!((first.ra_hours - 4.018_753).abs() < 1e-5);
        assert!(first.enable_meridian_wait);
        assert_eq!(first.meridian_override, NaiveTime::from_hms_opt(23, 15, 0));
        assert_eq!(first.filters[0].binning, 1);
        assert_eq!(first.filters[1].binning, 2);
        assert!(!targets[1].enable_meridian_wait);
    }

    #[test]
    fn optional_sections_take_documented_defaults() {
        let minimal = r#"
acp_server:
  url: http://observatory.example
  username: operator
targets:
  - name: M 42
    ra: "05:35:17"
    dec: "-05:23:28"
    start_time: "2025-11-03 22:00:00"
    filters:
      - { name: L, exposure: 60, count: 10 }
"#;
        let file: FileConfig = serde_yaml::from_str(minimal).unwrap();
        assert_eq!(file.acp_server.filters[4], "Ha");
        let (config, targets) = file.into_schedule().unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.meridian.stop_minutes_before, 10);
        assert_eq!(config.meridian.safety_margin_minutes, 2);
        assert!(config.stop_time.is_none());
        assert!(targets[0].enable_meridian_wait);
        assert_eq!(targets[0].priority, 1);
        assert_eq!(targets[0].filters[0].binning, 1);
    }

    #[test]
    fn malformed_fields_are_aggregated() {
        let broken = r#"
acp_server:
  url: http://observatory.example
  username: operator
targets:
  - name: bad-ra
    ra: "not a coordinate"
    dec: "+10:00:00"
    start_time: "2025-11-03 22:00:00"
    filters:
      - { name: L, exposure: 60, count: 10 }
  - name: bad-time
    ra: "05:00:00"
    dec: "+10:00:00"
    start_time: "tonight sometime"
    filters:
      - { name: L, exposure: 60, count: 10 }
"#;
        let file: FileConfig = serde_yaml::from_str(broken).unwrap();
        let err = file.into_schedule().unwrap_err();
        assert_eq!(err.issues.len(), 2);
        assert!(err.issues.iter().any(|i| i.name == "bad-ra"));
        assert!(err.issues.iter().any(|i| i.name == "bad-time"));
    }
}
