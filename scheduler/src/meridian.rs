//! Meridian transit prediction
//!
//! A target crosses the local meridian when its hour angle reaches zero;
//! equatorial mounts must stop tracking shortly before that instant and may
//! only resume once the flip is done. This module computes the next transit
//! for a set of coordinates and derives the pause/resume protection window
//! around it.
//!
//! Everything here is a pure function of its inputs; safe to call
//! repeatedly and from concurrent tasks.

use crate::config::{MeridianFlipConfig, ObserverSite};
use crate::error::PredictionError;
use crate::target::Target;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Sidereal days per solar day.
const SIDEREAL_RATE: f64 = 1.002_737_909_35;

/// The pause/resume window around one meridian transit.
///
/// Derived data, recomputed whenever a target is evaluated; never stored
/// beyond the evaluation that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeridianWindow {
    pub transit_time: DateTime<Utc>,
    pub pause_start: DateTime<Utc>,
    pub resume_at: DateTime<Utc>,
}

impl MeridianWindow {
    /// Whether imaging must be paused at `instant`.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.pause_start <= instant && instant < self.resume_at
    }

    fn around(transit_time: DateTime<Utc>, params: &MeridianFlipConfig) -> Self {
        let margin = i64::from(params.safety_margin_minutes);
        let pause_start =
            transit_time - Duration::minutes(i64::from(params.stop_minutes_before) + margin);
        let resume_at =
            transit_time + Duration::minutes(i64::from(params.resume_minutes_after) + margin);
        Self { transit_time, pause_start, resume_at }
    }
}

/// Julian day number for a UTC instant.
pub fn julian_day(at: DateTime<Utc>) -> f64 {
    let year = at.year();
    let month = at.month() as i32;
    let day = f64::from(at.day());
    let hour = f64::from(at.hour())
        + f64::from(at.minute()) / 60.0
        + f64::from(at.second()) / 3600.0;

    let (y, m) = if month <= 2 { (year - 1, month + 12) } else { (year, month) };
    let a = (f64::from(y) / 100.0).floor();
    let b = 2.0 - a + (a / 4.0).floor();

    (365.25 * (f64::from(y) + 4716.0)).floor()
        + (30.6001 * (f64::from(m) + 1.0)).floor()
        + day
        + hour / 24.0
        + b
        - 1524.5
}

/// Greenwich mean sidereal time in hours for a UTC instant.
pub fn greenwich_sidereal_time(at: DateTime<Utc>) -> f64 {
    let d = julian_day(at) - 2_451_545.0;
    (18.697_374_558 + 24.065_709_824_419_08 * d).rem_euclid(24.0)
}

/// Local sidereal time in hours at `longitude_deg` (east positive).
pub fn local_sidereal_time(at: DateTime<Utc>, longitude_deg: f64) -> f64 {
    (greenwich_sidereal_time(at) + longitude_deg / 15.0).rem_euclid(24.0)
}

/// Hour angle of a target in hours, normalized to [-12, 12).
pub fn hour_angle(ra_hours: f64, lst_hours: f64) -> f64 {
    let mut ha = (lst_hours - ra_hours).rem_euclid(24.0);
    if ha >= 12.0 {
        ha -= 24.0;
    }
    ha
}

/// Compute the next meridian transit after `reference` and the protection
/// window around it.
///
/// The returned transit is strictly in the future: a target sitting exactly
/// on the meridian gets its next crossing, one sidereal day ahead.
pub fn predict(
    ra_hours: f64,
    dec_deg: f64,
    site: &ObserverSite,
    params: &MeridianFlipConfig,
    reference: DateTime<Utc>,
) -> Result<MeridianWindow, PredictionError> {
    if !ra_hours.is_finite() || !dec_deg.is_finite() || !site.longitude_deg.is_finite() {
        return Err(PredictionError::BadInput(format!(
            "ra={ra_hours} dec={dec_deg} lon={}",
            site.longitude_deg
        )));
    }

    let lst = local_sidereal_time(reference, site.longitude_deg);

    // Sidereal hours until the hour angle next crosses zero.
    let mut sidereal_hours = (ra_hours - lst).rem_euclid(24.0);
    if sidereal_hours < 1e-6 {
        sidereal_hours += 24.0;
    }
    let solar_hours = sidereal_hours / SIDEREAL_RATE;

    let transit_time = reference
        + Duration::milliseconds((solar_hours * 3_600_000.0).round() as i64);

    // The closed form above cannot miss, but guard the invariants anyway.
    if transit_time <= reference || solar_hours > 24.5 {
        return Err(PredictionError::NoSolution { reference: reference.to_rfc3339() });
    }

    Ok(MeridianWindow::around(transit_time, params))
}

/// Window for a target, honoring a manually pinned transit time when one is
/// configured.
///
/// An override names a time of day; the first transit whose window has not
/// entirely passed at `reference` is used, so a pinned transit a few
/// minutes in the past still pauses imaging until its resume point.
pub fn window_for_target(
    target: &Target,
    site: &ObserverSite,
    params: &MeridianFlipConfig,
    reference: DateTime<Utc>,
) -> Result<MeridianWindow, PredictionError> {
    match target.meridian_override {
        Some(time_of_day) => {
            let mut transit = reference
                .date_naive()
                .and_time(time_of_day)
                .and_utc();
            let mut window = MeridianWindow::around(transit, params);
            if window.resume_at <= reference {
                transit += Duration::days(1);
                window = MeridianWindow::around(transit, params);
            }
            Ok(window)
        }
        None => predict(target.ra_hours, target.dec_deg, site, params, reference),
    }
}
