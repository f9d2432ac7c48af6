//! ACP acquisition form construction
//!
//! ACP accepts an imaging plan as a form post with sixteen fixed filter
//! slots; unused slots must still be present with their idle values or the
//! server rejects the form.

use serde::{Deserialize, Serialize};

/// The number of filter slots in the acquisition form. Fixed by ACP.
pub const FORM_FILTER_SLOTS: usize = 16;

/// One populated filter slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSlot {
    /// Position of the filter in the wheel, as configured server-side.
    pub filter_id: u32,
    pub count: u32,
    pub exposure_secs: u32,
    pub binning: u32,
}

/// A plan ready for submission to `/ac/aacqform.asp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcpImagingPlan {
    pub target: String,
    /// Sexagesimal right ascension, e.g. "04:01:07.5".
    pub ra: String,
    /// Signed sexagesimal declination, e.g. "+36:31:11.9".
    pub dec: String,
    pub filters: Vec<FilterSlot>,
    /// Dither magnitude in pixels.
    pub dither: u32,
    pub auto_focus: bool,
    /// Refocus every N frames; zero disables periodic autofocus.
    pub periodic_af_interval: u32,
}

impl AcpImagingPlan {
    /// Render the full acquisition form, idle slots included.
    pub fn form_data(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("Target".to_string(), self.target.clone()),
            ("visOnly".to_string(), "true".to_string()),
            ("isOrb".to_string(), "dsky".to_string()),
            ("RA".to_string(), self.ra.clone()),
            ("Dec".to_string(), self.dec.clone()),
            ("Dither".to_string(), self.dither.to_string()),
            ("AF".to_string(), yes_no(self.auto_focus)),
            ("PerAF".to_string(), yes_no(self.periodic_af_interval > 0)),
            ("PerAFInt".to_string(), self.periodic_af_interval.to_string()),
        ];

        for (slot, filter) in self.filters.iter().take(FORM_FILTER_SLOTS).enumerate() {
            let n = slot + 1;
            form.push((format!("ColorUse{n}"), "yes".to_string()));
            form.push((format!("ColorCount{n}"), filter.count.to_string()));
            form.push((format!("ColorFilter{n}"), filter.filter_id.to_string()));
            form.push((format!("ColorExposure{n}"), filter.exposure_secs.to_string()));
            form.push((format!("ColorBinning{n}"), filter.binning.to_string()));
        }
        for n in self.filters.len().min(FORM_FILTER_SLOTS) + 1..=FORM_FILTER_SLOTS {
            form.push((format!("ColorUse{n}"), String::new()));
            form.push((format!("ColorCount{n}"), String::new()));
            form.push((format!("ColorFilter{n}"), "0".to_string()));
            form.push((format!("ColorExposure{n}"), String::new()));
            form.push((format!("ColorBinning{n}"), "1".to_string()));
        }

        form
    }
}

fn yes_no(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}
