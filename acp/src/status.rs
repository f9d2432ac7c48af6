//! ACP system status decoding
//!
//! `/ac/asystemstatus.asp` answers with JavaScript of the form
//! `_s('sm_local','@an19%3A44%3A15')`: one `_s(key, value)` call per field,
//! values percent-encoded and prefixed with a presentation code
//! (`@an` plain, `@wn` warning-capable, `@in` numeric, `@inn` may be n/a).
//! This module decodes that text into a typed snapshot.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Snapshot of the observatory as reported by the status endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservatoryStatus {
    pub local_time: String,
    pub utc_time: String,
    pub observatory_status: String,
    pub owner: String,
    pub telescope_status: String,
    pub camera_status: String,
    pub guider_status: String,
    pub current_ra: String,
    pub current_dec: String,
    pub image_filter: String,
    /// "completed/total" sets in the running plan, "0/0" when idle.
    pub plan_progress: String,
    pub last_fwhm: String,
}

impl ObservatoryStatus {
    pub fn from_response(text: &str) -> Self {
        let map = parse_encoded_status(text);
        let field = |key: &str| map.get(key).cloned().unwrap_or_default();
        Self {
            local_time: field("sm_local"),
            utc_time: field("sm_utc"),
            observatory_status: or_offline(map.get("sm_obsStat")),
            owner: map.get("sm_obsOwner").cloned().unwrap_or_else(|| "Free".into()),
            telescope_status: or_offline(map.get("sm_scopeStat")),
            camera_status: or_offline(map.get("sm_camStat")),
            guider_status: or_offline(map.get("sm_guideStat")),
            current_ra: field("sm_ra"),
            current_dec: field("sm_dec"),
            image_filter: field("sm_imgFilt"),
            plan_progress: map.get("sm_plnSet").cloned().unwrap_or_else(|| "0/0".into()),
            last_fwhm: field("sm_lastFWHM"),
        }
    }

    pub fn is_offline(&self) -> bool {
        self.observatory_status.eq_ignore_ascii_case("offline")
    }

    /// Whether an acquisition plan is in progress.
    pub fn is_running(&self) -> bool {
        if self.is_offline() {
            return false;
        }
        let scope_busy = !matches!(
            self.telescope_status.to_ascii_lowercase().as_str(),
            "" | "offline" | "idle" | "parked"
        );
        let camera_busy = !matches!(
            self.camera_status.to_ascii_lowercase().as_str(),
            "" | "offline" | "idle"
        );
        scope_busy || camera_busy
    }
}

fn or_offline(value: Option<&String>) -> String {
    value.cloned().unwrap_or_else(|| "Offline".into())
}

/// Parse every `_s('key','value')` assignment in a status response.
pub fn parse_encoded_status(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut rest = text;
    while let Some(start) = rest.find("_s(") {
        rest = &rest[start + 3..];
        let Some((key, after_key)) = quoted(rest) else { continue };
        let Some(comma) = after_key.find(',') else { continue };
        let Some((value, after_value)) = quoted(&after_key[comma + 1..]) else { continue };
        map.insert(key.to_string(), decode_value(value));
        rest = after_value;
    }
    map
}

/// Extract the next single-quoted token, returning it and the remainder.
fn quoted(text: &str) -> Option<(&str, &str)> {
    let open = text.find('\'')?;
    let body = &text[open + 1..];
    let close = body.find('\'')?;
    Some((&body[..close], &body[close + 1..]))
}

fn decode_value(raw: &str) -> String {
    let decoded = percent_decode(raw);
    for prefix in ["@inn", "@an", "@wn", "@in"] {
        if let Some(stripped) = decoded.strip_prefix(prefix) {
            return stripped.to_string();
        }
    }
    decoded
}

/// Decode %XX escapes; '+' is left alone because ACP never emits it for
/// spaces in status values.
pub fn percent_decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex: Option<u8> = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            if let Some(byte) = hex {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Pull bracketed warning lines ("[lba warning]The observatory is offline")
/// out of a submission response.
pub fn extract_warnings(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| {
            line.starts_with('[')
                && line.to_ascii_lowercase().contains("warning")
                && line.contains(']')
        })
        .map(ToString::to_string)
        .collect()
}

/// Whether response text reports the observatory offline.
pub fn mentions_offline(text: &str) -> bool {
    text.to_ascii_lowercase().contains("observatory is offline")
}
