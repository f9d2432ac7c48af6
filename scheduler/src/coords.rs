//! Sexagesimal coordinate parsing and formatting
//!
//! Targets arrive with coordinates written the way catalogs and planning
//! tools write them ("04:01:07.51", "+36:31:11.9"). They are parsed exactly
//! once, at load time; everything downstream works in right-ascension hours
//! and declination degrees.

/// Parse a right ascension string ("HH:MM:SS.s" or decimal hours) into hours.
pub fn parse_ra(text: &str) -> Result<f64, String> {
    let hours = parse_sexagesimal(text)
        .map_err(|e| format!("invalid right ascension {text:?}: {e}"))?;
    if !(0.0..24.0).contains(&hours) {
        return Err(format!("right ascension {hours:.4}h outside [0, 24)"));
    }
    Ok(hours)
}

/// Parse a declination string ("+DD:MM:SS" or decimal degrees) into degrees.
pub fn parse_dec(text: &str) -> Result<f64, String> {
    let degrees = parse_sexagesimal(text)
        .map_err(|e| format!("invalid declination {text:?}: {e}"))?;
    if !(-90.0..=90.0).contains(&degrees) {
        return Err(format!("declination {degrees:.4}° outside [-90, 90]"));
    }
    Ok(degrees)
}

/// Format right ascension hours as "HH:MM:SS.S" for the controller form.
pub fn format_ra(hours: f64) -> String {
    let (h, m, s) = split_sexagesimal(hours.rem_euclid(24.0));
    format!("{h:02}:{m:02}:{s:04.1}")
}

/// Format declination degrees as "+DD:MM:SS" for the controller form.
pub fn format_dec(degrees: f64) -> String {
    let sign = if degrees < 0.0 { '-' } else { '+' };
    let (d, m, s) = split_sexagesimal(degrees.abs());
    format!("{sign}{d:02}:{m:02}:{s:04.1}")
}

fn split_sexagesimal(value: f64) -> (u32, u32, f64) {
    let whole = value.floor();
    let minutes_full = (value - whole) * 60.0;
    let minutes = minutes_full.floor();
    let seconds = (minutes_full - minutes) * 60.0;
    // Guard against 59.999.. rounding up to 60.0 in the formatted output.
    if seconds >= 59.95 {
        let bumped = whole * 3600.0 + (minutes + 1.0) * 60.0;
        return split_sexagesimal(bumped / 3600.0);
    }
    (whole as u32, minutes as u32, seconds)
}

fn parse_sexagesimal(text: &str) -> Result<f64, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err("empty string".into());
    }

    let (sign, rest) = match trimmed.as_bytes()[0] {
        b'+' => (1.0, &trimmed[1..]),
        b'-' => (-1.0, &trimmed[1..]),
        _ => (1.0, trimmed),
    };

    // Accept plain decimal values as well.
    if !rest.contains(':') {
        let value: f64 = rest.parse().map_err(|_| format!("not a number: {rest:?}"))?;
        return Ok(sign * value);
    }

    let parts: Vec<&str> = rest.split(':').collect();
    if parts.len() != 3 {
        return Err(format!("expected three ':'-separated fields, got {}", parts.len()));
    }
    let whole: f64 = parts[0].parse().map_err(|_| format!("bad field {:?}", parts[0]))?;
    let minutes: f64 = parts[1].parse().map_err(|_| format!("bad field {:?}", parts[1]))?;
    let seconds: f64 = parts[2].parse().map_err(|_| format!("bad field {:?}", parts[2]))?;
    if !(0.0..60.0).contains(&minutes) || !(0.0..60.0).contains(&seconds) {
        return Err("minutes and seconds must be in [0, 60)".into());
    }

    Ok(sign * (whole + minutes / 60.0 + seconds / 3600.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_catalog_style_ra() {
        let ra = parse_ra("04:01:07.51").unwrap();
        assert!((ra - 4.018_753).abs() < 1e-5);
    }

    #[test]
    fn parses_signed_declination() {
        let dec = parse_dec("+36:31:11.9").unwrap();
        assert!((dec - 36.519_972).abs() < 1e-5);
        let south = parse_dec("-05:23:28").unwrap();
        assert!((south + 5.391_111).abs() < 1e-5);
    }

    #[test]
    fn accepts_decimal_values() {
        assert!((parse_ra("12.5").unwrap() - 12.5).abs() < 1e-9);
        assert!((parse_dec("-41.25").unwrap() + 41.25).abs() < 1e-9);
    }

    #[test]
    fn rejects_out_of_range_and_junk() {
        assert!(parse_ra("24:00:00").is_err());
        assert!(parse_dec("+91:00:00").is_err());
        assert!(parse_ra("four hours").is_err());
        assert!(parse_dec("12:61:00").is_err());
        assert!(parse_ra("").is_err());
    }

    #[test]
    fn formats_round_trip() {
        let ra = parse_ra(&format_ra(4.018_753)).unwrap();
        assert!((ra - 4.018_753).abs() < 0.01 / 3600.0 * 15.0);
        let dec = parse_dec(&format_dec(-5.391_111)).unwrap();
        assert!((dec + 5.391_111).abs() < 0.1 / 3600.0);
    }

    #[test]
    fn formatting_does_not_emit_sixty_seconds() {
        let text = format_ra(4.999_999_9);
        assert!(!text.contains(":60"), "{text}");
    }
}
