//! Date and time text formats.
//!
//! Timestamps carrying an offset are normalized to UTC; sub-second digits
//! are kept to the nanosecond.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d);
    }
    parse_datetime(s).map(|dt| dt.date())
}

pub fn parse_time(s: &str) -> Result<NaiveTime, String> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|e| format!("invalid time '{}': {}", s, e))
}

pub fn parse_datetime(s: &str) -> Result<NaiveDateTime, String> {
    let mut text = s.trim().to_string();
    if text.len() > 10 && text.as_bytes()[10] == b'T' {
        text.replace_range(10..11, " ");
    }
    if let Some(stripped) = text.strip_suffix('Z') {
        text = format!("{}+00:00", stripped);
    }

    if let Ok(dt) = DateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Ok(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M") {
        return Ok(dt);
    }
    NaiveDate::parse_from_str(&text, "%Y-%m-%d")
        .map(|d| d.and_time(NaiveTime::MIN))
        .map_err(|e| format!("invalid datetime '{}': {}", s.trim(), e))
}

pub fn format_time(t: &NaiveTime) -> String {
    t.format("%H:%M:%S%.f").to_string()
}

/// `sep` is ' ' for SQL text and 'T' for ISO-8601
pub fn format_datetime(dt: &NaiveDateTime, sep: char) -> String {
    format!("{}{}{}", dt.date().format("%Y-%m-%d"), sep, format_time(&dt.time()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32, micro: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_micro_opt(h, m, s, micro)
            .unwrap()
    }

    #[test]
    fn test_offsets_normalize_to_utc() {
        assert_eq!(
            parse_datetime("2024-03-01 12:00:00.250+02:00").unwrap(),
            at(10, 0, 0, 250_000)
        );
        assert_eq!(parse_datetime("2024-03-01T12:00:00Z").unwrap(), at(12, 0, 0, 0));
        assert_eq!(parse_datetime("2024-03-01 12:00:00-05").unwrap(), at(17, 0, 0, 0));
    }

    #[test]
    fn test_naive_forms() {
        assert_eq!(
            parse_datetime("2024-03-01 08:15:30.000123").unwrap(),
            at(8, 15, 30, 123)
        );
        assert_eq!(parse_datetime("2024-03-01").unwrap(), at(0, 0, 0, 0));
        assert!(parse_datetime("not a date").is_err());
    }

    #[test]
    fn test_format_keeps_fraction() {
        assert_eq!(format_datetime(&at(8, 15, 30, 123), ' '), "2024-03-01 08:15:30.000123");
        assert_eq!(format_datetime(&at(8, 15, 30, 0), 'T'), "2024-03-01T08:15:30");
        assert_eq!(parse_time("23:59").unwrap(), NaiveTime::from_hms_opt(23, 59, 0).unwrap());
    }
}
