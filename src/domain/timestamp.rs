// Timestamp normalization for upstream receive times
use crate::domain::error::MonitorError;
use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;

const FRACTIONAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const WHOLE_SECONDS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const MAX_FRACTION_DIGITS: usize = 9;

/// Parse an upstream timestamp into a UTC instant.
///
/// Accepts `YYYY-MM-DD HH:MM:SS` with or without fractional seconds, using
/// either a space or `T` as the separator and an optional trailing `Z`.
/// Fractions may have 1 to 9 digits. Timestamps without a zone are read as UTC.
pub fn parse(raw: &str) -> Result<DateTime<Utc>, MonitorError> {
    let trimmed = raw.trim();
    let normalized = trimmed.strip_suffix('Z').unwrap_or(trimmed).replacen('T', " ", 1);

    if let Some((_, fraction)) = normalized.split_once('.') {
        if fraction.len() > MAX_FRACTION_DIGITS {
            return Err(MonitorError::TimestampFormat { raw: raw.to_string() });
        }
    }

    NaiveDateTime::parse_from_str(&normalized, FRACTIONAL_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(&normalized, WHOLE_SECONDS_FORMAT))
        .map(|naive| naive.and_utc())
        .map_err(|_| MonitorError::TimestampFormat { raw: raw.to_string() })
}

/// Convert an instant into the display zone. Only for presentation.
pub fn project(instant: DateTime<Utc>, zone: Tz) -> DateTime<Tz> {
    instant.with_timezone(&zone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    #[test]
    fn test_zulu_suffix_matches_bare_utc() {
        let zulu = parse("2024-03-01T10:15:30.123456Z").unwrap();
        let bare = parse("2024-03-01T10:15:30.123456").unwrap();

        assert_eq!(zulu, bare);
        assert_eq!(zulu.nanosecond(), 123_456_000);
    }

    #[test]
    fn test_whole_seconds() {
        let parsed = parse("2024-03-01T10:15:30Z").unwrap();

        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 30).unwrap());
        assert_eq!(parsed.nanosecond(), 0);
    }

    #[test]
    fn test_space_separator_and_millis() {
        let parsed = parse("2024-03-01 10:15:30.5").unwrap();
        assert_eq!(parsed.second(), 30);
        assert_eq!(parsed.nanosecond(), 500_000_000);
    }

    #[test]
    fn test_fraction_digit_limit() {
        let nanos = parse("2024-03-01T10:15:30.123456789Z").unwrap();
        assert_eq!(nanos.nanosecond(), 123_456_789);

        assert!(matches!(
            parse("2024-03-01T10:15:30.1234567890123Z"),
            Err(MonitorError::TimestampFormat { .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_formats() {
        for raw in ["", "2024-03-01", "10:15:30", "01/03/2024 10:15:30", "2024-03-01T10:15:30+01:00"] {
            match parse(raw) {
                Err(MonitorError::TimestampFormat { raw: reported }) => assert_eq!(reported, raw),
                other => panic!("expected timestamp error for {:?}, got {:?}", raw, other),
            }
        }
    }

    #[test]
    fn test_project_to_lisbon() {
        let summer = parse("2024-07-01T12:00:00Z").unwrap();
        let winter = parse("2024-01-15T12:00:00Z").unwrap();

        let summer_local = project(summer, chrono_tz::Europe::Lisbon);
        let winter_local = project(winter, chrono_tz::Europe::Lisbon);

        assert_eq!(summer_local.hour(), 13);
        assert_eq!(winter_local.hour(), 12);
        assert_eq!(winter_local.day(), 15);
        // Projection never changes the instant itself
        assert_eq!(summer_local.with_timezone(&Utc), summer);
    }
}
