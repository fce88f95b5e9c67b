//! Duration parsing for use-case configuration values.
//!
//! Two notations are accepted: clock style `HH:MM:SS[.fff]` and the
//! humantime notation (`5s`, `1h 30min`, `250ms`).

use std::time::Duration;

use crate::core::SchedulerError;

fn invalid(input: &str, reason: impl Into<String>) -> SchedulerError {
    SchedulerError::InvalidDuration {
        input: input.to_string(),
        reason: reason.into(),
    }
}

fn parse_clock_notation(input: &str, repr: &str) -> Result<Duration, SchedulerError> {
    let parts: Vec<&str> = repr.split(':').collect();
    if parts.len() != 3 {
        return Err(invalid(input, "expected HH:MM:SS"));
    }
    let hours: u64 = parts[0]
        .trim()
        .parse()
        .map_err(|_| invalid(input, "invalid hours"))?;
    let minutes: u64 = parts[1]
        .trim()
        .parse()
        .map_err(|_| invalid(input, "invalid minutes"))?;
    let seconds: f64 = parts[2]
        .trim()
        .parse()
        .map_err(|_| invalid(input, "invalid seconds"))?;
    if minutes >= 60 {
        return Err(invalid(input, "minutes out of range"));
    }
    if !(0.0..60.0).contains(&seconds) {
        return Err(invalid(input, "seconds out of range"));
    }
    hours
        .checked_mul(3600)
        .and_then(|secs| secs.checked_add(minutes * 60))
        .map(Duration::from_secs)
        .and_then(|whole| whole.checked_add(Duration::from_secs_f64(seconds)))
        .ok_or_else(|| invalid(input, "duration out of range"))
}

/// Parse a non-negative duration.
///
/// # Errors
///
/// Returns [`SchedulerError::InvalidDuration`] with the offending input.
pub fn parse_duration(input: &str) -> Result<Duration, SchedulerError> {
    let repr = input.trim();
    if repr.is_empty() {
        return Err(invalid(input, "empty duration"));
    }
    if repr.starts_with('-') {
        return Err(invalid(input, "negative duration"));
    }
    if repr.contains(':') {
        return parse_clock_notation(input, repr);
    }
    humantime::parse_duration(repr).map_err(|e| invalid(input, e.to_string()))
}

/// Parse a strictly positive duration.
///
/// # Errors
///
/// Returns [`SchedulerError::InvalidDuration`] for unparsable or zero input.
pub fn parse_positive_duration(input: &str) -> Result<Duration, SchedulerError> {
    let d = parse_duration(input)?;
    if d.is_zero() {
        return Err(invalid(input, "duration must be positive"));
    }
    Ok(d)
}

/// Human readable rendering (`1h 30m 5s`).
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    humantime::format_duration(duration).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_notation() {
        assert_eq!(parse_duration("00:00:05").unwrap(), Duration::from_secs(5));
        assert_eq!(
            parse_duration("01:30:00").unwrap(),
            Duration::from_secs(5400)
        );
        assert_eq!(
            parse_duration("00:00:01.5").unwrap(),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn test_humantime_notation() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("1h 30min").unwrap(), Duration::from_secs(5400));
    }

    #[test]
    fn test_invalid_inputs() {
        for bad in [
            "",
            "abc",
            "-5s",
            "00:61:00",
            "1:2",
            "00:00:75",
            "9999999999999999:00:00",
        ] {
            let err = parse_duration(bad).unwrap_err();
            assert!(matches!(err, SchedulerError::InvalidDuration { .. }), "{bad}");
        }
    }

    #[test]
    fn test_positive_rejects_zero() {
        assert!(parse_positive_duration("0s").is_err());
        assert!(parse_positive_duration("00:00:00").is_err());
    }
}
