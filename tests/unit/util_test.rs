//! Tests for utility functions

use chrono::{TimeDelta, TimeZone, Utc};
use session_agenda::util::{
    elapsed_between, format_duration, parse_duration, parse_positive_duration, Clock,
    ManualClock,
};
use std::time::Duration;

#[test]
fn test_parse_clock_and_humantime_forms() {
    assert_eq!(parse_duration("00:00:05").unwrap(), Duration::from_secs(5));
    assert_eq!(parse_duration("01:30:00").unwrap(), Duration::from_secs(5400));
    assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    assert_eq!(parse_duration("1h 30m").unwrap(), Duration::from_secs(5400));
}

#[test]
fn test_parse_rejects_garbage() {
    assert!(parse_duration("").is_err());
    assert!(parse_duration("-5s").is_err());
    assert!(parse_duration("00:61:00").is_err());
    assert!(parse_duration("soon").is_err());
    assert!(parse_positive_duration("0s").is_err());
}

#[test]
fn test_format_duration() {
    assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
}

#[test]
fn test_manual_clock_sleep_advances_time() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let clock = ManualClock::new(t0);
    clock.sleep(Duration::from_secs(3));
    assert_eq!(clock.now(), t0 + TimeDelta::seconds(3));
    assert_eq!(elapsed_between(t0, clock.now()), Duration::from_secs(3));
    assert_eq!(elapsed_between(clock.now(), t0), Duration::ZERO);
}
