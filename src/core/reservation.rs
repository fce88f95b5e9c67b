//! Calendar entries of the agenda.

use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::UseCaseConfig;
use crate::core::cardinality::CardinalityRequest;
use crate::core::error::SchedulerError;
use crate::util::clock::elapsed_between;

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimePeriod {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
}

impl TimePeriod {
    /// Build a period, rejecting `end <= start`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConfig`] for empty or reversed periods.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, SchedulerError> {
        if end <= start {
            return Err(SchedulerError::InvalidConfig(format!(
                "time period end {end} is not after start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Whether `t` lies within the period.
    #[must_use]
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }

    /// Whether the two periods overlap.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether the period has ended at `now`.
    #[must_use]
    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        self.end <= now
    }

    /// Whether the period starts after `now`.
    #[must_use]
    pub fn is_future(&self, now: DateTime<Utc>) -> bool {
        self.start > now
    }

    /// Length of the period.
    #[must_use]
    pub fn duration(&self) -> Duration {
        elapsed_between(self.start, self.end)
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Lifecycle of a reservation inside the agenda.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Waiting for its start time.
    #[default]
    Pending,
    /// Its session is running.
    Active,
    /// Its session ended normally.
    Completed,
    /// Its session could not start or ended in error.
    Failed,
    /// Its period ended before it could be activated.
    Missed,
}

/// A time period bound to a role and a use case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// Agenda identifier; assigned on insertion when absent.
    #[serde(default)]
    pub id: Option<i32>,
    /// Unique key.
    pub key: Uuid,
    /// Free text.
    #[serde(default)]
    pub description: String,
    /// When the session runs.
    pub period: TimePeriod,
    /// Role granting the session its resources.
    #[serde(default)]
    pub role: Option<String>,
    /// Use case to instantiate at activation.
    pub use_case: UseCaseConfig,
    /// Functional cardinality overrides.
    #[serde(default, skip_serializing_if = "CardinalityRequest::is_empty")]
    pub special_functional: CardinalityRequest,
    /// Distributable cardinality overrides.
    #[serde(default, skip_serializing_if = "CardinalityRequest::is_empty")]
    pub special_distributable: CardinalityRequest,
    /// Opaque macro run before the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_macro: Option<String>,
    /// Opaque macro run after the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_macro: Option<String>,
}

impl Reservation {
    /// New reservation with a fresh key and no id.
    #[must_use]
    pub fn new(period: TimePeriod, use_case: UseCaseConfig) -> Self {
        Self {
            id: None,
            key: Uuid::new_v4(),
            description: String::new(),
            period,
            role: None,
            use_case,
            special_functional: CardinalityRequest::new(),
            special_distributable: CardinalityRequest::new(),
            start_macro: None,
            stop_macro: None,
        }
    }

    /// Set the id.
    #[must_use]
    pub const fn with_id(mut self, id: i32) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Chronological order: by start, then by end.
    #[must_use]
    pub fn cmp_period(&self, other: &Self) -> Ordering {
        self.period
            .start
            .cmp(&other.period.start)
            .then(self.period.end.cmp(&other.period.end))
    }

    /// Validate period and use case.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConfig`] describing the problem.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.period.end <= self.period.start {
            return Err(SchedulerError::InvalidConfig(format!(
                "reservation period {} is empty",
                self.period
            )));
        }
        if self.id.is_some_and(|id| id < 0) {
            return Err(SchedulerError::InvalidConfig(
                "reservation id must not be negative".into(),
            ));
        }
        self.use_case
            .validate()
            .map_err(SchedulerError::InvalidConfig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + TimeDelta::seconds(secs)
    }

    #[test]
    fn test_period_is_half_open() {
        let p = TimePeriod::new(t(0), t(3600)).unwrap();
        assert!(p.contains(t(0)));
        assert!(p.contains(t(1800)));
        assert!(!p.contains(t(3600)));
        assert!(p.is_past(t(3600)));
        assert!(p.is_future(t(-10)));
        assert!(!p.is_future(t(0)));
        assert_eq!(p.duration(), Duration::from_secs(3600));
        assert!(TimePeriod::new(t(10), t(10)).is_err());
    }

    #[test]
    fn test_intersection() {
        let a = TimePeriod::new(t(0), t(100)).unwrap();
        let b = TimePeriod::new(t(100), t(200)).unwrap();
        let c = TimePeriod::new(t(50), t(150)).unwrap();
        assert!(!a.intersects(&b));
        assert!(a.intersects(&c));
        assert!(c.intersects(&b));
    }

    #[test]
    fn test_ordering_and_serde() {
        let early = Reservation::new(
            TimePeriod::new(t(0), t(10)).unwrap(),
            UseCaseConfig::new("a", "lock"),
        );
        let late = Reservation::new(
            TimePeriod::new(t(0), t(20)).unwrap(),
            UseCaseConfig::new("b", "lock"),
        )
        .with_id(7)
        .with_role("operator");
        assert_eq!(early.cmp_period(&late), Ordering::Less);
        assert_ne!(early.key, late.key);
        let json = serde_json::to_string(&late).unwrap();
        let back: Reservation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, late);
    }
}
