//! Per-stage duration windows.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::SchedulerError;
use crate::core::running::RunStage;
use crate::util::duration::format_duration;

/// Duration window with optional bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationInterval {
    /// Lower bound.
    #[serde(default, with = "humantime_serde")]
    pub min: Option<Duration>,
    /// Upper bound.
    #[serde(default, with = "humantime_serde")]
    pub max: Option<Duration>,
}

impl DurationInterval {
    /// Build an interval, rejecting `min > max`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidDurationInterval`] when the bounds are reversed.
    pub fn new(min: Option<Duration>, max: Option<Duration>) -> Result<Self, SchedulerError> {
        let interval = Self { min, max };
        interval.validate()?;
        Ok(interval)
    }

    /// Degenerate interval `[d, d]`.
    #[must_use]
    pub const fn exactly(d: Duration) -> Self {
        Self {
            min: Some(d),
            max: Some(d),
        }
    }

    /// Interval with only an upper bound.
    #[must_use]
    pub const fn at_most(d: Duration) -> Self {
        Self {
            min: None,
            max: Some(d),
        }
    }

    /// Check `min <= max`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidDurationInterval`] when the bounds are reversed.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(SchedulerError::InvalidDurationInterval(self.to_string()));
            }
        }
        Ok(())
    }

    /// Whether neither bound is set.
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// Check `elapsed` against the window with `tolerance` slack on both sides.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the violation.
    pub fn check(&self, elapsed: Duration, tolerance: Duration, check_min: bool) -> Result<(), String> {
        if check_min {
            if let Some(min) = self.min {
                if elapsed + tolerance < min {
                    return Err(format!(
                        "elapsed {} is below minimum {}",
                        format_duration(elapsed),
                        format_duration(min)
                    ));
                }
            }
        }
        if let Some(max) = self.max {
            if elapsed > max + tolerance {
                return Err(format!(
                    "elapsed {} exceeds maximum {}",
                    format_duration(elapsed),
                    format_duration(max)
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for DurationInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |b: Option<Duration>| b.map_or_else(|| "-".to_string(), format_duration);
        write!(f, "[{}; {}]", bound(self.min), bound(self.max))
    }
}

/// Mapping from constrainable stage to its duration window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeConstraints {
    constraints: BTreeMap<RunStage, DurationInterval>,
}

impl TimeConstraints {
    /// Empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            constraints: BTreeMap::new(),
        }
    }

    /// Attach a window to a stage. The set is untouched on failure.
    ///
    /// # Errors
    ///
    /// Fails for stages outside the constrainable five, for a stage that
    /// already has a window, or for an invalid interval.
    pub fn add_constraint(
        &mut self,
        stage: RunStage,
        interval: DurationInterval,
    ) -> Result<(), SchedulerError> {
        if !stage.supports_constraint() {
            return Err(SchedulerError::UnsupportedConstraintStage(stage));
        }
        if self.constraints.contains_key(&stage) {
            return Err(SchedulerError::DuplicateConstraint(stage));
        }
        interval.validate()?;
        self.constraints.insert(stage, interval);
        Ok(())
    }

    /// Whether `stage` has a window.
    #[must_use]
    pub fn has_constraint(&self, stage: RunStage) -> bool {
        self.constraints.contains_key(&stage)
    }

    /// Window for `stage`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::MissingConstraint`] if absent.
    pub fn get_constraint(&self, stage: RunStage) -> Result<&DurationInterval, SchedulerError> {
        self.constraints
            .get(&stage)
            .ok_or(SchedulerError::MissingConstraint(stage))
    }

    /// Remove every window.
    pub fn reset(&mut self) {
        self.constraints.clear();
    }

    /// Number of constrained stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Whether no stage is constrained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Iterate over `(stage, window)` in stage order.
    pub fn iter(&self) -> impl Iterator<Item = (&RunStage, &DurationInterval)> {
        self.constraints.iter()
    }

    /// Sum of all lower bounds (missing bounds count as zero).
    #[must_use]
    pub fn total_min(&self) -> Duration {
        self.constraints.values().filter_map(|i| i.min).sum()
    }

    /// Sum of all upper bounds, or `None` if any stage is open-ended.
    #[must_use]
    pub fn total_max(&self) -> Option<Duration> {
        self.constraints.values().map(|i| i.max).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unsupported_stage_without_change() {
        let mut tc = TimeConstraints::new();
        tc.add_constraint(
            RunStage::FunctionalWorkRunning,
            DurationInterval::exactly(Duration::from_secs(5)),
        )
        .unwrap();
        let before = tc.clone();
        let err = tc
            .add_constraint(RunStage::Ready, DurationInterval::default())
            .unwrap_err();
        assert_eq!(err, SchedulerError::UnsupportedConstraintStage(RunStage::Ready));
        assert_eq!(tc, before);
    }

    #[test]
    fn test_rejects_reversed_interval() {
        assert!(DurationInterval::new(Some(Duration::from_secs(2)), Some(Duration::from_secs(1))).is_err());
        let mut tc = TimeConstraints::new();
        let bad = DurationInterval {
            min: Some(Duration::from_secs(2)),
            max: Some(Duration::from_secs(1)),
        };
        assert!(tc.add_constraint(RunStage::SystemPreparing, bad).is_err());
        assert!(tc.is_empty());
    }

    #[test]
    fn test_get_missing_constraint_fails() {
        let tc = TimeConstraints::new();
        assert!(!tc.has_constraint(RunStage::SystemTerminating));
        assert!(tc.get_constraint(RunStage::SystemTerminating).is_err());
    }

    #[test]
    fn test_check_with_tolerance() {
        let window = DurationInterval::exactly(Duration::from_secs(5));
        let tol = Duration::from_millis(500);
        assert!(window.check(Duration::from_millis(5200), tol, true).is_ok());
        assert!(window.check(Duration::from_secs(7), tol, true).is_err());
        assert!(window.check(Duration::from_secs(2), tol, true).is_err());
        assert!(window.check(Duration::from_secs(2), tol, false).is_ok());
    }

    #[test]
    fn test_totals() {
        let mut tc = TimeConstraints::new();
        tc.add_constraint(
            RunStage::FunctionalUpRunning,
            DurationInterval::at_most(Duration::from_secs(3)),
        )
        .unwrap();
        tc.add_constraint(
            RunStage::FunctionalWorkRunning,
            DurationInterval::exactly(Duration::from_secs(5)),
        )
        .unwrap();
        assert_eq!(tc.total_min(), Duration::from_secs(5));
        assert_eq!(tc.total_max(), Some(Duration::from_secs(8)));
        tc.add_constraint(
            RunStage::FunctionalDownRunning,
            DurationInterval::default(),
        )
        .unwrap();
        assert_eq!(tc.total_max(), None);
    }
}
