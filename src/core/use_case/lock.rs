//! Pure time-lock use case: holds its resources for a fixed duration.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::core::error::SchedulerError;
use crate::core::running::{RunStage, WorkLoopStatus};
use crate::core::time_constraints::{DurationInterval, TimeConstraints};
use crate::core::use_case::{property_duration, RunContext, UseCaseBehavior, UseCaseProperties};
use crate::util::clock::{add_duration, elapsed_between};

/// Registry type identifier.
pub const LOCK_TYPE_ID: &str = "lock";
/// Default sleep granularity of the work loop.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);
/// Smallest accepted tick.
pub const MIN_TICK: Duration = Duration::from_micros(10);

/// Sleeps in bounded ticks until the requested duration has elapsed.
#[derive(Debug, Clone)]
pub struct LockUseCase {
    tick: Duration,
    duration: Option<Duration>,
    run_start: Option<DateTime<Utc>>,
    run_stop: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
}

impl Default for LockUseCase {
    fn default() -> Self {
        Self::new()
    }
}

impl LockUseCase {
    /// Unconfigured lock with the default tick.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tick: DEFAULT_TICK,
            duration: None,
            run_start: None,
            run_stop: None,
            stopped_at: None,
        }
    }

    /// Set the work-loop tick.
    ///
    /// # Errors
    ///
    /// Tick below [`MIN_TICK`].
    pub fn set_tick(&mut self, tick: Duration) -> Result<(), SchedulerError> {
        if tick < MIN_TICK {
            return Err(SchedulerError::InvalidDuration {
                input: format!("{tick:?}"),
                reason: format!("tick must be at least {MIN_TICK:?}"),
            });
        }
        self.tick = tick;
        Ok(())
    }

    /// Set the lock duration.
    ///
    /// # Errors
    ///
    /// Zero duration.
    pub fn set_duration(&mut self, duration: Duration) -> Result<(), SchedulerError> {
        if duration.is_zero() {
            return Err(SchedulerError::InvalidDuration {
                input: format!("{duration:?}"),
                reason: "duration must be positive".into(),
            });
        }
        self.duration = Some(duration);
        Ok(())
    }

    /// Work-loop tick.
    #[must_use]
    pub const fn tick(&self) -> Duration {
        self.tick
    }

    /// Configured duration.
    #[must_use]
    pub const fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Time recorded at run preparation.
    #[must_use]
    pub const fn run_start(&self) -> Option<DateTime<Utc>> {
        self.run_start
    }

    /// Planned stop time (`run_start + duration`).
    #[must_use]
    pub const fn run_stop(&self) -> Option<DateTime<Utc>> {
        self.run_stop
    }

    /// Time at which the work loop returned `Stop`.
    #[must_use]
    pub const fn stopped_at(&self) -> Option<DateTime<Utc>> {
        self.stopped_at
    }

    /// One work-loop iteration against `clock`.
    ///
    /// While `now < stop`, sleeps for `min(tick, remaining)` and returns
    /// `Continue`; otherwise records the stop time and returns `Stop`.
    pub fn iterate(&mut self, clock: &dyn crate::util::clock::Clock) -> WorkLoopStatus {
        let now = clock.now();
        let Some(stop) = self.run_stop else {
            self.stopped_at = Some(now);
            return WorkLoopStatus::Stop;
        };
        if now < stop {
            let remaining = elapsed_between(now, stop);
            clock.sleep(remaining.min(self.tick));
            WorkLoopStatus::Continue
        } else {
            self.stopped_at = Some(now);
            WorkLoopStatus::Stop
        }
    }

    /// Record start and planned stop from `now`.
    pub fn prepare(&mut self, now: DateTime<Utc>) {
        self.run_start = Some(now);
        self.run_stop = self.duration.map(|d| add_duration(now, d));
        self.stopped_at = None;
    }
}

impl UseCaseBehavior for LockUseCase {
    fn type_id(&self) -> &'static str {
        LOCK_TYPE_ID
    }

    fn at_initialize(&mut self, props: &UseCaseProperties) -> Result<(), SchedulerError> {
        let mut staged = self.clone();
        if let Some(tick) = property_duration(props, "tick")? {
            staged.set_tick(tick)?;
        }
        if let Some(duration) = property_duration(props, "duration")? {
            staged.set_duration(duration)?;
        }
        if staged.duration.is_none() {
            return Err(SchedulerError::InvalidConfig(
                "lock use case requires a 'duration'".into(),
            ));
        }
        *self = staged;
        Ok(())
    }

    fn at_reset(&mut self) {
        *self = Self::new();
    }

    fn build_time_constraints(&self) -> Result<TimeConstraints, SchedulerError> {
        let mut constraints = TimeConstraints::new();
        if let Some(d) = self.duration {
            constraints.add_constraint(
                RunStage::FunctionalWorkRunning,
                DurationInterval::exactly(d),
            )?;
        }
        Ok(constraints)
    }

    fn at_run_prepare(&mut self, ctx: &mut RunContext<'_>) -> Result<(), SchedulerError> {
        self.prepare(ctx.clock.now());
        tracing::debug!(
            session_id = ctx.session,
            start = ?self.run_start,
            stop = ?self.run_stop,
            "lock prepared"
        );
        Ok(())
    }

    fn at_work_iteration(
        &mut self,
        ctx: &mut RunContext<'_>,
    ) -> Result<WorkLoopStatus, SchedulerError> {
        Ok(self.iterate(ctx.clock))
    }
}
