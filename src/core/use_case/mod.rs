//! Use-case lifecycle.
//!
//! A [`UseCase`] carries the state common to every use case (name, mother
//! session, duration hints, lazily built time constraints, run control and
//! run report) and delegates variant behaviour to a boxed
//! [`UseCaseBehavior`]. Variants are created by type identifier through the
//! [`registry::UseCaseRegistry`].
//!
//! Lifecycle: `uninitialized -> initialize -> (up, work, down)* -> reset`.
//! Calling order of `up`/`work`/`down` is enforced by the session driving
//! the use case, not here.

pub mod composite;
pub mod lock;
pub mod registry;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::config::CompositionDescription;
use crate::core::error::SchedulerError;
use crate::core::running::{RunControl, RunDepth, RunReport, RunStage, WorkLoopStatus};
use crate::core::session::{SessionId, SessionTree};
use crate::core::time_constraints::{DurationInterval, TimeConstraints};
use crate::util::clock::Clock;
use crate::util::duration::parse_duration;

pub use composite::CompositeUseCase;
pub use lock::LockUseCase;
pub use registry::{UseCaseFactory, UseCaseRegistry};

/// Resolved key/value configuration of a use case.
pub type UseCaseProperties = serde_json::Map<String, Value>;

/// Property key of the preparation maximum duration.
pub const PREPARATION_MAX_DURATION_KEY: &str = "preparation_max_duration";
/// Property key of the functional up maximum duration.
pub const UP_MAX_DURATION_KEY: &str = "up_max_duration";
/// Property key of the work minimum duration.
pub const WORK_MIN_DURATION_KEY: &str = "work_min_duration";
/// Property key of the work maximum duration.
pub const WORK_MAX_DURATION_KEY: &str = "work_max_duration";
/// Property key of the functional down maximum duration.
pub const DOWN_MAX_DURATION_KEY: &str = "down_max_duration";
/// Property key of the termination maximum duration.
pub const TERMINATION_MAX_DURATION_KEY: &str = "termination_max_duration";

/// Read an optional string property.
///
/// # Errors
///
/// [`SchedulerError::InvalidConfig`] when the value is not a string.
pub fn property_str<'a>(
    props: &'a UseCaseProperties,
    key: &str,
) -> Result<Option<&'a str>, SchedulerError> {
    match props.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(SchedulerError::InvalidConfig(format!(
            "property '{key}' must be a string, got {other}"
        ))),
    }
}

/// Read an optional duration property (`"5s"`, `"00:00:05"`, or seconds as a number).
///
/// # Errors
///
/// [`SchedulerError::InvalidDuration`] for unparsable values.
pub fn property_duration(
    props: &UseCaseProperties,
    key: &str,
) -> Result<Option<Duration>, SchedulerError> {
    match props.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => parse_duration(s).map(Some),
        Some(Value::Number(n)) => n
            .as_f64()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .map(Some)
            .ok_or_else(|| SchedulerError::InvalidDuration {
                input: n.to_string(),
                reason: "negative or out of range".into(),
            }),
        Some(other) => Err(SchedulerError::InvalidDuration {
            input: other.to_string(),
            reason: "expected a string or a number of seconds".into(),
        }),
    }
}

/// Optional per-phase duration hints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DurationHints {
    /// Upper bound of system preparation.
    pub preparation_max: Option<Duration>,
    /// Upper bound of functional up.
    pub up_max: Option<Duration>,
    /// Lower bound of the work loop.
    pub work_min: Option<Duration>,
    /// Upper bound of the work loop.
    pub work_max: Option<Duration>,
    /// Upper bound of functional down.
    pub down_max: Option<Duration>,
    /// Upper bound of system termination.
    pub termination_max: Option<Duration>,
}

impl DurationHints {
    /// Read the hints from properties, keeping current values for absent keys.
    ///
    /// # Errors
    ///
    /// Unparsable durations or `work_min > work_max`.
    pub fn configure(&mut self, props: &UseCaseProperties) -> Result<(), SchedulerError> {
        let mut hints = *self;
        let slots = [
            (PREPARATION_MAX_DURATION_KEY, &mut hints.preparation_max),
            (UP_MAX_DURATION_KEY, &mut hints.up_max),
            (WORK_MIN_DURATION_KEY, &mut hints.work_min),
            (WORK_MAX_DURATION_KEY, &mut hints.work_max),
            (DOWN_MAX_DURATION_KEY, &mut hints.down_max),
            (TERMINATION_MAX_DURATION_KEY, &mut hints.termination_max),
        ];
        for (key, slot) in slots {
            if let Some(d) = property_duration(props, key)? {
                *slot = Some(d);
            }
        }
        hints.work_interval().validate()?;
        *self = hints;
        Ok(())
    }

    /// Work window built from `work_min`/`work_max`.
    #[must_use]
    pub const fn work_interval(&self) -> DurationInterval {
        DurationInterval {
            min: self.work_min,
            max: self.work_max,
        }
    }

    /// Shortest expected run: bounded stage overheads plus the work minimum.
    #[must_use]
    pub fn total_min_duration(&self) -> Duration {
        [
            self.preparation_max,
            self.up_max,
            self.work_min,
            self.down_max,
            self.termination_max,
        ]
        .into_iter()
        .flatten()
        .sum()
    }

    /// Longest expected run, `None` when the work loop is open-ended.
    #[must_use]
    pub fn total_max_duration(&self) -> Option<Duration> {
        let work_max = self.work_max?;
        Some(
            [
                self.preparation_max,
                self.up_max,
                self.down_max,
                self.termination_max,
            ]
            .into_iter()
            .flatten()
            .sum::<Duration>()
                + work_max,
        )
    }

    fn constraints(&self) -> Vec<(RunStage, DurationInterval)> {
        let mut out = Vec::new();
        if let Some(max) = self.preparation_max {
            out.push((RunStage::SystemPreparing, DurationInterval::at_most(max)));
        }
        if let Some(max) = self.up_max {
            out.push((RunStage::FunctionalUpRunning, DurationInterval::at_most(max)));
        }
        let work = self.work_interval();
        if !work.is_unbounded() {
            out.push((RunStage::FunctionalWorkRunning, work));
        }
        if let Some(max) = self.down_max {
            out.push((RunStage::FunctionalDownRunning, DurationInterval::at_most(max)));
        }
        if let Some(max) = self.termination_max {
            out.push((RunStage::SystemTerminating, DurationInterval::at_most(max)));
        }
        out
    }
}

/// Environment handed to the stage hooks.
pub struct RunContext<'a> {
    /// Session executing the use case.
    pub session: SessionId,
    /// Run-state record of the use case.
    pub run: &'a RunControl,
    /// Time source.
    pub clock: &'a dyn Clock,
    /// Session tree, for use cases that drive child sessions.
    pub tree: &'a mut SessionTree,
}

/// Variant-specific behaviour of a use case.
///
/// Every hook has a no-op default except [`UseCaseBehavior::type_id`].
pub trait UseCaseBehavior: Send {
    /// Registry type identifier.
    fn type_id(&self) -> &'static str;

    /// Variant-specific configuration.
    ///
    /// # Errors
    ///
    /// Invalid or missing configuration.
    fn at_initialize(&mut self, _props: &UseCaseProperties) -> Result<(), SchedulerError> {
        Ok(())
    }

    /// Clear variant state.
    fn at_reset(&mut self) {}

    /// Constraints contributed by the variant.
    ///
    /// # Errors
    ///
    /// Inconsistent constraint definitions.
    fn build_time_constraints(&self) -> Result<TimeConstraints, SchedulerError> {
        Ok(TimeConstraints::new())
    }

    /// Daughter use cases to instantiate as child sessions.
    fn composition(&self) -> Option<&CompositionDescription> {
        None
    }

    /// System preparation.
    ///
    /// # Errors
    ///
    /// Stage failure.
    fn at_run_prepare(&mut self, _ctx: &mut RunContext<'_>) -> Result<(), SchedulerError> {
        Ok(())
    }

    /// Functional up.
    ///
    /// # Errors
    ///
    /// Stage failure.
    fn at_up(&mut self, _ctx: &mut RunContext<'_>) -> Result<(), SchedulerError> {
        Ok(())
    }

    /// One cooperative work-loop iteration; must never block longer than a tick.
    ///
    /// # Errors
    ///
    /// Stage failure.
    fn at_work_iteration(
        &mut self,
        _ctx: &mut RunContext<'_>,
    ) -> Result<WorkLoopStatus, SchedulerError> {
        Ok(WorkLoopStatus::Stop)
    }

    /// Functional down.
    ///
    /// # Errors
    ///
    /// Stage failure.
    fn at_down(&mut self, _ctx: &mut RunContext<'_>) -> Result<(), SchedulerError> {
        Ok(())
    }

    /// System termination.
    ///
    /// # Errors
    ///
    /// Stage failure.
    fn at_run_terminate(&mut self, _ctx: &mut RunContext<'_>) -> Result<(), SchedulerError> {
        Ok(())
    }
}

/// A use case: common lifecycle state plus a behaviour variant.
pub struct UseCase {
    name: String,
    description: String,
    initialized: bool,
    mother_session: Option<SessionId>,
    hints: DurationHints,
    time_constraints: Option<TimeConstraints>,
    run_control: Arc<RunControl>,
    report: RunReport,
    behavior: Box<dyn UseCaseBehavior>,
}

impl UseCase {
    /// New uninitialized use case with a full (`Work`) run depth.
    pub fn new(name: impl Into<String>, behavior: Box<dyn UseCaseBehavior>) -> Self {
        Self::with_depth(name, behavior, RunDepth::default())
    }

    /// New uninitialized use case with an explicit run depth.
    pub fn with_depth(
        name: impl Into<String>,
        behavior: Box<dyn UseCaseBehavior>,
        depth: RunDepth,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            initialized: false,
            mother_session: None,
            hints: DurationHints::default(),
            time_constraints: None,
            run_control: Arc::new(RunControl::new(depth)),
            report: RunReport::default(),
            behavior,
        }
    }

    /// Name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Set the description.
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// Registry type identifier of the behaviour.
    #[must_use]
    pub fn type_id(&self) -> &'static str {
        self.behavior.type_id()
    }

    /// Attach the (non-owning) mother session.
    pub fn set_mother_session(&mut self, session: SessionId) {
        self.mother_session = Some(session);
    }

    /// Mother session, if attached.
    #[must_use]
    pub const fn mother_session(&self) -> Option<SessionId> {
        self.mother_session
    }

    /// Whether `initialize` succeeded and `reset` has not been called since.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Duration hints.
    #[must_use]
    pub const fn hints(&self) -> &DurationHints {
        &self.hints
    }

    /// Replace the duration hints before initialization.
    ///
    /// # Errors
    ///
    /// Already initialized, or `work_min > work_max`.
    pub fn set_hints(&mut self, hints: DurationHints) -> Result<(), SchedulerError> {
        if self.initialized {
            return Err(SchedulerError::AlreadyInitialized(self.label()));
        }
        hints.work_interval().validate()?;
        self.hints = hints;
        Ok(())
    }

    /// Shared handle on the run-state record.
    #[must_use]
    pub fn run_control(&self) -> Arc<RunControl> {
        Arc::clone(&self.run_control)
    }

    /// Report of the last run.
    #[must_use]
    pub const fn report(&self) -> &RunReport {
        &self.report
    }

    /// Mutable report, written by the driving session.
    pub fn report_mut(&mut self) -> &mut RunReport {
        &mut self.report
    }

    /// Daughter use cases, for composite variants.
    #[must_use]
    pub fn composition(&self) -> Option<&CompositionDescription> {
        self.behavior.composition()
    }

    /// Configure and lock the use case.
    ///
    /// # Errors
    ///
    /// Already initialized, no mother session, an unparsable duration, or a
    /// failure of the variant hook. State is unchanged on failure.
    pub fn initialize(&mut self, config: &UseCaseProperties) -> Result<(), SchedulerError> {
        if self.initialized {
            return Err(SchedulerError::AlreadyInitialized(self.label()));
        }
        if self.mother_session.is_none() {
            return Err(SchedulerError::MissingMotherSession(self.name.clone()));
        }
        let mut hints = self.hints;
        hints.configure(config)?;
        self.behavior.at_initialize(config)?;
        self.hints = hints;
        self.time_constraints = None;
        self.run_control.set_run_stage(RunStage::Ready);
        self.initialized = true;
        tracing::debug!(use_case = %self.name, type_id = self.type_id(), "use case initialized");
        Ok(())
    }

    /// Tear down: variant hook first, then common state.
    ///
    /// # Errors
    ///
    /// Not initialized.
    pub fn reset(&mut self) -> Result<(), SchedulerError> {
        if !self.initialized {
            return Err(SchedulerError::NotInitialized(self.label()));
        }
        self.behavior.at_reset();
        self.hints = DurationHints::default();
        self.time_constraints = None;
        self.mother_session = None;
        self.report.clear();
        self.run_control.set_run_stage(RunStage::Undefined);
        self.initialized = false;
        tracing::debug!(use_case = %self.name, "use case reset");
        Ok(())
    }

    /// Time constraints, built on first access from the variant and the hints.
    ///
    /// Hint-derived windows only fill stages the variant left open.
    ///
    /// # Errors
    ///
    /// Inconsistent constraints from the variant.
    pub fn time_constraints(&mut self) -> Result<&TimeConstraints, SchedulerError> {
        if self.time_constraints.is_none() {
            let mut constraints = self.behavior.build_time_constraints()?;
            for (stage, interval) in self.hints.constraints() {
                if !constraints.has_constraint(stage) {
                    constraints.add_constraint(stage, interval)?;
                }
            }
            self.time_constraints = Some(constraints);
        }
        self.time_constraints
            .as_ref()
            .ok_or_else(|| SchedulerError::NotInitialized(self.label()))
    }

    /// Forward to the preparation hook.
    ///
    /// # Errors
    ///
    /// Hook failure.
    pub fn run_prepare(&mut self, ctx: &mut RunContext<'_>) -> Result<(), SchedulerError> {
        self.behavior.at_run_prepare(ctx)
    }

    /// Forward to the up hook.
    ///
    /// # Errors
    ///
    /// Hook failure.
    pub fn up(&mut self, ctx: &mut RunContext<'_>) -> Result<(), SchedulerError> {
        self.behavior.at_up(ctx)
    }

    /// Forward one work-loop iteration.
    ///
    /// # Errors
    ///
    /// Hook failure.
    pub fn work(&mut self, ctx: &mut RunContext<'_>) -> Result<WorkLoopStatus, SchedulerError> {
        self.behavior.at_work_iteration(ctx)
    }

    /// Forward to the down hook.
    ///
    /// # Errors
    ///
    /// Hook failure.
    pub fn down(&mut self, ctx: &mut RunContext<'_>) -> Result<(), SchedulerError> {
        self.behavior.at_down(ctx)
    }

    /// Forward to the termination hook.
    ///
    /// # Errors
    ///
    /// Hook failure.
    pub fn run_terminate(&mut self, ctx: &mut RunContext<'_>) -> Result<(), SchedulerError> {
        self.behavior.at_run_terminate(ctx)
    }

    fn label(&self) -> String {
        format!("use case '{}'", self.name)
    }
}

impl std::fmt::Debug for UseCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UseCase")
            .field("name", &self.name)
            .field("type_id", &self.type_id())
            .field("initialized", &self.initialized)
            .field("mother_session", &self.mother_session)
            .field("stage", &self.run_control.run_stage())
            .finish_non_exhaustive()
    }
}
