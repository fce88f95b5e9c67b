//! Run-stage state machine and the shared run-control record.
//!
//! A [`RunControl`] is owned by one use-case execution and shared (through an
//! `Arc`) with controlling threads. Its scalars are independent atomics: the
//! stage is written only by the executing thread, while the stop flag and
//! the work-loop counter may be polled from anywhere without locking.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stages of a use-case run, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RunStage {
    /// No run has been prepared.
    Undefined = 0,
    /// Ready to run.
    Ready = 1,
    /// System preparation in progress.
    SystemPreparing = 2,
    /// System preparation finished.
    SystemPrepared = 3,
    /// Functional up in progress.
    FunctionalUpRunning = 4,
    /// Functional up finished.
    FunctionalUpDone = 5,
    /// Functional work loop in progress.
    FunctionalWorkRunning = 6,
    /// Functional work loop finished.
    FunctionalWorkDone = 7,
    /// Functional down in progress.
    FunctionalDownRunning = 8,
    /// Functional down finished.
    FunctionalDownDone = 9,
    /// System termination in progress.
    SystemTerminating = 10,
    /// System termination finished.
    SystemTerminated = 11,
}

impl RunStage {
    /// All stages in canonical order.
    pub const ALL: [Self; 12] = [
        Self::Undefined,
        Self::Ready,
        Self::SystemPreparing,
        Self::SystemPrepared,
        Self::FunctionalUpRunning,
        Self::FunctionalUpDone,
        Self::FunctionalWorkRunning,
        Self::FunctionalWorkDone,
        Self::FunctionalDownRunning,
        Self::FunctionalDownDone,
        Self::SystemTerminating,
        Self::SystemTerminated,
    ];

    /// Stages that accept a time constraint.
    pub const CONSTRAINABLE: [Self; 5] = [
        Self::SystemPreparing,
        Self::FunctionalUpRunning,
        Self::FunctionalWorkRunning,
        Self::FunctionalDownRunning,
        Self::SystemTerminating,
    ];

    /// Stable text label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Ready => "ready",
            Self::SystemPreparing => "system_preparing",
            Self::SystemPrepared => "system_prepared",
            Self::FunctionalUpRunning => "functional_up_running",
            Self::FunctionalUpDone => "functional_up_done",
            Self::FunctionalWorkRunning => "functional_work_running",
            Self::FunctionalWorkDone => "functional_work_done",
            Self::FunctionalDownRunning => "functional_down_running",
            Self::FunctionalDownDone => "functional_down_done",
            Self::SystemTerminating => "system_terminating",
            Self::SystemTerminated => "system_terminated",
        }
    }

    /// Whether a time constraint may be attached to this stage.
    #[must_use]
    pub const fn supports_constraint(self) -> bool {
        matches!(
            self,
            Self::SystemPreparing
                | Self::FunctionalUpRunning
                | Self::FunctionalWorkRunning
                | Self::FunctionalDownRunning
                | Self::SystemTerminating
        )
    }

    /// The completion stage reached when this running stage ends.
    #[must_use]
    pub const fn done_stage(self) -> Option<Self> {
        match self {
            Self::SystemPreparing => Some(Self::SystemPrepared),
            Self::FunctionalUpRunning => Some(Self::FunctionalUpDone),
            Self::FunctionalWorkRunning => Some(Self::FunctionalWorkDone),
            Self::FunctionalDownRunning => Some(Self::FunctionalDownDone),
            Self::SystemTerminating => Some(Self::SystemTerminated),
            _ => None,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Ready,
            2 => Self::SystemPreparing,
            3 => Self::SystemPrepared,
            4 => Self::FunctionalUpRunning,
            5 => Self::FunctionalUpDone,
            6 => Self::FunctionalWorkRunning,
            7 => Self::FunctionalWorkDone,
            8 => Self::FunctionalDownRunning,
            9 => Self::FunctionalDownDone,
            10 => Self::SystemTerminating,
            11 => Self::SystemTerminated,
            _ => Self::Undefined,
        }
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a stage or a whole run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTermination {
    /// Not terminated yet.
    #[default]
    Undefined,
    /// Completed normally.
    Normal,
    /// Completed with an error.
    Error,
}

/// Caps how far a run proceeds through the stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunDepth {
    /// Nothing is executed.
    None,
    /// System preparation and termination only.
    System,
    /// System stages plus functional up/down, without the work loop.
    Auto,
    /// Full run including the work loop.
    #[default]
    Work,
}

impl RunDepth {
    /// Whether the system preparation/termination stages run.
    #[must_use]
    pub fn runs_system(self) -> bool {
        self >= Self::System
    }

    /// Whether functional up/down run.
    #[must_use]
    pub fn runs_functional(self) -> bool {
        self >= Self::Auto
    }

    /// Whether the work loop runs.
    #[must_use]
    pub fn runs_work(self) -> bool {
        self >= Self::Work
    }
}

/// Result of one work-loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkLoopStatus {
    /// Call the iteration again.
    Continue,
    /// The work stage is complete.
    Stop,
}

/// Shared run-state record.
#[derive(Debug)]
pub struct RunControl {
    depth: RunDepth,
    stage: AtomicU8,
    stop_requested: AtomicBool,
    work_loop_counter: AtomicU64,
}

impl RunControl {
    /// Create a run control with an immutable depth.
    #[must_use]
    pub const fn new(depth: RunDepth) -> Self {
        Self {
            depth,
            stage: AtomicU8::new(RunStage::Undefined as u8),
            stop_requested: AtomicBool::new(false),
            work_loop_counter: AtomicU64::new(0),
        }
    }

    /// Configured run depth.
    #[must_use]
    pub const fn depth(&self) -> RunDepth {
        self.depth
    }

    /// Current stage.
    #[must_use]
    pub fn run_stage(&self) -> RunStage {
        RunStage::from_u8(self.stage.load(Ordering::Acquire))
    }

    /// Move to `stage`. Callers only ever move forward; this is not checked.
    pub fn set_run_stage(&self, stage: RunStage) {
        self.stage.store(stage as u8, Ordering::Release);
    }

    /// Ask the executing thread to stop at its next checkpoint.
    pub fn run_stop_request(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested.
    #[must_use]
    pub fn check_run_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Number of completed work-loop iterations.
    #[must_use]
    pub fn work_loop_counter(&self) -> u64 {
        self.work_loop_counter.load(Ordering::Relaxed)
    }

    /// Count one more work-loop iteration, returning the new total.
    pub fn increment_work_loop_counter(&self) -> u64 {
        self.work_loop_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Start a new run: stage `Ready`, counter cleared.
    ///
    /// A stop requested before the run starts is kept.
    pub fn begin_run(&self) {
        self.work_loop_counter.store(0, Ordering::Relaxed);
        self.set_run_stage(RunStage::Ready);
    }

    /// Drop a pending stop request once a run is over.
    pub fn clear_run_stop_request(&self) {
        self.stop_requested.store(false, Ordering::Release);
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new(RunDepth::default())
    }
}

/// Completion record of one running stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStageCompletion {
    /// Stage that completed.
    pub stage: RunStage,
    /// When it completed.
    pub timestamp: DateTime<Utc>,
    /// How it ended.
    pub termination: RunTermination,
    /// Error classification when `termination` is `Error`.
    pub error_class: Option<String>,
    /// Diagnostic message when `termination` is `Error`.
    pub error_message: Option<String>,
}

impl RunStageCompletion {
    /// Normal completion at `timestamp`.
    #[must_use]
    pub const fn normal(stage: RunStage, timestamp: DateTime<Utc>) -> Self {
        Self {
            stage,
            timestamp,
            termination: RunTermination::Normal,
            error_class: None,
            error_message: None,
        }
    }

    /// Error completion at `timestamp`.
    #[must_use]
    pub fn error(
        stage: RunStage,
        timestamp: DateTime<Utc>,
        class: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            timestamp,
            termination: RunTermination::Error,
            error_class: Some(class.into()),
            error_message: Some(message.into()),
        }
    }

    /// Whether the stage failed.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.termination == RunTermination::Error
    }
}

/// Timing of one running stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimeStatistics {
    /// Stage start.
    pub start: DateTime<Utc>,
    /// Stage stop, once finished.
    pub stop: Option<DateTime<Utc>>,
    /// Work-loop iterations (work stage only).
    pub loop_counter: u64,
}

impl StageTimeStatistics {
    /// Elapsed time, if the stage has finished.
    #[must_use]
    pub fn elapsed(&self) -> Option<std::time::Duration> {
        self.stop
            .map(|stop| crate::util::clock::elapsed_between(self.start, stop))
    }
}

/// Per-stage report of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Completion records keyed by running stage.
    pub completions: BTreeMap<RunStage, RunStageCompletion>,
    /// Timing keyed by running stage.
    pub statistics: BTreeMap<RunStage, StageTimeStatistics>,
}

impl RunReport {
    /// Clear all records.
    pub fn clear(&mut self) {
        self.completions.clear();
        self.statistics.clear();
    }

    /// Mark the start of a running stage.
    pub fn start_stage(&mut self, stage: RunStage, at: DateTime<Utc>) {
        self.statistics.insert(
            stage,
            StageTimeStatistics {
                start: at,
                stop: None,
                loop_counter: 0,
            },
        );
    }

    /// Mark the end of a running stage and store its completion record.
    pub fn finish_stage(&mut self, completion: RunStageCompletion, loop_counter: u64) {
        if let Some(stats) = self.statistics.get_mut(&completion.stage) {
            stats.stop = Some(completion.timestamp);
            stats.loop_counter = loop_counter;
        }
        self.completions.insert(completion.stage, completion);
    }

    /// First failed stage, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&RunStageCompletion> {
        self.completions.values().find(|c| c.is_error())
    }

    /// Stages reported, in canonical order.
    #[must_use]
    pub fn stages(&self) -> Vec<RunStage> {
        self.completions.keys().copied().collect()
    }
}

/// Final classification of a session run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// NORMAL or ERROR.
    pub termination: RunTermination,
    /// Diagnostic on error.
    pub message: Option<String>,
    /// Per-stage report.
    pub report: RunReport,
}

impl RunOutcome {
    /// Whether the run ended normally.
    #[must_use]
    pub fn is_normal(&self) -> bool {
        self.termination == RunTermination::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_is_canonical() {
        for pair in RunStage::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        for stage in RunStage::ALL {
            assert_eq!(RunStage::from_u8(stage as u8), stage);
        }
    }

    #[test]
    fn test_constrainable_stages() {
        let supported: Vec<_> = RunStage::ALL
            .into_iter()
            .filter(|s| s.supports_constraint())
            .collect();
        assert_eq!(supported, RunStage::CONSTRAINABLE.to_vec());
        assert!(!RunStage::Ready.supports_constraint());
    }

    #[test]
    fn test_run_control_flags() {
        let rc = RunControl::new(RunDepth::Auto);
        assert_eq!(rc.run_stage(), RunStage::Undefined);
        assert!(!rc.check_run_stop_requested());
        rc.run_stop_request();
        assert!(rc.check_run_stop_requested());
        assert_eq!(rc.increment_work_loop_counter(), 1);
        assert_eq!(rc.work_loop_counter(), 1);
        rc.begin_run();
        assert_eq!(rc.run_stage(), RunStage::Ready);
        assert!(rc.check_run_stop_requested());
        assert_eq!(rc.work_loop_counter(), 0);
        rc.clear_run_stop_request();
        assert!(!rc.check_run_stop_requested());
        assert_eq!(rc.depth(), RunDepth::Auto);
    }

    #[test]
    fn test_run_depth_caps() {
        assert!(!RunDepth::None.runs_system());
        assert!(RunDepth::System.runs_system());
        assert!(!RunDepth::System.runs_functional());
        assert!(RunDepth::Auto.runs_functional());
        assert!(!RunDepth::Auto.runs_work());
        assert!(RunDepth::Work.runs_work());
    }
}
