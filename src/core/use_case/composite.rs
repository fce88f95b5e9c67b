//! Composite use case: drives daughter sessions serially, in parallel, or repeatedly.

use crate::config::{CompositionDescription, Scheduling};
use crate::core::error::SchedulerError;
use crate::core::running::{RunOutcome, WorkLoopStatus};
use crate::core::session::SessionId;
use crate::core::use_case::{RunContext, UseCaseBehavior, UseCaseProperties};

/// Registry type identifier.
pub const COMPOSITE_TYPE_ID: &str = "composite";

/// Runs the daughters described by its composition as child sessions.
///
/// Daughter sessions are created and granted their resources by the session
/// tree when the composite's own session initializes. Each work-loop
/// iteration runs one pass over the daughters; `Repeat(n)` makes `n` passes.
#[derive(Debug, Clone)]
pub struct CompositeUseCase {
    composition: CompositionDescription,
    passes: usize,
}

impl CompositeUseCase {
    /// Composite over `composition`.
    #[must_use]
    pub const fn new(composition: CompositionDescription) -> Self {
        Self {
            composition,
            passes: 0,
        }
    }

    /// Passes completed during the current run.
    #[must_use]
    pub const fn passes(&self) -> usize {
        self.passes
    }

    fn daughter_ids(&self, ctx: &RunContext<'_>) -> Result<Vec<(String, SessionId)>, SchedulerError> {
        self.composition
            .daughter_names()
            .into_iter()
            .map(|name| {
                ctx.tree
                    .child_id(ctx.session, name)
                    .map(|id| (name.to_string(), id))
                    .ok_or_else(|| {
                        SchedulerError::NotInitialized(format!("daughter session '{name}'"))
                    })
            })
            .collect()
    }

    fn run_serial(
        ctx: &mut RunContext<'_>,
        daughters: &[(String, SessionId)],
    ) -> Result<(), SchedulerError> {
        for (name, id) in daughters {
            if ctx.run.check_run_stop_requested() {
                tracing::info!(session_id = ctx.session, daughter = %name, "stop requested, skipping remaining daughters");
                break;
            }
            let outcome = ctx.tree.run(*id)?;
            check_outcome(name, &outcome)?;
        }
        Ok(())
    }

    fn run_parallel(
        ctx: &mut RunContext<'_>,
        daughters: &[(String, SessionId)],
    ) -> Result<(), SchedulerError> {
        if ctx.run.check_run_stop_requested() {
            return Ok(());
        }
        let ids: Vec<SessionId> = daughters.iter().map(|(_, id)| *id).collect();
        let outcomes = ctx.tree.run_parallel(&ids)?;
        for ((name, _), outcome) in daughters.iter().zip(outcomes.iter()) {
            check_outcome(name, outcome)?;
        }
        Ok(())
    }
}

fn check_outcome(name: &str, outcome: &RunOutcome) -> Result<(), SchedulerError> {
    if outcome.is_normal() {
        Ok(())
    } else {
        Err(SchedulerError::DaughterFailed {
            name: name.to_string(),
            message: outcome.message.clone().unwrap_or_default(),
        })
    }
}

impl UseCaseBehavior for CompositeUseCase {
    fn type_id(&self) -> &'static str {
        COMPOSITE_TYPE_ID
    }

    fn at_initialize(&mut self, _props: &UseCaseProperties) -> Result<(), SchedulerError> {
        self.composition
            .validate()
            .map_err(SchedulerError::InvalidConfig)?;
        self.passes = 0;
        Ok(())
    }

    fn at_reset(&mut self) {
        self.passes = 0;
    }

    fn composition(&self) -> Option<&CompositionDescription> {
        Some(&self.composition)
    }

    fn at_run_prepare(&mut self, _ctx: &mut RunContext<'_>) -> Result<(), SchedulerError> {
        self.passes = 0;
        Ok(())
    }

    fn at_work_iteration(
        &mut self,
        ctx: &mut RunContext<'_>,
    ) -> Result<WorkLoopStatus, SchedulerError> {
        let daughters = self.daughter_ids(ctx)?;
        match self.composition.scheduling {
            Scheduling::Serial | Scheduling::Repeat(_) => Self::run_serial(ctx, &daughters)?,
            Scheduling::Parallel => Self::run_parallel(ctx, &daughters)?,
        }
        self.passes += 1;
        tracing::debug!(session_id = ctx.session, passes = self.passes, "composite pass done");
        match self.composition.scheduling {
            Scheduling::Repeat(n) if self.passes < n => Ok(WorkLoopStatus::Continue),
            _ => Ok(WorkLoopStatus::Stop),
        }
    }
}
