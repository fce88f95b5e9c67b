//! Error types for scheduler operations.

use thiserror::Error;

use crate::core::running::RunStage;
use crate::core::session::SessionId;

/// Errors produced by scheduler components.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Lifecycle call on an object that is already initialized.
    #[error("{0} is already initialized")]
    AlreadyInitialized(String),
    /// Lifecycle call on an object that is not initialized.
    #[error("{0} is not initialized")]
    NotInitialized(String),
    /// Use case initialized without a mother session.
    #[error("use case '{0}' has no mother session")]
    MissingMotherSession(String),
    /// Session run requested while a run is in progress.
    #[error("session {0} is already running")]
    AlreadyRunning(SessionId),
    /// Session initialized without a use case.
    #[error("session {0} has no use case")]
    NoUseCase(SessionId),
    /// Session identifier is invalid or unknown in the tree.
    #[error("invalid session id {0}")]
    InvalidSession(SessionId),
    /// A child session with this name already exists.
    #[error("session {parent} already has a child named '{name}'")]
    DuplicateSession {
        /// Parent session.
        parent: SessionId,
        /// Offending child name.
        name: String,
    },
    /// Duration text could not be parsed.
    #[error("invalid duration '{input}': {reason}")]
    InvalidDuration {
        /// Raw input.
        input: String,
        /// Parser diagnostic.
        reason: String,
    },
    /// Time constraints only apply to the five running stages.
    #[error("stage {0} does not support time constraints")]
    UnsupportedConstraintStage(RunStage),
    /// A constraint already exists for this stage.
    #[error("stage {0} already has a time constraint")]
    DuplicateConstraint(RunStage),
    /// No constraint is registered for this stage.
    #[error("stage {0} has no time constraint")]
    MissingConstraint(RunStage),
    /// Duration interval with min greater than max.
    #[error("invalid duration interval: {0}")]
    InvalidDurationInterval(String),
    /// Elapsed stage duration outside its window.
    #[error("stage {stage} violated its time constraint: {detail}")]
    TimeConstraintViolated {
        /// Stage being checked.
        stage: RunStage,
        /// Elapsed vs. window.
        detail: String,
    },
    /// Reservation id already present in the agenda.
    #[error("reservation {0} already exists")]
    DuplicateReservation(i32),
    /// Reservation id not present in the agenda.
    #[error("reservation {0} does not exist")]
    UnknownReservation(i32),
    /// Resource id or name not known to the catalog.
    #[error("unknown resource {0}")]
    UnknownResource(String),
    /// Role name not known to the catalog.
    #[error("unknown role '{0}'")]
    UnknownRole(String),
    /// Use-case type identifier not registered.
    #[error("unknown use case type '{0}'")]
    UnknownUseCaseType(String),
    /// Cardinality lookup for a resource without an entry.
    #[error("no cardinality for resource {0}")]
    MissingCardinality(i32),
    /// Limited/unlimited nature of a request does not match the catalog.
    #[error("cardinality mismatch for resource {id}: {detail}")]
    CardinalityMismatch {
        /// Resource id.
        id: i32,
        /// Explanation.
        detail: String,
    },
    /// Requested token count exceeds the resource capacity.
    #[error("request of {requested} tokens exceeds capacity {capacity} of resource {id}")]
    CapacityExceeded {
        /// Resource id.
        id: i32,
        /// Requested count.
        requested: usize,
        /// Declared capacity.
        capacity: usize,
    },
    /// Not enough tokens left in the granting pool.
    #[error("resource {id} exhausted: {requested} requested, {available} available")]
    ResourceExhausted {
        /// Resource id.
        id: i32,
        /// Requested count.
        requested: usize,
        /// Tokens still available.
        available: usize,
    },
    /// A daughter session of a composite use case ended in error.
    #[error("daughter '{name}' failed: {message}")]
    DaughterFailed {
        /// Daughter name.
        name: String,
        /// Diagnostic of the daughter run.
        message: String,
    },
    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

impl SchedulerError {
    /// Resource id responsible for an admission or cardinality failure.
    #[must_use]
    pub fn resource_id(&self) -> Option<i32> {
        match self {
            Self::UnknownResource(name) => name.parse().ok(),
            Self::MissingCardinality(id)
            | Self::CardinalityMismatch { id, .. }
            | Self::CapacityExceeded { id, .. }
            | Self::ResourceExhausted { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Short classification used in run reports.
    #[must_use]
    pub const fn class(&self) -> &'static str {
        match self {
            Self::AlreadyInitialized(_)
            | Self::NotInitialized(_)
            | Self::MissingMotherSession(_)
            | Self::AlreadyRunning(_)
            | Self::NoUseCase(_)
            | Self::InvalidSession(_)
            | Self::DuplicateSession { .. } => "lifecycle",
            Self::CapacityExceeded { .. }
            | Self::ResourceExhausted { .. }
            | Self::TimeConstraintViolated { .. }
            | Self::DaughterFailed { .. } => "policy",
            Self::Backend(_) => "io",
            _ => "configuration",
        }
    }
}

impl From<std::io::Error> for SchedulerError {
    fn from(err: std::io::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
