//! Core scheduling abstractions: run stages, use cases, resource accounting,
//! the session tree, and the agenda.

pub mod error;
pub mod running;
pub mod time_constraints;
pub mod catalog;
pub mod cardinality;
pub mod resource_pool;
pub mod use_case;
pub mod session;
pub mod reservation;
pub mod audit;
pub mod cancel;
#[cfg(not(target_arch = "wasm32"))]
pub mod agenda;

pub use error::{AppResult, SchedulerError};
pub use running::{
    RunControl, RunDepth, RunOutcome, RunReport, RunStage, RunStageCompletion, RunTermination,
    StageTimeStatistics, WorkLoopStatus,
};
pub use time_constraints::{DurationInterval, TimeConstraints};
pub use catalog::{ResourceCatalog, ResourceInfo, ResourceSetFlag, RoleDefinition, TokenCapacity};
pub use cardinality::{
    CardinalityConfig, CardinalityRequest, DisplayRequest, ResourceCardinality, UNLIMITED_TOKENS,
};
pub use resource_pool::{CardinalityProfile, ResourcePool, SharedResourcePool};
pub use use_case::{
    CompositeUseCase, DurationHints, LockUseCase, RunContext, UseCase, UseCaseBehavior,
    UseCaseFactory, UseCaseProperties, UseCaseRegistry,
};
pub use session::{Session, SessionId, SessionTree, ROOT_SESSION_ID};
pub use reservation::{Reservation, ReservationStatus, TimePeriod};
pub use audit::{build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};
pub use cancel::CancellationToken;
#[cfg(not(target_arch = "wasm32"))]
pub use agenda::{Agenda, AgendaEvent};
