//! Configuration models for the agenda and the use cases.

pub mod agenda;
pub mod use_case;

pub use agenda::AgendaConfig;
pub use use_case::{CompositionDescription, Scheduling, UseCaseConfig};
