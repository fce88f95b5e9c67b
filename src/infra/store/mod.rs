//! Reservation store backends.

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlStore;
pub use memory::InMemoryStore;

use crate::core::{Reservation, SchedulerError};

/// Persistence for the agenda's reservations.
///
/// `store` replaces the whole persisted set.
pub trait ReservationStore: Send {
    /// Load every persisted reservation.
    ///
    /// # Errors
    ///
    /// Backend failure or an unreadable record.
    fn load(&mut self) -> Result<Vec<Reservation>, SchedulerError>;

    /// Persist `reservations`, replacing what was stored before.
    ///
    /// # Errors
    ///
    /// Backend failure.
    fn store(&mut self, reservations: &[Reservation]) -> Result<(), SchedulerError>;
}
