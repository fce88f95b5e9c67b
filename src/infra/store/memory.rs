//! In-memory reservation store.

use std::sync::Arc;

use parking_lot::Mutex;

use super::ReservationStore;
use crate::core::{Reservation, SchedulerError};

/// Store keeping reservations in a shared vector.
///
/// Clones share the same contents, so a test can keep a handle and inspect
/// what the agenda persisted.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    records: Arc<Mutex<Vec<Reservation>>>,
}

impl InMemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with `reservations`.
    #[must_use]
    pub fn with_reservations(reservations: Vec<Reservation>) -> Self {
        Self {
            records: Arc::new(Mutex::new(reservations)),
        }
    }

    /// Snapshot of the stored reservations.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Reservation> {
        self.records.lock().clone()
    }
}

impl ReservationStore for InMemoryStore {
    fn load(&mut self) -> Result<Vec<Reservation>, SchedulerError> {
        Ok(self.records.lock().clone())
    }

    fn store(&mut self, reservations: &[Reservation]) -> Result<(), SchedulerError> {
        *self.records.lock() = reservations.to_vec();
        Ok(())
    }
}
