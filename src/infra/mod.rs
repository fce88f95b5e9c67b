//! Infrastructure adapters: resource catalog and reservation stores.

pub mod catalog;
pub mod store;

pub use catalog::InMemoryCatalog;
pub use store::{InMemoryStore, JsonlStore, ReservationStore};
