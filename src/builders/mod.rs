//! Builders wiring agendas and session trees from configuration.

#[cfg(not(target_arch = "wasm32"))]
pub mod agenda_builder;

#[cfg(not(target_arch = "wasm32"))]
pub use agenda_builder::{build_agenda, AgendaBuilder};
