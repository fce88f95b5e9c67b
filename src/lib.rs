//! # Session Agenda
//!
//! A resource-aware session scheduler for experiment control.
//!
//! Operators book time on shared instruments through *reservations*. At the
//! reserved time the agenda turns each reservation into a *session*: a node
//! of a session tree that owns one *use case* (an automated or
//! operator-driven control procedure) and two resource pools carved out of
//! its parent's tokens. The use case is then driven through a fixed run-stage
//! state machine while its elapsed stage durations are checked against time
//! constraints.
//!
//! ## Key Features
//!
//! - **Run-stage state machine**: prepare, up, work, down, terminate, with
//!   lock-free run-control scalars readable from any thread
//! - **Time constraints**: min/max windows per stage, from the use case or
//!   from configured duration hints
//! - **Token accounting**: limited and unlimited resources, role-based
//!   cardinality requests, all-or-nothing grants from parent to daughter
//! - **Pluggable use cases**: `lock` (hold resources for a duration) and
//!   `composite` (serial, parallel, or repeated daughter use cases), plus
//!   custom types registered by identifier
//! - **Agenda**: reservation calendar, time-period queries, background
//!   scheduler thread, stop file, persistence with purge, audit, and events
//!
//! ## Running a session by hand
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use session_agenda::config::UseCaseConfig;
//! use session_agenda::core::{
//!     CardinalityProfile, SessionTree, TokenCapacity, UseCaseRegistry, ROOT_SESSION_ID,
//! };
//! use session_agenda::infra::InMemoryCatalog;
//! use session_agenda::util::system_clock;
//!
//! let catalog = InMemoryCatalog::new().add_resource(1, "valve", TokenCapacity::Limited(1))?;
//! let mut tree = SessionTree::new(
//!     Arc::new(catalog),
//!     Arc::new(UseCaseRegistry::with_defaults()),
//!     system_clock(),
//!     CardinalityProfile::All,
//! )?;
//! let config = UseCaseConfig::new("hold", "lock").with_property("duration", "5s");
//! let id = tree.create_use_case_session(ROOT_SESSION_ID, &config)?;
//! tree.initialize(id)?;
//! let outcome = tree.run(id)?;
//! assert!(outcome.is_normal());
//! tree.reset(id)?;
//! ```
//!
//! ## Running an agenda
//!
//! ```rust,ignore
//! use session_agenda::builders::AgendaBuilder;
//! use session_agenda::config::AgendaConfig;
//!
//! let agenda = AgendaBuilder::new(AgendaConfig::from_env()?, Arc::new(catalog)).build()?;
//! agenda.add_reservation(reservation)?;
//! agenda.start()?;
//! // ...
//! agenda.stop()?;
//! ```
//!
//! For complete scenarios, see `tests/agenda_test.rs` and
//! `tests/session_tree_test.rs`.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions and resource accounting.
pub mod core;
/// Configuration models for the agenda and use cases.
pub mod config;
/// Builders to construct scheduler components from configuration.
pub mod builders;
/// Infrastructure adapters for the catalog and reservation stores.
pub mod infra;
/// Shared utilities.
pub mod util;
