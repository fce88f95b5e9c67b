//! Builder to construct an [`Agenda`] from configuration.

use std::sync::Arc;

use crate::config::AgendaConfig;
use crate::core::{
    Agenda, AuditSink, CancellationToken, InMemoryAuditSink, ResourceCatalog, SchedulerError,
    UseCaseRegistry,
};
use crate::infra::store::{JsonlStore, ReservationStore};
use crate::util::clock::{system_clock, Clock};

/// Collects the collaborators of an agenda.
///
/// Defaults: built-in use-case types, the system clock, a JSON-lines store
/// when `reservations_store` is configured, and an in-memory audit sink
/// bounded by `audit_capacity`.
pub struct AgendaBuilder {
    config: AgendaConfig,
    catalog: Arc<dyn ResourceCatalog>,
    registry: Option<Arc<UseCaseRegistry>>,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Box<dyn ReservationStore>>,
    audit: Option<Box<dyn AuditSink>>,
    token: Option<CancellationToken>,
}

impl AgendaBuilder {
    /// Builder over `catalog` with `config`.
    #[must_use]
    pub fn new(config: AgendaConfig, catalog: Arc<dyn ResourceCatalog>) -> Self {
        Self {
            config,
            catalog,
            registry: None,
            clock: None,
            store: None,
            audit: None,
            token: None,
        }
    }

    /// Use-case registry.
    #[must_use]
    pub fn with_registry(mut self, registry: UseCaseRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    /// Time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Reservation store, overriding `reservations_store`.
    #[must_use]
    pub fn with_store(mut self, store: Box<dyn ReservationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Audit sink.
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Box<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Cancellation token shared with the host.
    #[must_use]
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Build the agenda; it is not started.
    ///
    /// # Errors
    ///
    /// Invalid configuration or an unusable store path.
    pub fn build(self) -> Result<Agenda, SchedulerError> {
        self.config
            .validate()
            .map_err(|e| SchedulerError::InvalidConfig(format!("config invalid: {e}")))?;
        let store: Option<Box<dyn ReservationStore>> = match (self.store, &self.config.reservations_store) {
            (Some(store), _) => Some(store),
            (None, Some(path)) => Some(Box::new(JsonlStore::new(path)?)),
            (None, None) => None,
        };
        let audit = self
            .audit
            .unwrap_or_else(|| Box::new(InMemoryAuditSink::new(self.config.audit_capacity)));
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(UseCaseRegistry::with_defaults()));
        let clock = self.clock.unwrap_or_else(system_clock);

        let agenda = Agenda::new(self.config, self.catalog, registry, clock)?;
        if let Some(store) = store {
            agenda.set_store(store);
        }
        agenda.set_audit_sink(audit);
        if let Some(token) = self.token {
            agenda.set_cancellation_token(token);
        }
        Ok(agenda)
    }
}

/// Build an agenda with default collaborators.
///
/// # Errors
///
/// See [`AgendaBuilder::build`].
pub fn build_agenda(
    config: AgendaConfig,
    catalog: Arc<dyn ResourceCatalog>,
) -> Result<Agenda, SchedulerError> {
    AgendaBuilder::new(config, catalog).build()
}
