//! Use-case factories keyed by type identifier.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::UseCaseConfig;
use crate::core::error::SchedulerError;
use crate::core::use_case::composite::{CompositeUseCase, COMPOSITE_TYPE_ID};
use crate::core::use_case::lock::{LockUseCase, LOCK_TYPE_ID};
use crate::core::use_case::{UseCase, UseCaseBehavior, UseCaseProperties};

/// Creates the behaviour of one use-case type from its configuration.
pub type UseCaseFactory =
    Arc<dyn Fn(&UseCaseConfig) -> Result<Box<dyn UseCaseBehavior>, SchedulerError> + Send + Sync>;

/// Registry of use-case types.
#[derive(Clone, Default)]
pub struct UseCaseRegistry {
    factories: BTreeMap<String, UseCaseFactory>,
}

impl UseCaseRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `lock` and `composite` types.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(LOCK_TYPE_ID, |_| Ok(Box::new(LockUseCase::new())));
        registry.register(COMPOSITE_TYPE_ID, |config| {
            let composition = config.composition.clone().ok_or_else(|| {
                SchedulerError::InvalidConfig(format!(
                    "composite use case '{}' has no composition",
                    config.name
                ))
            })?;
            Ok(Box::new(CompositeUseCase::new(composition)))
        });
        registry
    }

    /// Register (or replace) a factory.
    pub fn register<F>(&mut self, type_id: impl Into<String>, factory: F)
    where
        F: Fn(&UseCaseConfig) -> Result<Box<dyn UseCaseBehavior>, SchedulerError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(type_id.into(), Arc::new(factory));
    }

    /// Whether `type_id` is registered.
    #[must_use]
    pub fn has(&self, type_id: &str) -> bool {
        self.factories.contains_key(type_id)
    }

    /// Registered type identifiers.
    #[must_use]
    pub fn type_ids(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Build an uninitialized use case and its resolved properties.
    ///
    /// # Errors
    ///
    /// Unknown type, invalid configuration, unreadable properties, or a
    /// factory failure.
    pub fn create(
        &self,
        config: &UseCaseConfig,
    ) -> Result<(UseCase, UseCaseProperties), SchedulerError> {
        let factory = self
            .factories
            .get(&config.type_id)
            .ok_or_else(|| SchedulerError::UnknownUseCaseType(config.type_id.clone()))?;
        let properties = config.resolve_properties()?;
        let behavior = factory(config)?;
        let mut use_case = UseCase::with_depth(config.name.clone(), behavior, config.depth());
        use_case.set_description(config.description.clone());
        Ok((use_case, properties))
    }
}

impl fmt::Debug for UseCaseRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UseCaseRegistry")
            .field("types", &self.type_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::running::RunDepth;

    #[test]
    fn test_defaults_and_unknown_type() {
        let registry = UseCaseRegistry::with_defaults();
        assert_eq!(registry.type_ids(), vec!["composite", "lock"]);
        let err = registry
            .create(&UseCaseConfig::new("x", "teleport"))
            .unwrap_err();
        assert_eq!(err, SchedulerError::UnknownUseCaseType("teleport".into()));
    }

    #[test]
    fn test_create_lock() {
        let registry = UseCaseRegistry::with_defaults();
        let config = UseCaseConfig::new("hold", "lock")
            .with_property("duration", "5s")
            .with_run_depth(RunDepth::Auto);
        let (uc, props) = registry.create(&config).unwrap();
        assert_eq!(uc.type_id(), "lock");
        assert_eq!(uc.run_control().depth(), RunDepth::Auto);
        assert!(props.contains_key("duration"));
        assert!(registry
            .create(&UseCaseConfig::new("c", "composite"))
            .is_err());
    }
}
