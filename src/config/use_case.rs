//! Use-case configuration: identity, type, properties and composition.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::cardinality::CardinalityConfig;
use crate::core::error::SchedulerError;
use crate::core::running::RunDepth;
use crate::core::use_case::UseCaseProperties;

/// How the daughters of a composite use case are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheduling {
    /// One after the other, in declaration order.
    Serial,
    /// All at once.
    #[default]
    Parallel,
    /// The serial sequence repeated `n` times.
    Repeat(usize),
}

/// Daughter use cases of a composite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositionDescription {
    /// Scheduling model.
    #[serde(default)]
    pub scheduling: Scheduling,
    /// Daughters; each name becomes a child session name.
    #[serde(default)]
    pub daughters: Vec<UseCaseConfig>,
}

impl CompositionDescription {
    /// Validate scheduling and daughters.
    ///
    /// # Errors
    ///
    /// Describes the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.daughters.is_empty() {
            return Err("composition has no daughters".into());
        }
        if self.scheduling == Scheduling::Repeat(0) {
            return Err("repeat scheduling needs at least one repetition".into());
        }
        let mut names = BTreeSet::new();
        for daughter in &self.daughters {
            if !names.insert(daughter.name.as_str()) {
                return Err(format!("duplicate daughter '{}'", daughter.name));
            }
            daughter
                .validate()
                .map_err(|e| format!("daughter `{}` invalid: {e}", daughter.name))?;
        }
        Ok(())
    }

    /// Daughter names in declaration order.
    #[must_use]
    pub fn daughter_names(&self) -> Vec<&str> {
        self.daughters.iter().map(|d| d.name.as_str()).collect()
    }
}

/// Keyed description of one use case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UseCaseConfig {
    /// Instance name.
    pub name: String,
    /// Free text.
    #[serde(default)]
    pub description: String,
    /// Registry type identifier.
    pub type_id: String,
    /// Inline properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<UseCaseProperties>,
    /// Path to a JSON file holding the properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<PathBuf>,
    /// Run depth, `work` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_depth: Option<RunDepth>,
    /// Daughters, for composite use cases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composition: Option<CompositionDescription>,
    /// Functional resources requested when no role applies.
    #[serde(default, skip_serializing_if = "CardinalityConfig::is_empty")]
    pub functional: CardinalityConfig,
    /// Distributable resources requested when no role applies.
    #[serde(default, skip_serializing_if = "CardinalityConfig::is_empty")]
    pub distributable: CardinalityConfig,
}

impl UseCaseConfig {
    /// Minimal configuration.
    pub fn new(name: impl Into<String>, type_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_id: type_id.into(),
            ..Self::default()
        }
    }

    /// Add an inline property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config
            .get_or_insert_with(UseCaseProperties::new)
            .insert(key.into(), value.into());
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the run depth.
    #[must_use]
    pub const fn with_run_depth(mut self, depth: RunDepth) -> Self {
        self.run_depth = Some(depth);
        self
    }

    /// Attach a composition.
    #[must_use]
    pub fn with_composition(mut self, composition: CompositionDescription) -> Self {
        self.composition = Some(composition);
        self
    }

    /// Validate identity fields and exclusivity of inline/path properties.
    ///
    /// # Errors
    ///
    /// Describes the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".into());
        }
        if self.type_id.trim().is_empty() {
            return Err("type_id must not be empty".into());
        }
        if self.config.is_some() && self.config_path.is_some() {
            return Err("config and config_path are mutually exclusive".into());
        }
        if let Some(composition) = &self.composition {
            composition.validate()?;
        }
        Ok(())
    }

    /// Resolve the key/value view: inline properties, the file at
    /// `config_path`, or an empty map.
    ///
    /// # Errors
    ///
    /// Invalid configuration, unreadable file, or a file that is not a JSON object.
    pub fn resolve_properties(&self) -> Result<UseCaseProperties, SchedulerError> {
        self.validate().map_err(SchedulerError::InvalidConfig)?;
        if let Some(inline) = &self.config {
            return Ok(inline.clone());
        }
        let Some(path) = &self.config_path else {
            return Ok(UseCaseProperties::new());
        };
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SchedulerError::Backend(format!("reading {}: {e}", path.display()))
        })?;
        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => Ok(map),
            _ => Err(SchedulerError::InvalidConfig(format!(
                "{} does not hold a JSON object",
                path.display()
            ))),
        }
    }

    /// Effective run depth.
    #[must_use]
    pub fn depth(&self) -> RunDepth {
        self.run_depth.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_scheduling_serde() {
        let serial: Scheduling = serde_json::from_value(json!("serial")).unwrap();
        assert_eq!(serial, Scheduling::Serial);
        let repeat: Scheduling = serde_json::from_value(json!({ "repeat": 3 })).unwrap();
        assert_eq!(repeat, Scheduling::Repeat(3));
    }

    #[test]
    fn test_composition_validation() {
        let mut composition = CompositionDescription {
            scheduling: Scheduling::Serial,
            daughters: vec![
                UseCaseConfig::new("a", "lock"),
                UseCaseConfig::new("a", "lock"),
            ],
        };
        assert!(composition.validate().is_err());
        composition.daughters[1].name = "b".into();
        assert!(composition.validate().is_ok());
        assert_eq!(composition.daughter_names(), vec!["a", "b"]);
        composition.scheduling = Scheduling::Repeat(0);
        assert!(composition.validate().is_err());
    }

    #[test]
    fn test_resolve_inline_and_path() {
        let inline = UseCaseConfig::new("lock", "lock").with_property("duration", "5s");
        assert_eq!(
            inline.resolve_properties().unwrap().get("duration"),
            Some(&json!("5s"))
        );

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "duration": "00:00:03" }}"#).unwrap();
        let mut by_path = UseCaseConfig::new("lock", "lock");
        by_path.config_path = Some(file.path().to_path_buf());
        assert_eq!(
            by_path.resolve_properties().unwrap().get("duration"),
            Some(&json!("00:00:03"))
        );

        let mut both = inline;
        both.config_path = Some(file.path().to_path_buf());
        assert!(matches!(
            both.resolve_properties(),
            Err(SchedulerError::InvalidConfig(_))
        ));
    }
}
