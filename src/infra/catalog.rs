//! In-memory resource catalog, loadable from JSON.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{ResourceCatalog, ResourceInfo, RoleDefinition, SchedulerError, TokenCapacity};

/// Catalog held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryCatalog {
    #[serde(default)]
    resources: Vec<ResourceInfo>,
    #[serde(default)]
    roles: Vec<RoleDefinition>,
    #[serde(skip)]
    by_id: BTreeMap<i32, usize>,
    #[serde(skip)]
    by_name: BTreeMap<String, usize>,
    #[serde(skip)]
    roles_by_name: BTreeMap<String, usize>,
}

impl InMemoryCatalog {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a catalog document `{"resources": [...], "roles": [...]}`.
    ///
    /// # Errors
    ///
    /// Malformed JSON or duplicate ids/names.
    pub fn from_json_str(input: &str) -> Result<Self, SchedulerError> {
        let raw: Self = serde_json::from_str(input)?;
        let mut catalog = Self::new();
        for resource in raw.resources {
            catalog.insert_resource(resource)?;
        }
        for role in raw.roles {
            catalog.insert_role(role)?;
        }
        Ok(catalog)
    }

    /// Read a catalog document from disk.
    ///
    /// # Errors
    ///
    /// Unreadable file or invalid document.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Add a resource.
    ///
    /// # Errors
    ///
    /// Duplicate id or name, or a zero limited capacity.
    pub fn add_resource(
        mut self,
        id: i32,
        name: impl Into<String>,
        capacity: TokenCapacity,
    ) -> Result<Self, SchedulerError> {
        self.insert_resource(ResourceInfo {
            id,
            name: name.into(),
            capacity,
        })?;
        Ok(self)
    }

    /// Add a role.
    ///
    /// # Errors
    ///
    /// Duplicate role name, or a resource id missing from the catalog.
    pub fn add_role(
        mut self,
        id: i32,
        name: impl Into<String>,
        functional: impl IntoIterator<Item = i32>,
        distributable: impl IntoIterator<Item = i32>,
    ) -> Result<Self, SchedulerError> {
        self.insert_role(RoleDefinition {
            id,
            name: name.into(),
            functional: functional.into_iter().collect(),
            distributable: distributable.into_iter().collect(),
        })?;
        Ok(self)
    }

    /// Number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the catalog has no resource.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    fn insert_resource(&mut self, resource: ResourceInfo) -> Result<(), SchedulerError> {
        if self.by_id.contains_key(&resource.id) || self.by_name.contains_key(&resource.name) {
            return Err(SchedulerError::InvalidConfig(format!(
                "duplicate resource {} '{}'",
                resource.id, resource.name
            )));
        }
        if resource.capacity == TokenCapacity::Limited(0) {
            return Err(SchedulerError::InvalidConfig(format!(
                "resource '{}' has no token",
                resource.name
            )));
        }
        let index = self.resources.len();
        self.by_id.insert(resource.id, index);
        self.by_name.insert(resource.name.clone(), index);
        self.resources.push(resource);
        Ok(())
    }

    fn insert_role(&mut self, role: RoleDefinition) -> Result<(), SchedulerError> {
        if self.roles_by_name.contains_key(&role.name) {
            return Err(SchedulerError::InvalidConfig(format!(
                "duplicate role '{}'",
                role.name
            )));
        }
        let ids: BTreeSet<i32> = role.functional.union(&role.distributable).copied().collect();
        if let Some(missing) = ids.into_iter().find(|id| !self.by_id.contains_key(id)) {
            return Err(SchedulerError::UnknownResource(missing.to_string()));
        }
        self.roles_by_name.insert(role.name.clone(), self.roles.len());
        self.roles.push(role);
        Ok(())
    }
}

impl ResourceCatalog for InMemoryCatalog {
    fn resource(&self, id: i32) -> Option<&ResourceInfo> {
        self.by_id.get(&id).and_then(|&i| self.resources.get(i))
    }

    fn resource_by_name(&self, name: &str) -> Option<&ResourceInfo> {
        self.by_name.get(name).and_then(|&i| self.resources.get(i))
    }

    fn resource_ids(&self) -> Vec<i32> {
        self.by_id.keys().copied().collect()
    }

    fn role(&self, name: &str) -> Option<&RoleDefinition> {
        self.roles_by_name.get(name).and_then(|&i| self.roles.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_lookups() {
        let catalog = InMemoryCatalog::new()
            .add_resource(2, "hv", TokenCapacity::Limited(3))
            .unwrap()
            .add_resource(1, "valve", TokenCapacity::Limited(1))
            .unwrap()
            .add_role(1, "operator", [1], [2])
            .unwrap();
        assert_eq!(catalog.resource_ids(), vec![1, 2]);
        assert_eq!(catalog.resolve_resource("hv").map(|r| r.id), Some(2));
        assert_eq!(catalog.resolve_resource("1").map(|r| r.id), Some(1));
        assert!(catalog.resolve_resource("nope").is_none());
        assert!(catalog.role("operator").is_some());
    }

    #[test]
    fn test_rejects_bad_entries() {
        let catalog = InMemoryCatalog::new()
            .add_resource(1, "valve", TokenCapacity::Limited(1))
            .unwrap();
        assert!(catalog
            .clone()
            .add_resource(1, "other", TokenCapacity::Unlimited)
            .is_err());
        assert!(catalog
            .clone()
            .add_resource(5, "empty", TokenCapacity::Limited(0))
            .is_err());
        let err = catalog.add_role(1, "ghost", [9], []).unwrap_err();
        assert_eq!(err, SchedulerError::UnknownResource("9".into()));
    }

    #[test]
    fn test_from_json() {
        let catalog = InMemoryCatalog::from_json_str(
            r#"{
                "resources": [
                    {"id": 1, "name": "valve", "capacity": {"limited": 1}},
                    {"id": 3, "name": "monitor", "capacity": "unlimited"}
                ],
                "roles": [{"id": 1, "name": "operator", "functional": [1], "distributable": [3]}]
            }"#,
        )
        .unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.resource(3).map(|r| r.capacity),
            Some(TokenCapacity::Unlimited)
        );
    }
}
