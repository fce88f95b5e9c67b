//! Read-only view of the resource and role catalog.
//!
//! The catalog itself is owned elsewhere; the scheduler only resolves
//! resource identifiers, token capacities and role resource sets through
//! this trait.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Token capacity of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenCapacity {
    /// At most `n` tokens may be held at once.
    Limited(usize),
    /// Any number of holders.
    Unlimited,
}

impl TokenCapacity {
    /// Whether the capacity is bounded.
    #[must_use]
    pub const fn is_limited(self) -> bool {
        matches!(self, Self::Limited(_))
    }
}

/// One catalog resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    /// Resource identifier.
    pub id: i32,
    /// Unique resource name (usually a path).
    pub name: String,
    /// Token capacity.
    pub capacity: TokenCapacity,
}

/// Which resource set of a role to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceSetFlag {
    /// Resources held throughout the functional stages.
    Functional,
    /// Resources shared opportunistically.
    Distributable,
}

/// A role and the resources it grants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    /// Role identifier.
    pub id: i32,
    /// Role name.
    pub name: String,
    /// Functional resource ids.
    #[serde(default)]
    pub functional: BTreeSet<i32>,
    /// Distributable resource ids.
    #[serde(default)]
    pub distributable: BTreeSet<i32>,
}

impl RoleDefinition {
    /// Resource set selected by `flag`.
    #[must_use]
    pub const fn resource_set(&self, flag: ResourceSetFlag) -> &BTreeSet<i32> {
        match flag {
            ResourceSetFlag::Functional => &self.functional,
            ResourceSetFlag::Distributable => &self.distributable,
        }
    }
}

/// Catalog lookups consumed by the scheduler.
pub trait ResourceCatalog: Send + Sync {
    /// Resource by id.
    fn resource(&self, id: i32) -> Option<&ResourceInfo>;
    /// Resource by name.
    fn resource_by_name(&self, name: &str) -> Option<&ResourceInfo>;
    /// All resource ids, ascending.
    fn resource_ids(&self) -> Vec<i32>;
    /// Role by name.
    fn role(&self, name: &str) -> Option<&RoleDefinition>;

    /// Resolve a resource from its name, falling back to a numeric id.
    fn resolve_resource(&self, name_or_id: &str) -> Option<&ResourceInfo> {
        self.resource_by_name(name_or_id).or_else(|| {
            name_or_id
                .trim()
                .parse::<i32>()
                .ok()
                .and_then(|id| self.resource(id))
        })
    }
}
