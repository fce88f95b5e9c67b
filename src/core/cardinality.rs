//! Resource cardinality requests.
//!
//! A [`CardinalityRequest`] maps resource ids to token counts:
//! `0` inhibits the resource, [`UNLIMITED_TOKENS`] asks for an unlimited
//! resource, any other value is a limited count. [`ResourceCardinality`]
//! edits a caller-owned request in place.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::catalog::{ResourceCatalog, ResourceSetFlag, RoleDefinition, TokenCapacity};
use crate::core::error::SchedulerError;

/// Requested token count per resource id.
pub type CardinalityRequest = BTreeMap<i32, usize>;

/// Marker count for unlimited resources.
pub const UNLIMITED_TOKENS: usize = usize::MAX;

/// Declarative request: resource names (or numeric ids) grouped by kind.
///
/// Limited entries take the form `name` or `name=count`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardinalityConfig {
    /// Inhibited resources.
    #[serde(default)]
    pub unset: Vec<String>,
    /// Unlimited resources.
    #[serde(default)]
    pub unlimited: Vec<String>,
    /// Limited resources with optional count.
    #[serde(default)]
    pub limited: Vec<String>,
}

impl CardinalityConfig {
    /// Whether no entry is listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unset.is_empty() && self.unlimited.is_empty() && self.limited.is_empty()
    }
}

/// Mutable view over a caller-owned [`CardinalityRequest`].
pub struct ResourceCardinality<'a> {
    request: &'a mut CardinalityRequest,
}

impl<'a> ResourceCardinality<'a> {
    /// Wrap `request`.
    pub fn new(request: &'a mut CardinalityRequest) -> Self {
        Self { request }
    }

    /// Ask for `n` tokens of a limited resource (`n` is usually 1).
    pub fn set_limited_resource(&mut self, id: i32, n: usize) {
        self.request.insert(id, n);
    }

    /// Ask for an unlimited resource.
    pub fn set_unlimited_resource(&mut self, id: i32) {
        self.request.insert(id, UNLIMITED_TOKENS);
    }

    /// Inhibit a resource (explicit zero).
    pub fn unset_resource(&mut self, id: i32) {
        self.request.insert(id, 0);
    }

    /// Whether `id` has any entry.
    #[must_use]
    pub fn has_resource(&self, id: i32) -> bool {
        self.request.contains_key(&id)
    }

    /// Whether `id` has a limited, non-zero count.
    #[must_use]
    pub fn has_limited_resource(&self, id: i32) -> bool {
        is_limited_count(self.request, id)
    }

    /// Whether `id` is requested as unlimited.
    #[must_use]
    pub fn has_unlimited_resource(&self, id: i32) -> bool {
        self.request.get(&id) == Some(&UNLIMITED_TOKENS)
    }

    /// Whether `id` is explicitly inhibited.
    #[must_use]
    pub fn has_unset_resource(&self, id: i32) -> bool {
        self.request.get(&id) == Some(&0)
    }

    /// Count requested for `id`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::MissingCardinality`] if `id` has no entry.
    pub fn at(&self, id: i32) -> Result<usize, SchedulerError> {
        self.request
            .get(&id)
            .copied()
            .ok_or(SchedulerError::MissingCardinality(id))
    }

    /// Drop every entry.
    pub fn reset(&mut self) {
        self.request.clear();
    }

    /// Underlying request.
    #[must_use]
    pub fn request(&self) -> &CardinalityRequest {
        self.request
    }

    /// Replace the request with the entries of `config`.
    ///
    /// Names resolve through `catalog` when given, otherwise they must be
    /// numeric ids. On error the request is left empty.
    ///
    /// # Errors
    ///
    /// Unknown names, kind mismatches against the catalog, counts above
    /// capacity, malformed entries, and resources listed twice.
    pub fn configure(
        &mut self,
        config: &CardinalityConfig,
        catalog: Option<&dyn ResourceCatalog>,
    ) -> Result<(), SchedulerError> {
        self.request.clear();
        let result = self.configure_entries(config, catalog);
        if result.is_err() {
            self.request.clear();
        }
        result
    }

    fn configure_entries(
        &mut self,
        config: &CardinalityConfig,
        catalog: Option<&dyn ResourceCatalog>,
    ) -> Result<(), SchedulerError> {
        for entry in &config.unset {
            let (id, _) = resolve(entry, catalog)?;
            self.unset_resource(id);
        }
        for entry in &config.unlimited {
            let (id, capacity) = resolve(entry, catalog)?;
            if let Some(TokenCapacity::Limited(_)) = capacity {
                return Err(SchedulerError::CardinalityMismatch {
                    id,
                    detail: format!("'{entry}' is not unlimited"),
                });
            }
            self.insert_once(id, entry, UNLIMITED_TOKENS)?;
        }
        for entry in &config.limited {
            let (name, count) = split_limited(entry)?;
            let (id, capacity) = resolve(name, catalog)?;
            match capacity {
                Some(TokenCapacity::Unlimited) => {
                    return Err(SchedulerError::CardinalityMismatch {
                        id,
                        detail: format!("'{name}' is not limited"),
                    });
                }
                Some(TokenCapacity::Limited(max)) if count > max => {
                    return Err(SchedulerError::CapacityExceeded {
                        id,
                        requested: count,
                        capacity: max,
                    });
                }
                _ => {}
            }
            self.insert_once(id, name, count)?;
        }
        Ok(())
    }

    fn insert_once(&mut self, id: i32, label: &str, count: usize) -> Result<(), SchedulerError> {
        if self.request.contains_key(&id) {
            return Err(SchedulerError::InvalidConfig(format!(
                "resource '{label}' is already registered"
            )));
        }
        self.request.insert(id, count);
        Ok(())
    }

    /// Replace the request with the role's default footprint for `flag`,
    /// then apply `overrides` for every id of that footprint.
    ///
    /// Defaults are one token for limited resources and unlimited for
    /// unlimited ones. An override always wins, including an explicit zero.
    ///
    /// # Errors
    ///
    /// Role resources missing from the catalog, or an override whose kind
    /// (limited/unlimited) contradicts the catalog.
    pub fn build_from_role(
        &mut self,
        catalog: &dyn ResourceCatalog,
        role: &RoleDefinition,
        flag: ResourceSetFlag,
        overrides: &CardinalityRequest,
    ) -> Result<(), SchedulerError> {
        self.request.clear();
        let mut built = CardinalityRequest::new();
        for &id in role.resource_set(flag) {
            let info = catalog
                .resource(id)
                .ok_or_else(|| SchedulerError::UnknownResource(id.to_string()))?;
            let count = match (info.capacity, overrides.get(&id).copied()) {
                (_, Some(0)) => 0,
                (TokenCapacity::Unlimited, None | Some(UNLIMITED_TOKENS)) => UNLIMITED_TOKENS,
                (TokenCapacity::Unlimited, Some(_)) => {
                    return Err(SchedulerError::CardinalityMismatch {
                        id,
                        detail: "resource is not limited".to_string(),
                    });
                }
                (TokenCapacity::Limited(_), Some(UNLIMITED_TOKENS)) => {
                    return Err(SchedulerError::CardinalityMismatch {
                        id,
                        detail: "resource is limited".to_string(),
                    });
                }
                (TokenCapacity::Limited(_), Some(n)) => n,
                (TokenCapacity::Limited(_), None) => 1,
            };
            built.insert(id, count);
        }
        *self.request = built;
        tracing::trace!(role = %role.name, ?flag, request = %DisplayRequest(self.request), "built cardinality request");
        Ok(())
    }
}

impl fmt::Display for ResourceCardinality<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        DisplayRequest(self.request).fmt(f)
    }
}

/// Printable wrapper for a request.
pub struct DisplayRequest<'a>(pub &'a CardinalityRequest);

impl fmt::Display for DisplayRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (id, count)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match *count {
                UNLIMITED_TOKENS => write!(f, "{id}: unlimited")?,
                0 => write!(f, "{id}: unset")?,
                n => write!(f, "{id}: {n}")?,
            }
        }
        f.write_str("}")
    }
}

fn is_limited_count(request: &CardinalityRequest, id: i32) -> bool {
    matches!(request.get(&id), Some(&n) if n != 0 && n != UNLIMITED_TOKENS)
}

fn split_limited(entry: &str) -> Result<(&str, usize), SchedulerError> {
    let mut parts = entry.split('=');
    let name = parts.next().unwrap_or_default().trim();
    let count = match parts.next() {
        None => 1,
        Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
            SchedulerError::InvalidConfig(format!("invalid limited cardinality '{entry}'"))
        })?,
    };
    if name.is_empty() || parts.next().is_some() {
        return Err(SchedulerError::InvalidConfig(format!(
            "invalid limited cardinality '{entry}'"
        )));
    }
    Ok((name, count))
}

fn resolve(
    entry: &str,
    catalog: Option<&dyn ResourceCatalog>,
) -> Result<(i32, Option<TokenCapacity>), SchedulerError> {
    let entry = entry.trim();
    let resolved = match catalog {
        Some(catalog) => catalog
            .resolve_resource(entry)
            .map(|info| (info.id, Some(info.capacity))),
        None => entry.parse::<i32>().ok().map(|id| (id, None)),
    };
    match resolved {
        Some((id, capacity)) if id >= 0 => Ok((id, capacity)),
        _ => Err(SchedulerError::UnknownResource(entry.to_string())),
    }
}
