//! Token ledger attached to a session.
//!
//! A pool holds limited resources as token counts and unlimited resources as
//! a plain id set. The root pool is built from the catalog; every other pool
//! is carved out of a parent pool by [`ResourcePool::load_daughter_from_parent`]
//! and returns its tokens through [`ResourcePool::restore_parent_from_daughter`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::cardinality::{CardinalityRequest, UNLIMITED_TOKENS};
use crate::core::catalog::{ResourceCatalog, TokenCapacity};
use crate::core::error::SchedulerError;

/// Pool shared between a session and the children drawing from it.
pub type SharedResourcePool = Arc<Mutex<ResourcePool>>;

/// How the root pool sizes limited resources that the request leaves open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardinalityProfile {
    /// Full declared capacity.
    #[default]
    All,
    /// A single token.
    OnlyOne,
    /// Capacity plus one (lets tests provoke over-subscription downstream).
    AllPlusOne,
}

/// Token ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourcePool {
    initialized: bool,
    limited_tokens: BTreeMap<i32, usize>,
    unlimited: BTreeSet<i32>,
}

impl ResourcePool {
    /// Uninitialized, empty pool.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            initialized: false,
            limited_tokens: BTreeMap::new(),
            unlimited: BTreeSet::new(),
        }
    }

    /// Wrap into a shared handle.
    #[must_use]
    pub fn into_shared(self) -> SharedResourcePool {
        Arc::new(Mutex::new(self))
    }

    /// Fill a root pool from every catalog resource.
    ///
    /// Resources missing from `request` default to "unlimited" and are sized
    /// by `profile`; explicit zeros are skipped.
    ///
    /// # Errors
    ///
    /// Already initialized pool, or an explicit count above capacity.
    pub fn init_root(
        &mut self,
        catalog: &dyn ResourceCatalog,
        request: &CardinalityRequest,
        profile: CardinalityProfile,
    ) -> Result<(), SchedulerError> {
        if self.initialized {
            return Err(SchedulerError::AlreadyInitialized("root resource pool".into()));
        }
        let mut limited = BTreeMap::new();
        let mut unlimited = BTreeSet::new();
        for id in catalog.resource_ids() {
            let Some(info) = catalog.resource(id) else {
                continue;
            };
            let requested = request.get(&id).copied().unwrap_or(UNLIMITED_TOKENS);
            if requested == 0 {
                continue;
            }
            match info.capacity {
                TokenCapacity::Unlimited => {
                    unlimited.insert(id);
                }
                TokenCapacity::Limited(max) => {
                    let count = if requested == UNLIMITED_TOKENS {
                        match profile {
                            CardinalityProfile::All => max,
                            CardinalityProfile::OnlyOne => 1,
                            CardinalityProfile::AllPlusOne => max + 1,
                        }
                    } else if requested > max {
                        return Err(SchedulerError::CapacityExceeded {
                            id,
                            requested,
                            capacity: max,
                        });
                    } else {
                        requested
                    };
                    limited.insert(id, count);
                }
            }
        }
        self.limited_tokens = limited;
        self.unlimited = unlimited;
        self.initialized = true;
        tracing::debug!(
            limited = self.limited_tokens.len(),
            unlimited = self.unlimited.len(),
            ?profile,
            "root resource pool initialized"
        );
        Ok(())
    }

    /// Grant `request` from `parent` into `daughter`, all or nothing.
    ///
    /// Zero entries are skipped. On failure neither pool changes and the
    /// error names the first resource that could not be satisfied.
    ///
    /// # Errors
    ///
    /// Uninitialized parent, initialized daughter, unknown resource, count
    /// above capacity, or not enough tokens left in the parent.
    pub fn load_daughter_from_parent(
        parent: &mut Self,
        daughter: &mut Self,
        catalog: &dyn ResourceCatalog,
        request: &CardinalityRequest,
    ) -> Result<(), SchedulerError> {
        if !parent.initialized {
            return Err(SchedulerError::NotInitialized("parent resource pool".into()));
        }
        if daughter.initialized {
            return Err(SchedulerError::AlreadyInitialized(
                "daughter resource pool".into(),
            ));
        }
        let mut limited = BTreeMap::new();
        let mut unlimited = BTreeSet::new();
        for (&id, &requested) in request {
            let info = catalog
                .resource(id)
                .ok_or_else(|| SchedulerError::UnknownResource(id.to_string()))?;
            if requested == 0 {
                continue;
            }
            match info.capacity {
                TokenCapacity::Unlimited => {
                    if !parent.unlimited.contains(&id) {
                        return Err(SchedulerError::ResourceExhausted {
                            id,
                            requested,
                            available: 0,
                        });
                    }
                    unlimited.insert(id);
                }
                TokenCapacity::Limited(max) => {
                    if requested > max {
                        return Err(SchedulerError::CapacityExceeded {
                            id,
                            requested,
                            capacity: max,
                        });
                    }
                    let available = parent.limited_tokens.get(&id).copied().unwrap_or(0);
                    if requested > available {
                        return Err(SchedulerError::ResourceExhausted {
                            id,
                            requested,
                            available,
                        });
                    }
                    limited.insert(id, requested);
                }
            }
        }
        for (&id, &count) in &limited {
            if let Some(tokens) = parent.limited_tokens.get_mut(&id) {
                *tokens -= count;
            }
        }
        daughter.limited_tokens = limited;
        daughter.unlimited = unlimited;
        daughter.initialized = true;
        Ok(())
    }

    /// Give the daughter's limited tokens back to the parent and reset it.
    ///
    /// # Errors
    ///
    /// Either pool uninitialized.
    pub fn restore_parent_from_daughter(
        parent: &mut Self,
        daughter: &mut Self,
    ) -> Result<(), SchedulerError> {
        if !parent.initialized {
            return Err(SchedulerError::NotInitialized("parent resource pool".into()));
        }
        if !daughter.initialized {
            return Err(SchedulerError::NotInitialized(
                "daughter resource pool".into(),
            ));
        }
        for (&id, &count) in &daughter.limited_tokens {
            *parent.limited_tokens.entry(id).or_insert(0) += count;
        }
        daughter.reset();
        Ok(())
    }

    /// Mark the pool initialized without granting anything.
    pub fn initialize(&mut self) {
        self.initialized = true;
    }

    /// Whether the pool has been filled.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Drop every token and mark uninitialized.
    pub fn reset(&mut self) {
        self.initialized = false;
        self.limited_tokens.clear();
        self.unlimited.clear();
    }

    /// Whether the pool knows `id`.
    #[must_use]
    pub fn has_resource(&self, id: i32) -> bool {
        self.is_limited(id) || self.is_unlimited(id)
    }

    /// Whether `id` is held as a limited resource.
    #[must_use]
    pub fn is_limited(&self, id: i32) -> bool {
        self.limited_tokens.contains_key(&id)
    }

    /// Whether `id` is held as an unlimited resource.
    #[must_use]
    pub fn is_unlimited(&self, id: i32) -> bool {
        self.unlimited.contains(&id)
    }

    /// Whether `id` is limited with no token left.
    #[must_use]
    pub fn is_exhausted(&self, id: i32) -> bool {
        self.remaining_limited_tokens(id) == Some(0)
    }

    /// Tokens left for a limited resource.
    #[must_use]
    pub fn remaining_limited_tokens(&self, id: i32) -> Option<usize> {
        self.limited_tokens.get(&id).copied()
    }

    /// Add an unlimited resource.
    ///
    /// # Errors
    ///
    /// Uninitialized pool.
    pub fn add_unlimited(&mut self, id: i32) -> Result<(), SchedulerError> {
        self.ensure_initialized()?;
        self.unlimited.insert(id);
        Ok(())
    }

    /// Return `step` tokens of a limited resource.
    ///
    /// # Errors
    ///
    /// Uninitialized pool or resource not limited.
    pub fn increment_limited_tokens(&mut self, id: i32, step: usize) -> Result<(), SchedulerError> {
        self.ensure_initialized()?;
        let tokens = self
            .limited_tokens
            .get_mut(&id)
            .ok_or_else(|| SchedulerError::UnknownResource(id.to_string()))?;
        *tokens += step;
        Ok(())
    }

    /// Take `step` tokens of a limited resource.
    ///
    /// # Errors
    ///
    /// Uninitialized pool, resource not limited, or not enough tokens.
    pub fn decrement_limited_tokens(&mut self, id: i32, step: usize) -> Result<(), SchedulerError> {
        self.ensure_initialized()?;
        let tokens = self
            .limited_tokens
            .get_mut(&id)
            .ok_or_else(|| SchedulerError::UnknownResource(id.to_string()))?;
        if step > *tokens {
            return Err(SchedulerError::ResourceExhausted {
                id,
                requested: step,
                available: *tokens,
            });
        }
        *tokens -= step;
        Ok(())
    }

    /// Whether `step` tokens of `id` could be taken now.
    #[must_use]
    pub fn can_transfer(&self, id: i32, step: usize) -> bool {
        self.remaining_limited_tokens(id)
            .is_some_and(|left| step <= left)
    }

    /// Limited resource ids.
    #[must_use]
    pub fn limited_ids(&self) -> BTreeSet<i32> {
        self.limited_tokens.keys().copied().collect()
    }

    /// Unlimited resource ids.
    #[must_use]
    pub fn unlimited_ids(&self) -> BTreeSet<i32> {
        self.unlimited.clone()
    }

    /// Every resource id.
    #[must_use]
    pub fn all_ids(&self) -> BTreeSet<i32> {
        self.limited_ids().union(&self.unlimited).copied().collect()
    }

    /// Limited token counts.
    #[must_use]
    pub const fn limited_tokens(&self) -> &BTreeMap<i32, usize> {
        &self.limited_tokens
    }

    /// Per-resource difference `self - other` of limited tokens.
    ///
    /// Resources absent from one side count as zero; equal entries are omitted.
    #[must_use]
    pub fn diff(&self, other: &Self) -> BTreeMap<i32, i64> {
        let ids: BTreeSet<i32> = self
            .limited_tokens
            .keys()
            .chain(other.limited_tokens.keys())
            .copied()
            .collect();
        ids.into_iter()
            .filter_map(|id| {
                let mine = to_signed(self.limited_tokens.get(&id).copied().unwrap_or(0));
                let theirs = to_signed(other.limited_tokens.get(&id).copied().unwrap_or(0));
                (mine != theirs).then_some((id, mine - theirs))
            })
            .collect()
    }

    fn ensure_initialized(&self) -> Result<(), SchedulerError> {
        if self.initialized {
            Ok(())
        } else {
            Err(SchedulerError::NotInitialized("resource pool".into()))
        }
    }
}

fn to_signed(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

impl fmt::Display for ResourcePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.initialized {
            return f.write_str("<uninitialized>");
        }
        write!(f, "limited={:?} unlimited={:?}", self.limited_tokens, self.unlimited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::{ResourceInfo, RoleDefinition};

    struct Fixture(Vec<ResourceInfo>);

    impl ResourceCatalog for Fixture {
        fn resource(&self, id: i32) -> Option<&ResourceInfo> {
            self.0.iter().find(|r| r.id == id)
        }
        fn resource_by_name(&self, name: &str) -> Option<&ResourceInfo> {
            self.0.iter().find(|r| r.name == name)
        }
        fn resource_ids(&self) -> Vec<i32> {
            self.0.iter().map(|r| r.id).collect()
        }
        fn role(&self, _name: &str) -> Option<&RoleDefinition> {
            None
        }
    }

    fn fixture() -> Fixture {
        Fixture(vec![
            ResourceInfo {
                id: 1,
                name: "valve".into(),
                capacity: TokenCapacity::Limited(1),
            },
            ResourceInfo {
                id: 2,
                name: "hv".into(),
                capacity: TokenCapacity::Limited(3),
            },
            ResourceInfo {
                id: 3,
                name: "monitor".into(),
                capacity: TokenCapacity::Unlimited,
            },
        ])
    }

    fn root(profile: CardinalityProfile) -> ResourcePool {
        let mut pool = ResourcePool::new();
        pool.init_root(&fixture(), &CardinalityRequest::new(), profile)
            .unwrap();
        pool
    }

    #[test]
    fn test_init_root_profiles() {
        let all = root(CardinalityProfile::All);
        assert_eq!(all.remaining_limited_tokens(2), Some(3));
        assert!(all.is_unlimited(3));
        let one = root(CardinalityProfile::OnlyOne);
        assert_eq!(one.remaining_limited_tokens(2), Some(1));
        let plus = root(CardinalityProfile::AllPlusOne);
        assert_eq!(plus.remaining_limited_tokens(1), Some(2));

        let mut again = all.clone();
        assert!(again
            .init_root(&fixture(), &CardinalityRequest::new(), CardinalityProfile::All)
            .is_err());
    }

    #[test]
    fn test_init_root_rejects_oversized_request() {
        let mut pool = ResourcePool::new();
        let request = CardinalityRequest::from([(1, 5)]);
        let err = pool
            .init_root(&fixture(), &request, CardinalityProfile::All)
            .unwrap_err();
        assert_eq!(err.resource_id(), Some(1));
        assert!(!pool.is_initialized());
    }

    #[test]
    fn test_daughter_grant_is_all_or_nothing() {
        let mut parent = root(CardinalityProfile::All);
        let before = parent.clone();
        let mut daughter = ResourcePool::new();
        let request = CardinalityRequest::from([(2, 2), (1, 1), (3, UNLIMITED_TOKENS)]);
        ResourcePool::load_daughter_from_parent(&mut parent, &mut daughter, &fixture(), &request)
            .unwrap();
        assert!(parent.is_exhausted(1));
        assert_eq!(parent.remaining_limited_tokens(2), Some(1));
        assert!(daughter.is_unlimited(3));

        let mut sibling = ResourcePool::new();
        let greedy = CardinalityRequest::from([(2, 1), (1, 1)]);
        let err = ResourcePool::load_daughter_from_parent(
            &mut parent,
            &mut sibling,
            &fixture(),
            &greedy,
        )
        .unwrap_err();
        assert_eq!(err.resource_id(), Some(1));
        assert_eq!(parent.remaining_limited_tokens(2), Some(1));
        assert!(!sibling.is_initialized());

        ResourcePool::restore_parent_from_daughter(&mut parent, &mut daughter).unwrap();
        assert_eq!(parent, before);
        assert!(parent.diff(&before).is_empty());
        assert!(!daughter.is_initialized());
    }

    #[test]
    fn test_unknown_and_oversized_requests() {
        let mut parent = root(CardinalityProfile::All);
        let mut daughter = ResourcePool::new();
        let unknown = CardinalityRequest::from([(99, 1)]);
        let err = ResourcePool::load_daughter_from_parent(
            &mut parent,
            &mut daughter,
            &fixture(),
            &unknown,
        )
        .unwrap_err();
        assert_eq!(err, SchedulerError::UnknownResource("99".into()));
        assert_eq!(err.resource_id(), Some(99));

        let oversized = CardinalityRequest::from([(2, 4)]);
        let err = ResourcePool::load_daughter_from_parent(
            &mut parent,
            &mut daughter,
            &fixture(),
            &oversized,
        )
        .unwrap_err();
        assert!(matches!(err, SchedulerError::CapacityExceeded { id: 2, .. }));
    }

    #[test]
    fn test_token_arithmetic() {
        let mut pool = root(CardinalityProfile::All);
        assert!(pool.can_transfer(2, 3));
        assert!(!pool.can_transfer(2, 4));
        assert!(!pool.can_transfer(3, 1));
        pool.decrement_limited_tokens(2, 3).unwrap();
        assert!(pool.is_exhausted(2));
        assert!(pool.decrement_limited_tokens(2, 1).is_err());
        pool.increment_limited_tokens(2, 1).unwrap();
        assert_eq!(pool.remaining_limited_tokens(2), Some(1));
        assert!(pool.increment_limited_tokens(3, 1).is_err());
        assert_eq!(pool.all_ids(), BTreeSet::from([1, 2, 3]));
        assert_eq!(pool.diff(&root(CardinalityProfile::All)), BTreeMap::from([(2, -2)]));
    }
}
