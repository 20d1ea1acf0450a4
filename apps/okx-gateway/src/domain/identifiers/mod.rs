//! Order Identifier Registry
//!
//! Bidirectional local↔remote order id maps with a separate space for
//! conditional (stop) orders, the set of ids this gateway originated, and
//! the allocator that mints local ids.
//!
//! # Invariants
//!
//! - A local id maps to at most one remote id per space, and vice versa.
//! - A binding is created once and never overwritten. Rebinding the same
//!   pair is a no-op; binding to a different counterpart is an error that
//!   leaves the original mapping intact.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, FixedOffset};
use parking_lot::{Mutex, RwLock};

// =============================================================================
// Types
// =============================================================================

/// Identifier space an order id lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdSpace {
    /// Regular orders (`clOrdId` ↔ `ordId`).
    Regular,
    /// Conditional orders (`algoClOrdId` ↔ `algoId`).
    Stop,
}

impl IdSpace {
    /// Label used in logs and errors.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for IdSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// A new mapping was recorded.
    Created,
    /// The identical mapping already existed.
    AlreadyBound,
}

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// One side of the pair is already bound to a different counterpart.
    #[error("cannot bind {local} -> {remote} in {space} space: already bound to {existing}")]
    DuplicateBinding {
        /// Identifier space of the attempted bind.
        space: IdSpace,
        /// Local id of the attempted bind.
        local: String,
        /// Remote id of the attempted bind.
        remote: String,
        /// The counterpart already on record.
        existing: String,
    },
}

#[derive(Debug, Default)]
struct IdMaps {
    local_to_remote: HashMap<String, String>,
    remote_to_local: HashMap<String, String>,
}

// =============================================================================
// Identifier Registry
// =============================================================================

/// Thread-safe bidirectional identifier maps.
#[derive(Debug, Default)]
pub struct IdentifierRegistry {
    regular: RwLock<IdMaps>,
    stop: RwLock<IdMaps>,
    local_origin: RwLock<HashSet<String>>,
}

impl IdentifierRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    const fn space(&self, space: IdSpace) -> &RwLock<IdMaps> {
        match space {
            IdSpace::Regular => &self.regular,
            IdSpace::Stop => &self.stop,
        }
    }

    /// Record `local ↔ remote` in `space`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateBinding`] if either id is already
    /// bound to a different counterpart. The existing mapping is kept.
    pub fn bind(
        &self,
        local: &str,
        remote: &str,
        space: IdSpace,
    ) -> Result<BindOutcome, RegistryError> {
        let mut maps = self.space(space).write();

        let existing_remote = maps.local_to_remote.get(local);
        let existing_local = maps.remote_to_local.get(remote);

        match (existing_remote, existing_local) {
            (Some(r), Some(l)) if r == remote && l == local => {
                return Ok(BindOutcome::AlreadyBound);
            }
            (Some(r), _) => {
                return Err(RegistryError::DuplicateBinding {
                    space,
                    local: local.to_string(),
                    remote: remote.to_string(),
                    existing: r.clone(),
                });
            }
            (None, Some(l)) => {
                return Err(RegistryError::DuplicateBinding {
                    space,
                    local: local.to_string(),
                    remote: remote.to_string(),
                    existing: l.clone(),
                });
            }
            (None, None) => {}
        }

        maps.local_to_remote
            .insert(local.to_string(), remote.to_string());
        maps.remote_to_local
            .insert(remote.to_string(), local.to_string());
        Ok(BindOutcome::Created)
    }

    /// Remote id bound to `local`, if any.
    #[must_use]
    pub fn resolve_remote(&self, local: &str, space: IdSpace) -> Option<String> {
        self.space(space).read().local_to_remote.get(local).cloned()
    }

    /// Local id bound to `remote`, if any.
    #[must_use]
    pub fn resolve_local(&self, remote: &str, space: IdSpace) -> Option<String> {
        self.space(space).read().remote_to_local.get(remote).cloned()
    }

    /// Record that `id` was assigned by this gateway's client-id scheme.
    pub fn mark_local_origin(&self, id: &str) {
        self.local_origin.write().insert(id.to_string());
    }

    /// Whether cancels for `id` must carry it as the client order id.
    #[must_use]
    pub fn is_local_origin(&self, id: &str) -> bool {
        self.local_origin.read().contains(id)
    }

    /// Number of bindings in `space`.
    #[must_use]
    pub fn len(&self, space: IdSpace) -> usize {
        self.space(space).read().local_to_remote.len()
    }

    /// Whether `space` holds no bindings.
    #[must_use]
    pub fn is_empty(&self, space: IdSpace) -> bool {
        self.len(space) == 0
    }
}

// =============================================================================
// Local Id Allocator
// =============================================================================

/// Width of the zero-padded counter suffix.
pub const COUNTER_WIDTH: usize = 6;

/// Connection-time prefix format (`yyMMddHHmmss`).
pub const PREFIX_FORMAT: &str = "%y%m%d%H%M%S";

#[derive(Debug)]
struct AllocatorState {
    prefix: String,
    counter: u64,
}

/// Mints local order ids as `prefix + zero-padded counter`.
///
/// The counter is monotonic for the allocator's lifetime and survives
/// re-prefixing on reconnect, so ids never repeat.
#[derive(Debug)]
pub struct LocalIdAllocator {
    state: Mutex<AllocatorState>,
}

impl LocalIdAllocator {
    /// Create an allocator with an explicit prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(AllocatorState {
                prefix: prefix.into(),
                counter: 0,
            }),
        }
    }

    /// Create an allocator prefixed with `connect_time`.
    #[must_use]
    pub fn from_connect_time(connect_time: DateTime<FixedOffset>) -> Self {
        Self::new(connect_time.format(PREFIX_FORMAT).to_string())
    }

    /// Replace the prefix after a new connection. The counter is kept.
    pub fn set_connect_time(&self, connect_time: DateTime<FixedOffset>) {
        self.state.lock().prefix = connect_time.format(PREFIX_FORMAT).to_string();
    }

    /// Mint the next local id.
    pub fn allocate(&self) -> String {
        let mut state = self.state.lock();
        state.counter += 1;
        format!(
            "{}{:0width$}",
            state.prefix,
            state.counter,
            width = COUNTER_WIDTH
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;
    use proptest::prelude::*;

    use super::*;
    use crate::domain::trading::reporting_offset;

    #[test]
    fn bind_then_resolve_both_directions() {
        let registry = IdentifierRegistry::new();
        let outcome = registry.bind("L1", "R1", IdSpace::Regular).unwrap();

        assert_eq!(outcome, BindOutcome::Created);
        assert_eq!(
            registry.resolve_remote("L1", IdSpace::Regular).as_deref(),
            Some("R1")
        );
        assert_eq!(
            registry.resolve_local("R1", IdSpace::Regular).as_deref(),
            Some("L1")
        );
    }

    #[test]
    fn spaces_are_independent() {
        let registry = IdentifierRegistry::new();
        registry.bind("L1", "R1", IdSpace::Regular).unwrap();

        assert!(registry.resolve_remote("L1", IdSpace::Stop).is_none());
        assert_eq!(
            registry.bind("L1", "A1", IdSpace::Stop).unwrap(),
            BindOutcome::Created
        );
        assert_eq!(registry.len(IdSpace::Regular), 1);
        assert_eq!(registry.len(IdSpace::Stop), 1);
    }

    #[test]
    fn duplicate_local_keeps_original() {
        let registry = IdentifierRegistry::new();
        registry.bind("L1", "R1", IdSpace::Regular).unwrap();

        let err = registry.bind("L1", "R2", IdSpace::Regular).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateBinding {
                space: IdSpace::Regular,
                local: "L1".to_string(),
                remote: "R2".to_string(),
                existing: "R1".to_string(),
            }
        );
        assert_eq!(
            registry.resolve_remote("L1", IdSpace::Regular).as_deref(),
            Some("R1")
        );
        assert!(registry.resolve_local("R2", IdSpace::Regular).is_none());
    }

    #[test]
    fn duplicate_remote_keeps_original() {
        let registry = IdentifierRegistry::new();
        registry.bind("L1", "R1", IdSpace::Stop).unwrap();

        assert!(registry.bind("L2", "R1", IdSpace::Stop).is_err());
        assert_eq!(
            registry.resolve_local("R1", IdSpace::Stop).as_deref(),
            Some("L1")
        );
        assert!(registry.resolve_remote("L2", IdSpace::Stop).is_none());
    }

    #[test]
    fn local_origin_tracking() {
        let registry = IdentifierRegistry::new();
        assert!(!registry.is_local_origin("L1"));
        registry.mark_local_origin("L1");
        assert!(registry.is_local_origin("L1"));
    }

    #[test]
    fn allocator_formats_prefix_and_counter() {
        let connect_time = reporting_offset()
            .with_ymd_and_hms(2026, 10, 18, 9, 30, 5)
            .unwrap();
        let allocator = LocalIdAllocator::from_connect_time(connect_time);

        assert_eq!(allocator.allocate(), "261018093005000001");
        assert_eq!(allocator.allocate(), "261018093005000002");
    }

    #[test]
    fn allocator_counter_survives_reprefix() {
        let allocator = LocalIdAllocator::new("A");
        assert_eq!(allocator.allocate(), "A000001");

        let later = reporting_offset()
            .with_ymd_and_hms(2026, 10, 18, 10, 0, 0)
            .unwrap();
        allocator.set_connect_time(later);
        assert_eq!(allocator.allocate(), "261018100000000002");
    }

    #[test]
    fn allocator_is_collision_free_across_threads() {
        let allocator = Arc::new(LocalIdAllocator::new("P"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let allocator = Arc::clone(&allocator);
                std::thread::spawn(move || (0..250).map(|_| allocator.allocate()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 2000);
    }

    proptest! {
        #[test]
        fn bind_resolve_round_trip(local in "[0-9]{6,18}", remote in "[0-9]{6,18}") {
            let registry = IdentifierRegistry::new();
            prop_assert_eq!(registry.bind(&local, &remote, IdSpace::Regular), Ok(BindOutcome::Created));
            prop_assert_eq!(registry.resolve_remote(&local, IdSpace::Regular), Some(remote.clone()));
            prop_assert_eq!(registry.resolve_local(&remote, IdSpace::Regular), Some(local.clone()));
        }

        #[test]
        fn rebinding_same_pair_is_idempotent(
            local in "[a-z0-9]{1,12}",
            remote in "[a-z0-9]{1,12}",
            repeats in 1usize..5,
        ) {
            let registry = IdentifierRegistry::new();
            registry.bind(&local, &remote, IdSpace::Stop).unwrap();
            for _ in 0..repeats {
                prop_assert_eq!(
                    registry.bind(&local, &remote, IdSpace::Stop),
                    Ok(BindOutcome::AlreadyBound)
                );
            }
            prop_assert_eq!(registry.len(IdSpace::Stop), 1);
        }

        #[test]
        fn conflicting_bind_never_overwrites(
            local in "[a-z]{1,8}",
            first in "[0-9]{1,8}",
            second in "[0-9]{1,8}",
        ) {
            prop_assume!(first != second);
            let registry = IdentifierRegistry::new();
            registry.bind(&local, &first, IdSpace::Regular).unwrap();

            prop_assert!(registry.bind(&local, &second, IdSpace::Regular).is_err());
            prop_assert_eq!(registry.resolve_remote(&local, IdSpace::Regular), Some(first));
        }
    }
}
