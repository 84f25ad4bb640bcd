//! Per-entity lock flags and bulk lock helpers.
//!
//! # Responsibility
//! - Read and write `move`/`hierarchy` flags on single entities.
//! - Report locked entities and lock counts across the state.
//! - Apply one lock to many ids with a per-id outcome.
//!
//! # Invariants
//! - An entity without a `locks` record is unlocked.
//! - Unknown lock names are a no-op that reports `false`.
//! - One bad id never aborts a batch.

use crate::model::entity::{Entity, EntityId, EntityType, Locks};
use crate::model::state::HierarchyState;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Lock class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockKind {
    /// Layout repositioning.
    Move,
    /// Parent-link changes.
    Hierarchy,
}

impl LockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Hierarchy => "hierarchy",
        }
    }

    /// Parses a lock name. Unknown names yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "move" => Some(Self::Move),
            "hierarchy" => Some(Self::Hierarchy),
            _ => None,
        }
    }
}

impl Display for LockKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `entity` carries lock `kind`.
pub fn is_locked(entity: &Entity, kind: LockKind) -> bool {
    let Some(locks) = entity.locks else {
        return false;
    };
    match kind {
        LockKind::Move => locks.move_locked,
        LockKind::Hierarchy => locks.hierarchy_locked,
    }
}

/// Sets lock `kind` on `entity`, creating the lock record when absent.
pub fn set_lock(entity: &mut Entity, kind: LockKind, value: bool) {
    let locks = entity.locks.get_or_insert_with(Locks::default);
    match kind {
        LockKind::Move => locks.move_locked = value,
        LockKind::Hierarchy => locks.hierarchy_locked = value,
    }
}

/// Name-keyed [`is_locked`]; unknown names report `false`.
pub fn is_locked_named(entity: &Entity, kind: &str) -> bool {
    LockKind::parse(kind).is_some_and(|kind| is_locked(entity, kind))
}

/// Name-keyed [`set_lock`]; unknown names leave the entity untouched.
///
/// Returns whether the lock name was recognized.
pub fn set_lock_named(entity: &mut Entity, kind: &str, value: bool) -> bool {
    match LockKind::parse(kind) {
        Some(kind) => {
            set_lock(entity, kind, value);
            true
        }
        None => false,
    }
}

/// Whether layout may reposition `entity`.
pub fn can_move(entity: &Entity) -> bool {
    !is_locked(entity, LockKind::Move)
}

/// Whether the parent link of `entity` may change.
pub fn can_change_hierarchy(entity: &Entity) -> bool {
    !is_locked(entity, LockKind::Hierarchy)
}

/// Entities carrying lock `kind`, or any lock when `kind` is `None`.
pub fn list_locked(state: &HierarchyState, kind: Option<LockKind>) -> Vec<&Entity> {
    state
        .iter()
        .filter(|entity| match kind {
            Some(kind) => is_locked(entity, kind),
            None => !can_move(entity) || !can_change_hierarchy(entity),
        })
        .collect()
}

/// Lock counts for one entity type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockCounts {
    pub total: usize,
    pub move_locked: usize,
    pub hierarchy_locked: usize,
}

/// State-wide lock counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStatistics {
    pub total_entities: usize,
    pub move_locked: usize,
    pub hierarchy_locked: usize,
    /// Entities with at least one lock set.
    pub any_locked: usize,
    pub by_type: BTreeMap<EntityType, LockCounts>,
}

/// Counts locks by kind and by entity type.
pub fn lock_statistics(state: &HierarchyState) -> LockStatistics {
    let mut stats = LockStatistics::default();
    for entity in state.iter() {
        let move_locked = is_locked(entity, LockKind::Move);
        let hierarchy_locked = is_locked(entity, LockKind::Hierarchy);
        let counts = stats.by_type.entry(entity.kind).or_default();

        counts.total += 1;
        stats.total_entities += 1;
        if move_locked {
            counts.move_locked += 1;
            stats.move_locked += 1;
        }
        if hierarchy_locked {
            counts.hierarchy_locked += 1;
            stats.hierarchy_locked += 1;
        }
        if move_locked || hierarchy_locked {
            stats.any_locked += 1;
        }
    }
    stats
}

/// One failed item of a batch lock request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchLockFailure {
    pub id: String,
    pub reason: String,
}

/// Per-id outcome of [`set_lock_many`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchLockReport {
    pub requested: usize,
    pub succeeded: Vec<EntityId>,
    pub failed: Vec<BatchLockFailure>,
}

impl BatchLockReport {
    /// `true` iff no item failed.
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Applies lock `kind = value` to every id, collecting per-id outcomes.
pub fn set_lock_many<I, S>(
    state: &mut HierarchyState,
    ids: I,
    kind: LockKind,
    value: bool,
) -> BatchLockReport
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut report = BatchLockReport::default();
    for id in ids {
        let id = id.as_ref().trim();
        report.requested += 1;
        if id.is_empty() {
            report.failed.push(BatchLockFailure {
                id: id.to_string(),
                reason: "empty id".to_string(),
            });
            continue;
        }
        match state.find_mut(id) {
            Some(entity) => {
                set_lock(entity, kind, value);
                report.succeeded.push(entity.id.clone());
            }
            None => report.failed.push(BatchLockFailure {
                id: id.to_string(),
                reason: "not_found".to_string(),
            }),
        }
    }

    debug!(
        "event=lock_batch module=locks status={} kind={} value={} requested={} failed={}",
        if report.success() { "ok" } else { "partial" },
        kind,
        value,
        report.requested,
        report.failed.len()
    );
    report
}
