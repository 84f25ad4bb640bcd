//! Relational mutations: attach, detach, move.
//!
//! # Responsibility
//! - Be the only code path that writes `parentId`, ancestor caches and
//!   `children` mirrors.
//! - Run every rule check before the first write.
//!
//! # Invariants
//! - A hierarchy-locked child is rejected before any other rule is checked.
//! - Every mutation commits as one transaction: the touched entities are
//!   snapshotted and restored if any write step fails.
//! - Ancestor caches of the whole moved subtree are refreshed in the same
//!   commit.
//! - Rejections return `MutationError`; nothing panics or logs to stdout.

use crate::hierarchy::cycle_guard;
use crate::hierarchy::index::EntityIndex;
use crate::hierarchy::locks;
use crate::hierarchy::registry::{resolve_ancestor_caches, AncestorCaches};
use crate::model::entity::{Entity, EntityId, EntityType};
use crate::model::state::HierarchyState;
use crate::service::engine::HierarchyEngine;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type used by relational mutations.
pub type MutationResult<T> = Result<T, MutationError>;

/// Why a relational mutation was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    /// No entity of `kind` with `id` exists.
    NotFound { kind: EntityType, id: EntityId },
    /// The allowed-edges table forbids this pair.
    Disallowed {
        parent_type: EntityType,
        child_type: EntityType,
    },
    /// The link would make `child_id` its own ancestor.
    Cycle {
        parent_id: EntityId,
        child_id: EntityId,
    },
    /// The child carries a hierarchy lock.
    Locked { id: EntityId },
}

impl MutationError {
    /// Stable wire code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Disallowed { .. } => "disallowed",
            Self::Cycle { .. } => "cycle",
            Self::Locked { .. } => "locked",
        }
    }
}

impl Display for MutationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            Self::Disallowed {
                parent_type,
                child_type,
            } => write!(f, "a {parent_type} may not contain a {child_type}"),
            Self::Cycle {
                parent_id,
                child_id,
            } => write!(
                f,
                "linking {child_id} under {parent_id} would create a cycle"
            ),
            Self::Locked { id } => write!(f, "hierarchy is locked for {id}"),
        }
    }
}

impl Error for MutationError {}

/// Attach `child` under `parent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachRequest {
    pub parent_type: EntityType,
    pub parent_id: EntityId,
    pub child_type: EntityType,
    pub child_id: EntityId,
}

impl AttachRequest {
    pub fn new(
        parent_type: EntityType,
        parent_id: impl Into<EntityId>,
        child_type: EntityType,
        child_id: impl Into<EntityId>,
    ) -> Self {
        Self {
            parent_type,
            parent_id: parent_id.into(),
            child_type,
            child_id: child_id.into(),
        }
    }
}

/// Detach `child` from its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachRequest {
    pub child_type: EntityType,
    pub child_id: EntityId,
}

impl DetachRequest {
    pub fn new(child_type: EntityType, child_id: impl Into<EntityId>) -> Self {
        Self {
            child_type,
            child_id: child_id.into(),
        }
    }
}

/// Move `child` under a new parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub to_parent_type: EntityType,
    pub to_parent_id: EntityId,
    pub child_type: EntityType,
    pub child_id: EntityId,
}

impl MoveRequest {
    pub fn new(
        to_parent_type: EntityType,
        to_parent_id: impl Into<EntityId>,
        child_type: EntityType,
        child_id: impl Into<EntityId>,
    ) -> Self {
        Self {
            to_parent_type,
            to_parent_id: to_parent_id.into(),
            child_type,
            child_id: child_id.into(),
        }
    }
}

/// Successful attach/detach.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkOutcome {
    /// Child as committed.
    pub child: Entity,
    /// Canonical parent before the mutation.
    pub previous_parent_id: Option<EntityId>,
}

/// Successful move.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOutcome {
    pub child: Entity,
    pub from: Option<EntityId>,
    pub to: EntityId,
    /// `false` when the destination already was the parent.
    pub changed: bool,
}

/// Parent link to commit for one child.
struct LinkChange<'r> {
    child_type: EntityType,
    child_id: &'r str,
    new_parent: Option<(EntityType, &'r str)>,
}

/// Pre-mutation copies of every entity a commit may touch.
struct Snapshot {
    saved: Vec<Entity>,
}

impl Snapshot {
    fn capture(state: &HierarchyState, touched: &Touched) -> Self {
        let saved = touched
            .all()
            .filter_map(|(kind, id)| state.get(*kind, id).cloned())
            .collect();
        Self { saved }
    }

    fn restore(self, state: &mut HierarchyState) {
        for saved in self.saved {
            if let Some(slot) = state.get_mut(saved.kind, &saved.id) {
                *slot = saved;
            }
        }
    }
}

impl HierarchyEngine {
    /// Links `child` under `parent`, replacing any previous parent.
    ///
    /// Checks run in order: existence, child hierarchy lock, cycle, allowed
    /// edge.
    pub fn attach(
        &self,
        request: &AttachRequest,
        state: &mut HierarchyState,
    ) -> MutationResult<LinkOutcome> {
        let result = self.try_attach(request, state);
        match &result {
            Ok(outcome) => debug!(
                "event=hierarchy_attach module=hierarchy status=ok parent_id={} child_id={} previous_parent_id={}",
                request.parent_id,
                request.child_id,
                outcome.previous_parent_id.as_deref().unwrap_or("none")
            ),
            Err(err) => warn!(
                "event=hierarchy_attach module=hierarchy status=rejected error_code={} parent_id={} child_id={}",
                err.code(),
                request.parent_id,
                request.child_id
            ),
        }
        result
    }

    /// Clears the parent link and ancestor caches of `child`.
    pub fn detach(
        &self,
        request: &DetachRequest,
        state: &mut HierarchyState,
    ) -> MutationResult<LinkOutcome> {
        let result = self.try_detach(request, state);
        match &result {
            Ok(outcome) => debug!(
                "event=hierarchy_detach module=hierarchy status=ok child_id={} previous_parent_id={}",
                request.child_id,
                outcome.previous_parent_id.as_deref().unwrap_or("none")
            ),
            Err(err) => warn!(
                "event=hierarchy_detach module=hierarchy status=rejected error_code={} child_id={}",
                err.code(),
                request.child_id
            ),
        }
        result
    }

    /// Re-parents `child` under the destination as one transaction.
    ///
    /// Succeeds without writing when the destination already is the parent.
    pub fn move_to(
        &self,
        request: &MoveRequest,
        state: &mut HierarchyState,
    ) -> MutationResult<MoveOutcome> {
        let result = self.try_move(request, state);
        match &result {
            Ok(outcome) => debug!(
                "event=hierarchy_move module=hierarchy status=ok child_id={} from={} to={} changed={}",
                request.child_id,
                outcome.from.as_deref().unwrap_or("none"),
                outcome.to,
                outcome.changed
            ),
            Err(err) => warn!(
                "event=hierarchy_move module=hierarchy status=rejected error_code={} child_id={} to={}",
                err.code(),
                request.child_id,
                request.to_parent_id
            ),
        }
        result
    }

    fn try_attach(
        &self,
        request: &AttachRequest,
        state: &mut HierarchyState,
    ) -> MutationResult<LinkOutcome> {
        let previous_parent_id = {
            let index = EntityIndex::build(state);
            let child = self.check_link(
                &index,
                state,
                request.parent_type,
                &request.parent_id,
                request.child_type,
                &request.child_id,
            )?;
            child.parent_id.clone()
        };

        let child = self.commit(
            state,
            LinkChange {
                child_type: request.child_type,
                child_id: &request.child_id,
                new_parent: Some((request.parent_type, &request.parent_id)),
            },
        )?;
        Ok(LinkOutcome {
            child,
            previous_parent_id,
        })
    }

    fn try_detach(
        &self,
        request: &DetachRequest,
        state: &mut HierarchyState,
    ) -> MutationResult<LinkOutcome> {
        let child = require(state, request.child_type, &request.child_id)?;
        ensure_unlocked(child)?;
        let previous_parent_id = child.parent_id.clone();
        if child.parent_id.is_none() && child.project_id.is_none() && child.domain_id.is_none() {
            return Ok(LinkOutcome {
                child: child.clone(),
                previous_parent_id,
            });
        }

        let child = self.commit(
            state,
            LinkChange {
                child_type: request.child_type,
                child_id: &request.child_id,
                new_parent: None,
            },
        )?;
        Ok(LinkOutcome {
            child,
            previous_parent_id,
        })
    }

    fn try_move(
        &self,
        request: &MoveRequest,
        state: &mut HierarchyState,
    ) -> MutationResult<MoveOutcome> {
        let from = {
            let child = require(state, request.child_type, &request.child_id)?;
            require(state, request.to_parent_type, &request.to_parent_id)?;
            ensure_unlocked(child)?;
            if child.parent_id.as_deref() == Some(request.to_parent_id.as_str()) {
                return Ok(MoveOutcome {
                    child: child.clone(),
                    from: child.parent_id.clone(),
                    to: request.to_parent_id.clone(),
                    changed: false,
                });
            }

            let index = EntityIndex::build(state);
            self.check_link(
                &index,
                state,
                request.to_parent_type,
                &request.to_parent_id,
                request.child_type,
                &request.child_id,
            )?;
            child.parent_id.clone()
        };

        // Detach and attach are one commit: the child is never left parentless.
        let child = self.commit(
            state,
            LinkChange {
                child_type: request.child_type,
                child_id: &request.child_id,
                new_parent: Some((request.to_parent_type, &request.to_parent_id)),
            },
        )?;
        Ok(MoveOutcome {
            child,
            from,
            to: request.to_parent_id.clone(),
            changed: true,
        })
    }

    /// Runs every pre-write rule for linking `child_id` under `parent_id`.
    fn check_link<'s>(
        &self,
        index: &EntityIndex<'_>,
        state: &'s HierarchyState,
        parent_type: EntityType,
        parent_id: &str,
        child_type: EntityType,
        child_id: &str,
    ) -> MutationResult<&'s Entity> {
        require(state, parent_type, parent_id)?;
        let child = require(state, child_type, child_id)?;
        ensure_unlocked(child)?;
        if cycle_guard::would_create_cycle(index, parent_id, child_id) {
            return Err(MutationError::Cycle {
                parent_id: parent_id.to_string(),
                child_id: child_id.to_string(),
            });
        }
        if !self.is_link_allowed(parent_type, child_type) {
            return Err(MutationError::Disallowed {
                parent_type,
                child_type,
            });
        }
        Ok(child)
    }

    /// Writes one validated link change, restoring the snapshot on failure.
    fn commit(&self, state: &mut HierarchyState, change: LinkChange<'_>) -> MutationResult<Entity> {
        let touched = Touched::collect(state, &change);
        let snapshot = Snapshot::capture(state, &touched);
        match apply_link(state, &change, &touched) {
            Ok(child) => Ok(child),
            Err(err) => {
                snapshot.restore(state);
                warn!(
                    "event=hierarchy_commit module=hierarchy status=rolled_back child_id={} error_code={}",
                    change.child_id,
                    err.code()
                );
                Err(err)
            }
        }
    }
}

fn require<'s>(
    state: &'s HierarchyState,
    kind: EntityType,
    id: &str,
) -> MutationResult<&'s Entity> {
    state.get(kind, id).ok_or_else(|| MutationError::NotFound {
        kind,
        id: id.to_string(),
    })
}

fn ensure_unlocked(child: &Entity) -> MutationResult<()> {
    if locks::can_change_hierarchy(child) {
        Ok(())
    } else {
        Err(MutationError::Locked {
            id: child.id.clone(),
        })
    }
}

/// Entities one link change may write.
struct Touched {
    /// Child, old parent and new parent.
    endpoints: Vec<(EntityType, EntityId)>,
    /// The child's subtree, breadth first so parents precede their children.
    subtree: Vec<(EntityType, EntityId)>,
}

impl Touched {
    fn collect(state: &HierarchyState, change: &LinkChange<'_>) -> Self {
        let index = EntityIndex::build(state);
        let mut endpoints = vec![(change.child_type, change.child_id.to_string())];
        let old_parent = index
            .get(change.child_id)
            .and_then(|child| child.parent_id.as_deref())
            .and_then(|parent_id| index.get(parent_id));
        if let Some(parent) = old_parent {
            endpoints.push((parent.kind, parent.id.clone()));
        }
        if let Some((kind, id)) = change.new_parent {
            endpoints.push((kind, id.to_string()));
        }
        let subtree = cycle_guard::descendants(&index, change.child_id)
            .into_iter()
            .map(|entity| (entity.kind, entity.id.clone()))
            .collect();
        Self { endpoints, subtree }
    }

    fn all(&self) -> impl Iterator<Item = &(EntityType, EntityId)> {
        self.endpoints.iter().chain(self.subtree.iter())
    }
}

fn apply_link(
    state: &mut HierarchyState,
    change: &LinkChange<'_>,
    touched: &Touched,
) -> MutationResult<Entity> {
    let previous_parent_id = require(state, change.child_type, change.child_id)?
        .parent_id
        .clone();
    let new_parent_id = change.new_parent.map(|(_, id)| id);

    if let Some(previous) = previous_parent_id.as_deref() {
        if Some(previous) != new_parent_id {
            if let Some(old_parent) = state.find_mut(previous) {
                if old_parent.unlist_child(change.child_id) {
                    old_parent.touch();
                }
            }
        }
    }

    let caches = match change.new_parent {
        Some((parent_type, parent_id)) => {
            let caches = resolve_ancestor_caches(
                require(state, parent_type, parent_id)?,
                change.child_type,
            );
            let parent = state
                .get_mut(parent_type, parent_id)
                .ok_or_else(|| MutationError::NotFound {
                    kind: parent_type,
                    id: parent_id.to_string(),
                })?;
            if parent.list_child(change.child_type, change.child_id) {
                parent.touch();
            }
            caches
        }
        None => AncestorCaches::default(),
    };

    let child = state
        .get_mut(change.child_type, change.child_id)
        .ok_or_else(|| MutationError::NotFound {
            kind: change.child_type,
            id: change.child_id.to_string(),
        })?;
    child.parent_id = new_parent_id.map(str::to_string);
    caches.apply_to(child);
    child.touch();
    let committed = child.clone();

    for (kind, id) in &touched.subtree {
        refresh_caches(state, *kind, id)?;
    }

    Ok(committed)
}

/// Recomputes one descendant's caches from its current parent.
///
/// Descendants linked only through legacy pointers are left for migration.
fn refresh_caches(state: &mut HierarchyState, kind: EntityType, id: &str) -> MutationResult<()> {
    let not_found = || MutationError::NotFound {
        kind,
        id: id.to_string(),
    };
    let Some(parent_id) = require(state, kind, id)?.parent_id.clone() else {
        return Ok(());
    };
    let caches = match state.find(&parent_id) {
        Some(parent) => resolve_ancestor_caches(parent, kind),
        None => return Err(not_found()),
    };
    let entity = state.get_mut(kind, id).ok_or_else(not_found)?;
    if caches.apply_to(entity) {
        entity.touch();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{LinkChange, MutationError};
    use crate::model::entity::{Entity, EntityType};
    use crate::model::state::HierarchyState;
    use crate::service::engine::HierarchyEngine;

    #[test]
    fn failed_commit_restores_every_touched_entity() {
        let engine = HierarchyEngine::default();
        let mut state = HierarchyState::new()
            .with(Entity::with_id("p1", EntityType::Project))
            .with(Entity::with_id("t1", EntityType::Task).with_parent("p1"));
        engine.initialize(&mut state);
        state
            .get_mut(EntityType::Project, "p1")
            .expect("p1")
            .list_child(EntityType::Task, "t1");
        let before = state.clone();

        // Write steps run before the missing parent is discovered.
        let err = engine
            .commit(
                &mut state,
                LinkChange {
                    child_type: EntityType::Task,
                    child_id: "t1",
                    new_parent: Some((EntityType::Project, "gone")),
                },
            )
            .expect_err("missing parent must fail the commit");

        assert!(matches!(err, MutationError::NotFound { .. }));
        assert_eq!(state, before);
    }
}
