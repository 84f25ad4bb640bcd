//! Hierarchy engine facade and read-only queries.
//!
//! # Responsibility
//! - Own the engine configuration passed in by the caller.
//! - Answer structural queries over a caller-owned state.
//!
//! # Invariants
//! - Every query builds one fresh index and reuses it for the whole call.
//! - Queries never mutate state.

use crate::hierarchy::config::{ConfigError, HierarchyConfig};
use crate::hierarchy::cycle_guard;
use crate::hierarchy::index::EntityIndex;
use crate::model::entity::{Entity, EntityId, EntityType};
use crate::model::state::HierarchyState;
use log::debug;
use std::collections::HashSet;

/// Stateless hierarchy engine bound to one configuration.
#[derive(Debug, Clone, Default)]
pub struct HierarchyEngine {
    config: HierarchyConfig,
}

impl HierarchyEngine {
    /// Creates an engine after validating `config`.
    pub fn try_new(config: HierarchyConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &HierarchyConfig {
        &self.config
    }

    /// Allowed-edges lookup against the configured table.
    pub fn is_link_allowed(&self, parent: EntityType, child: EntityType) -> bool {
        self.config.allowed_edges.is_link_allowed(parent, child)
    }

    /// Runs the one-time relational field-default step on every entity.
    ///
    /// A `children` map created here is filled from the `parentId` links
    /// that already point at its owner. Maps that existed before are left
    /// alone so the validator still sees their drift.
    ///
    /// Returns how many entities changed.
    pub fn initialize(&self, state: &mut HierarchyState) -> usize {
        let fresh_maps: HashSet<EntityId> = state
            .iter()
            .filter(|entity| entity.children.is_none())
            .map(|entity| entity.id.clone())
            .collect();
        let initialized = state
            .iter_mut()
            .map(Entity::initialize_relational_fields)
            .filter(|changed| *changed)
            .count();

        let existing_links: Vec<(EntityId, EntityType, EntityId)> = state
            .iter()
            .filter_map(|child| {
                let parent_id = child.parent_id.as_ref()?;
                fresh_maps
                    .contains(parent_id)
                    .then(|| (parent_id.clone(), child.kind, child.id.clone()))
            })
            .collect();
        let mut mirrored = 0;
        for (parent_id, child_kind, child_id) in existing_links {
            if let Some(parent) = state.find_mut(&parent_id) {
                if parent.list_child(child_kind, &child_id) {
                    mirrored += 1;
                }
            }
        }

        debug!(
            "event=hierarchy_initialize module=hierarchy status=ok initialized={initialized} mirrored={mirrored}"
        );
        initialized
    }

    /// Direct children of `id`, in collection order.
    pub fn children_of<'s>(&self, state: &'s HierarchyState, id: &str) -> Vec<&'s Entity> {
        let index = EntityIndex::build(state);
        index
            .children_of(id)
            .iter()
            .filter_map(|child| index.get(child))
            .collect()
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors<'s>(&self, state: &'s HierarchyState, id: &str) -> Vec<&'s Entity> {
        cycle_guard::ancestors(&EntityIndex::build(state), id)
    }

    /// Every entity below `id`, breadth first.
    pub fn descendants<'s>(&self, state: &'s HierarchyState, id: &str) -> Vec<&'s Entity> {
        cycle_guard::descendants(&EntityIndex::build(state), id)
    }

    /// Depth of `id`; roots are `0`.
    pub fn depth(&self, state: &HierarchyState, id: &str) -> usize {
        cycle_guard::depth(&EntityIndex::build(state), id)
    }

    /// Entities whose parent is absent or dangling.
    pub fn roots<'s>(&self, state: &'s HierarchyState) -> Vec<&'s Entity> {
        let index = EntityIndex::build(state);
        index
            .entities()
            .filter(|entity| {
                entity
                    .effective_parent_id()
                    .map_or(true, |parent_id| !index.contains(parent_id))
            })
            .collect()
    }

    /// Whether linking `child_id` under `parent_id` would close a cycle.
    pub fn would_create_cycle(&self, state: &HierarchyState, parent_id: &str, child_id: &str) -> bool {
        cycle_guard::would_create_cycle(&EntityIndex::build(state), parent_id, child_id)
    }
}

#[cfg(test)]
mod tests {
    use super::HierarchyEngine;
    use crate::hierarchy::config::{ConfigError, HierarchyConfig};
    use crate::model::entity::{Entity, EntityType};
    use crate::model::state::HierarchyState;

    fn sample() -> HierarchyState {
        HierarchyState::new()
            .with(Entity::with_id("d1", EntityType::Domain))
            .with(Entity::with_id("p1", EntityType::Project).with_parent("d1"))
            .with(Entity::with_id("t1", EntityType::Task).with_parent("p1"))
            .with(Entity::with_id("n1", EntityType::Note).with_parent("ghost"))
    }

    #[test]
    fn try_new_rejects_invalid_config() {
        let err = HierarchyEngine::try_new(HierarchyConfig::default().with_limits(0, 1))
            .expect_err("invalid config must fail");
        assert_eq!(err, ConfigError::ZeroChildLimit);
    }

    #[test]
    fn roots_include_dangling_links() {
        let engine = HierarchyEngine::default();
        let state = sample();
        let roots: Vec<&str> = engine
            .roots(&state)
            .into_iter()
            .map(|entity| entity.id.as_str())
            .collect();
        assert_eq!(roots, ["d1", "n1"]);
    }

    #[test]
    fn initialize_counts_only_changed_entities() {
        let engine = HierarchyEngine::default();
        let mut state = sample();
        assert_eq!(engine.initialize(&mut state), 4);
        assert_eq!(engine.initialize(&mut state), 0);
        assert!(state.iter().all(Entity::is_initialized));
    }

    #[test]
    fn initialize_mirrors_existing_parent_links() {
        let engine = HierarchyEngine::default();
        let mut state = HierarchyState::new()
            .with(Entity::with_id("d1", EntityType::Domain))
            .with(
                Entity::with_id("p1", EntityType::Project)
                    .with_parent("d1")
                    .with_legacy_ancestors(None, Some("d1")),
            );

        assert_eq!(engine.initialize(&mut state), 2);

        let domain = state.get(EntityType::Domain, "d1").unwrap();
        let listed = domain.children.as_ref().unwrap();
        assert_eq!(listed.get(&EntityType::Project).unwrap(), &vec!["p1".to_string()]);
        assert!(engine.validate_hierarchy(&state).is_empty());
    }

    #[test]
    fn initialize_keeps_existing_children_maps() {
        let engine = HierarchyEngine::default();
        let mut state = sample();
        engine.initialize(&mut state);
        state
            .get_mut(EntityType::Project, "p1")
            .unwrap()
            .children
            .as_mut()
            .unwrap()
            .clear();

        assert_eq!(engine.initialize(&mut state), 0);
        let project = state.get(EntityType::Project, "p1").unwrap();
        assert!(project.children.as_ref().unwrap().is_empty());
    }

    #[test]
    fn queries_share_guarded_walks() {
        let engine = HierarchyEngine::default();
        let state = sample();
        assert_eq!(engine.depth(&state, "t1"), 2);
        assert_eq!(engine.descendants(&state, "d1").len(), 2);
        assert_eq!(engine.children_of(&state, "p1")[0].id, "t1");
        assert!(engine.would_create_cycle(&state, "t1", "d1"));
    }
}
