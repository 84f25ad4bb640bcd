//! Read-only id and adjacency index over one state snapshot.
//!
//! # Responsibility
//! - Map ids to entities across all per-type collections.
//! - Derive the parent -> children adjacency from parent links.
//!
//! # Invariants
//! - Built fresh per call; never maintained incrementally.
//! - The first occurrence of an id wins; later ones are recorded as duplicates.
//! - Adjacency uses `parentId`, falling back to legacy `projectId`/`domainId`.
//! - Child order within one parent follows collection order.

use crate::model::entity::Entity;
use crate::model::state::HierarchyState;
use std::collections::HashMap;

/// Id lookup and derived adjacency borrowed from one state.
#[derive(Debug)]
pub struct EntityIndex<'a> {
    by_id: HashMap<&'a str, &'a Entity>,
    order: Vec<&'a Entity>,
    children_by_parent_id: HashMap<&'a str, Vec<&'a str>>,
    duplicate_ids: Vec<&'a str>,
}

impl<'a> EntityIndex<'a> {
    /// Indexes every entity in `state`. O(n).
    pub fn build(state: &'a HierarchyState) -> Self {
        let mut by_id = HashMap::with_capacity(state.len());
        let mut order = Vec::with_capacity(state.len());
        let mut duplicate_ids = Vec::new();

        for entity in state.iter() {
            if by_id.contains_key(entity.id.as_str()) {
                duplicate_ids.push(entity.id.as_str());
                continue;
            }
            by_id.insert(entity.id.as_str(), entity);
            order.push(entity);
        }

        let mut children_by_parent_id: HashMap<&'a str, Vec<&'a str>> = HashMap::new();
        for entity in &order {
            if let Some(parent_id) = entity.effective_parent_id() {
                children_by_parent_id
                    .entry(parent_id)
                    .or_default()
                    .push(entity.id.as_str());
            }
        }

        Self {
            by_id,
            order,
            children_by_parent_id,
            duplicate_ids,
        }
    }

    pub fn get(&self, id: &str) -> Option<&'a Entity> {
        self.by_id.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Effective parent id of an indexed entity. May reference a missing id.
    pub fn parent_of(&self, id: &str) -> Option<&'a str> {
        self.get(id).and_then(Entity::effective_parent_id)
    }

    /// Direct child ids of `id`, in collection order.
    pub fn children_of(&self, id: &str) -> &[&'a str] {
        self.children_by_parent_id
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Indexed entities in collection order, duplicates excluded.
    pub fn entities(&self) -> impl Iterator<Item = &'a Entity> + '_ {
        self.order.iter().copied()
    }

    /// Ids seen more than once, one entry per extra occurrence.
    pub fn duplicate_ids(&self) -> &[&'a str] {
        &self.duplicate_ids
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
