//! Caller-owned hierarchy state.
//!
//! # Responsibility
//! - Hold the six parallel per-type collections the engine mutates in place.
//! - Provide typed and untyped lookups used by every engine operation.
//!
//! # Invariants
//! - `insert` files an entity under the collection matching its `kind`.
//! - Typed lookup only matches entities whose `kind` equals the requested type.

use crate::model::entity::{Entity, EntityType};
use serde::{Deserialize, Serialize};

/// Parallel per-type entity collections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyState {
    pub domains: Vec<Entity>,
    pub projects: Vec<Entity>,
    pub tasks: Vec<Entity>,
    pub ideas: Vec<Entity>,
    pub notes: Vec<Entity>,
    pub checklists: Vec<Entity>,
}

impl HierarchyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the collection for one type.
    pub fn collection(&self, kind: EntityType) -> &[Entity] {
        match kind {
            EntityType::Domain => &self.domains,
            EntityType::Project => &self.projects,
            EntityType::Task => &self.tasks,
            EntityType::Idea => &self.ideas,
            EntityType::Note => &self.notes,
            EntityType::Checklist => &self.checklists,
        }
    }

    /// Returns the mutable collection for one type.
    pub fn collection_mut(&mut self, kind: EntityType) -> &mut Vec<Entity> {
        match kind {
            EntityType::Domain => &mut self.domains,
            EntityType::Project => &mut self.projects,
            EntityType::Task => &mut self.tasks,
            EntityType::Idea => &mut self.ideas,
            EntityType::Note => &mut self.notes,
            EntityType::Checklist => &mut self.checklists,
        }
    }

    /// Appends one entity to the collection matching its type.
    pub fn insert(&mut self, entity: Entity) {
        self.collection_mut(entity.kind).push(entity);
    }

    /// Builder-style variant of [`HierarchyState::insert`].
    pub fn with(mut self, entity: Entity) -> Self {
        self.insert(entity);
        self
    }

    /// Removes one entity by type and id. Deletion is a caller concern; the
    /// engine never calls this.
    pub fn remove(&mut self, kind: EntityType, id: &str) -> Option<Entity> {
        let collection = self.collection_mut(kind);
        let position = collection.iter().position(|entity| entity.id == id)?;
        Some(collection.remove(position))
    }

    /// Typed lookup.
    pub fn get(&self, kind: EntityType, id: &str) -> Option<&Entity> {
        self.collection(kind)
            .iter()
            .find(|entity| entity.id == id && entity.kind == kind)
    }

    /// Typed mutable lookup.
    pub fn get_mut(&mut self, kind: EntityType, id: &str) -> Option<&mut Entity> {
        self.collection_mut(kind)
            .iter_mut()
            .find(|entity| entity.id == id && entity.kind == kind)
    }

    /// Untyped lookup across all collections.
    pub fn find(&self, id: &str) -> Option<&Entity> {
        self.iter().find(|entity| entity.id == id)
    }

    /// Untyped mutable lookup across all collections.
    pub fn find_mut(&mut self, id: &str) -> Option<&mut Entity> {
        self.iter_mut().find(|entity| entity.id == id)
    }

    /// Iterates all entities in collection order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.domains
            .iter()
            .chain(self.projects.iter())
            .chain(self.tasks.iter())
            .chain(self.ideas.iter())
            .chain(self.notes.iter())
            .chain(self.checklists.iter())
    }

    /// Iterates all entities mutably in collection order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.domains
            .iter_mut()
            .chain(self.projects.iter_mut())
            .chain(self.tasks.iter_mut())
            .chain(self.ideas.iter_mut())
            .chain(self.notes.iter_mut())
            .chain(self.checklists.iter_mut())
    }

    pub fn len(&self) -> usize {
        EntityType::all()
            .iter()
            .map(|kind| self.collection(*kind).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
