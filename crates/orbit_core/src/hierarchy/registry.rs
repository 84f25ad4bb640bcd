//! Allowed-edges table and denormalized ancestor rules.
//!
//! # Responsibility
//! - Answer which parent type may contain which child type.
//! - Derive cached `projectId`/`domainId` values for a new parent link.
//!
//! # Invariants
//! - Lookups are pure; no table is global mutable state.
//! - `domain` is never a legal child in the shipped tables.

use crate::model::entity::{Entity, EntityId, EntityType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Parent-type -> child-types relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowedEdges {
    edges: BTreeMap<EntityType, BTreeSet<EntityType>>,
}

impl Default for AllowedEdges {
    fn default() -> Self {
        Self::leaf_terminal()
    }
}

impl AllowedEdges {
    /// Canonical table: notes, ideas and checklists are leaves.
    pub fn leaf_terminal() -> Self {
        use EntityType::{Checklist, Domain, Idea, Note, Project, Task};
        Self::from_pairs([
            (Domain, Project),
            (Domain, Task),
            (Domain, Idea),
            (Domain, Note),
            (Domain, Checklist),
            (Project, Task),
            (Project, Idea),
            (Project, Note),
            (Project, Checklist),
            (Task, Note),
            (Task, Checklist),
        ])
    }

    /// Alternative table where ideas and notes may group other leaves.
    pub fn nested_notes() -> Self {
        use EntityType::{Checklist, Idea, Note};
        let mut table = Self::leaf_terminal();
        for (parent, child) in [
            (Idea, Note),
            (Idea, Idea),
            (Idea, Checklist),
            (Note, Note),
            (Note, Checklist),
        ] {
            table.allow(parent, child);
        }
        table
    }

    /// Table with no permitted edges.
    pub fn empty() -> Self {
        Self {
            edges: BTreeMap::new(),
        }
    }

    /// Builds a table from explicit `(parent, child)` pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (EntityType, EntityType)>) -> Self {
        let mut table = Self::empty();
        for (parent, child) in pairs {
            table.allow(parent, child);
        }
        table
    }

    /// Adds one permitted edge.
    pub fn allow(&mut self, parent: EntityType, child: EntityType) {
        self.edges.entry(parent).or_default().insert(child);
    }

    /// Pure set-membership check.
    pub fn is_link_allowed(&self, parent: EntityType, child: EntityType) -> bool {
        self.edges
            .get(&parent)
            .is_some_and(|children| children.contains(&child))
    }

    /// Child types a parent type may contain.
    pub fn allowed_children(&self, parent: EntityType) -> Vec<EntityType> {
        self.edges
            .get(&parent)
            .map(|children| children.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Parent types that may contain a child type.
    pub fn allowed_parents(&self, child: EntityType) -> Vec<EntityType> {
        self.pairs()
            .filter(|(_, candidate)| *candidate == child)
            .map(|(parent, _)| parent)
            .collect()
    }

    /// Iterates every permitted `(parent, child)` pair.
    pub fn pairs(&self) -> impl Iterator<Item = (EntityType, EntityType)> + '_ {
        self.edges
            .iter()
            .flat_map(|(parent, children)| children.iter().map(move |child| (*parent, *child)))
    }
}

/// How a child's cached ancestors follow from its immediate parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AncestorRule {
    /// Parent is a domain: `domainId = parent`, `projectId` cleared.
    UnderDomain,
    /// Parent is a project: `projectId = parent`, `domainId = parent.domainId`.
    UnderProject,
    /// Any other parent: copy both caches from the parent.
    InheritFromParent,
}

/// Looks up the ancestor rule for one `(parent, child)` pair.
pub fn ancestor_rule(parent: EntityType, child: EntityType) -> AncestorRule {
    match (parent, child) {
        (EntityType::Domain, _) => AncestorRule::UnderDomain,
        (EntityType::Project, _) => AncestorRule::UnderProject,
        _ => AncestorRule::InheritFromParent,
    }
}

/// Cached ancestor pointers for one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AncestorCaches {
    pub project_id: Option<EntityId>,
    pub domain_id: Option<EntityId>,
}

impl AncestorCaches {
    /// Current caches carried by an entity.
    pub fn of(entity: &Entity) -> Self {
        Self {
            project_id: entity.project_id.clone(),
            domain_id: entity.domain_id.clone(),
        }
    }

    /// Writes caches onto an entity. Returns whether anything changed.
    pub fn apply_to(&self, entity: &mut Entity) -> bool {
        if entity.project_id == self.project_id && entity.domain_id == self.domain_id {
            return false;
        }
        entity.project_id = self.project_id.clone();
        entity.domain_id = self.domain_id.clone();
        true
    }
}

/// Computes the caches a child of `child_kind` gets under `parent`.
pub fn resolve_ancestor_caches(parent: &Entity, child_kind: EntityType) -> AncestorCaches {
    match ancestor_rule(parent.kind, child_kind) {
        AncestorRule::UnderDomain => AncestorCaches {
            project_id: None,
            domain_id: Some(parent.id.clone()),
        },
        AncestorRule::UnderProject => AncestorCaches {
            project_id: Some(parent.id.clone()),
            domain_id: parent.domain_id.clone(),
        },
        AncestorRule::InheritFromParent => AncestorCaches::of(parent),
    }
}

#[cfg(test)]
mod tests {
    use super::{ancestor_rule, resolve_ancestor_caches, AllowedEdges, AncestorRule};
    use crate::model::entity::{Entity, EntityType};

    #[test]
    fn canonical_table_keeps_notes_and_ideas_terminal() {
        let table = AllowedEdges::leaf_terminal();
        assert!(table.is_link_allowed(EntityType::Domain, EntityType::Project));
        assert!(table.is_link_allowed(EntityType::Project, EntityType::Task));
        assert!(!table.is_link_allowed(EntityType::Note, EntityType::Project));
        assert!(!table.is_link_allowed(EntityType::Idea, EntityType::Note));
        assert!(table.allowed_children(EntityType::Checklist).is_empty());
        assert!(table.allowed_parents(EntityType::Domain).is_empty());
    }

    #[test]
    fn nested_table_extends_canonical_table() {
        let nested = AllowedEdges::nested_notes();
        assert!(nested.is_link_allowed(EntityType::Note, EntityType::Checklist));
        for (parent, child) in AllowedEdges::leaf_terminal().pairs() {
            assert!(nested.is_link_allowed(parent, child));
        }
    }

    #[test]
    fn ancestor_rules_follow_parent_type() {
        assert_eq!(
            ancestor_rule(EntityType::Domain, EntityType::Task),
            AncestorRule::UnderDomain
        );
        assert_eq!(
            ancestor_rule(EntityType::Project, EntityType::Note),
            AncestorRule::UnderProject
        );
        assert_eq!(
            ancestor_rule(EntityType::Task, EntityType::Checklist),
            AncestorRule::InheritFromParent
        );
    }

    #[test]
    fn caches_under_project_pick_up_project_domain() {
        let mut project = Entity::with_id("p1", EntityType::Project);
        project.domain_id = Some("d1".to_string());

        let caches = resolve_ancestor_caches(&project, EntityType::Task);
        assert_eq!(caches.project_id.as_deref(), Some("p1"));
        assert_eq!(caches.domain_id.as_deref(), Some("d1"));

        let domain = Entity::with_id("d1", EntityType::Domain);
        let caches = resolve_ancestor_caches(&domain, EntityType::Task);
        assert_eq!(caches.project_id, None);
        assert_eq!(caches.domain_id.as_deref(), Some("d1"));
    }
}
