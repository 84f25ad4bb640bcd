//! Guarded graph traversal and cycle checks.
//!
//! # Responsibility
//! - Provide one visited-set bounded walk, upward or downward.
//! - Build cycle, ancestor, descendant and depth queries on top of it.
//!
//! # Invariants
//! - Every walk terminates, including on already-cyclic data.
//! - A walk never yields its start id or any id twice.
//! - Upward walks stop at a dangling parent id.

use crate::hierarchy::index::EntityIndex;
use crate::model::entity::Entity;
use std::collections::{HashSet, VecDeque};

/// Walk direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Parent chain, nearest first.
    Ancestors,
    /// Subtree, breadth first.
    Descendants,
}

/// Result of one guarded walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Walk<'a> {
    /// Reached ids in visit order, start excluded.
    pub visited: Vec<&'a str>,
    /// First id reached a second time, when the data is cyclic.
    pub revisited: Option<&'a str>,
}

impl Walk<'_> {
    pub fn reached(&self, id: &str) -> bool {
        self.visited.iter().any(|visited| *visited == id)
    }
}

/// Walks the graph from `start` in one direction with a visited-set bound.
pub fn guarded_walk<'a>(index: &EntityIndex<'a>, start: &'a str, direction: Direction) -> Walk<'a> {
    let mut seen = HashSet::from([start]);
    let mut visited = Vec::new();
    let mut revisited = None;

    match direction {
        Direction::Ancestors => {
            let mut cursor = index.parent_of(start);
            while let Some(current) = cursor {
                let Some(entity) = index.get(current) else {
                    break;
                };
                if !seen.insert(entity.id.as_str()) {
                    revisited = Some(entity.id.as_str());
                    break;
                }
                visited.push(entity.id.as_str());
                cursor = entity.effective_parent_id();
            }
        }
        Direction::Descendants => {
            let mut queue = VecDeque::from([start]);
            while let Some(current) = queue.pop_front() {
                for &child in index.children_of(current) {
                    if !seen.insert(child) {
                        revisited.get_or_insert(child);
                        continue;
                    }
                    visited.push(child);
                    queue.push_back(child);
                }
            }
        }
    }

    Walk { visited, revisited }
}

/// Whether linking `child_id` under `parent_id` would close a cycle.
///
/// An ancestor chain above the parent that is itself corrupt counts as a
/// cycle; attaching into it is refused.
pub fn would_create_cycle(index: &EntityIndex<'_>, parent_id: &str, child_id: &str) -> bool {
    if parent_id == child_id {
        return true;
    }
    let Some(parent) = index.get(parent_id) else {
        return false;
    };
    let walk = guarded_walk(index, parent.id.as_str(), Direction::Ancestors);
    walk.reached(child_id) || walk.revisited.is_some()
}

/// Ancestors ordered from nearest to farthest.
pub fn ancestors<'a>(index: &EntityIndex<'a>, id: &str) -> Vec<&'a Entity> {
    resolve(index, id, Direction::Ancestors)
}

/// Every entity below `id`, breadth first.
pub fn descendants<'a>(index: &EntityIndex<'a>, id: &str) -> Vec<&'a Entity> {
    resolve(index, id, Direction::Descendants)
}

/// Number of reachable ancestors. Roots have depth `0`.
pub fn depth(index: &EntityIndex<'_>, id: &str) -> usize {
    let Some(entity) = index.get(id) else {
        return 0;
    };
    guarded_walk(index, entity.id.as_str(), Direction::Ancestors)
        .visited
        .len()
}

/// Whether `id` is its own ancestor.
pub fn is_on_cycle(index: &EntityIndex<'_>, id: &str) -> bool {
    let Some(entity) = index.get(id) else {
        return false;
    };
    guarded_walk(index, entity.id.as_str(), Direction::Ancestors).revisited == Some(id)
}

fn resolve<'a>(index: &EntityIndex<'a>, id: &str, direction: Direction) -> Vec<&'a Entity> {
    let Some(entity) = index.get(id) else {
        return Vec::new();
    };
    guarded_walk(index, entity.id.as_str(), direction)
        .visited
        .into_iter()
        .filter_map(|visited| index.get(visited))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{ancestors, depth, descendants, is_on_cycle, would_create_cycle};
    use crate::hierarchy::index::EntityIndex;
    use crate::model::entity::{Entity, EntityType};
    use crate::model::state::HierarchyState;

    fn chain() -> HierarchyState {
        HierarchyState::new()
            .with(Entity::with_id("d1", EntityType::Domain))
            .with(Entity::with_id("p1", EntityType::Project).with_parent("d1"))
            .with(Entity::with_id("t1", EntityType::Task).with_parent("p1"))
            .with(Entity::with_id("c1", EntityType::Checklist).with_parent("t1"))
    }

    fn ids(entities: Vec<&Entity>) -> Vec<&str> {
        entities.into_iter().map(|entity| entity.id.as_str()).collect()
    }

    #[test]
    fn detects_cycles_through_ancestor_chain() {
        let state = chain();
        let index = EntityIndex::build(&state);
        assert!(would_create_cycle(&index, "t1", "d1"));
        assert!(would_create_cycle(&index, "p1", "p1"));
        assert!(!would_create_cycle(&index, "d1", "t1"));
    }

    #[test]
    fn ancestors_and_descendants_are_ordered() {
        let state = chain();
        let index = EntityIndex::build(&state);
        assert_eq!(ids(ancestors(&index, "c1")), ["t1", "p1", "d1"]);
        assert_eq!(ids(descendants(&index, "d1")), ["p1", "t1", "c1"]);
        assert_eq!(depth(&index, "c1"), 3);
        assert_eq!(depth(&index, "d1"), 0);
        assert_eq!(depth(&index, "missing"), 0);
    }

    #[test]
    fn terminates_on_corrupt_cyclic_data() {
        let state = HierarchyState::new()
            .with(Entity::with_id("a", EntityType::Task).with_parent("b"))
            .with(Entity::with_id("b", EntityType::Task).with_parent("a"))
            .with(Entity::with_id("n1", EntityType::Note).with_parent("a"));
        let index = EntityIndex::build(&state);

        assert!(is_on_cycle(&index, "a"));
        assert!(is_on_cycle(&index, "b"));
        assert!(!is_on_cycle(&index, "n1"));
        assert_eq!(ids(ancestors(&index, "n1")), ["a", "b"]);
        assert!(would_create_cycle(&index, "n1", "x"));
        assert_eq!(descendants(&index, "a").len(), 2);
    }
}
