//! Hierarchy entity model.
//!
//! # Responsibility
//! - Define the typed record shared by every map object (domain, project, ...).
//! - Provide the one-time relational field-default step and its inverse.
//!
//! # Invariants
//! - `kind` is explicit and immutable; it is never inferred from id or shape.
//! - `parent_id` is the canonical link; `children` is a derived mirror.
//! - `project_id`/`domain_id` are caches that only the engine writes once an
//!   entity is attached.
//! - `updated_at` strictly increases on every relational mutation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Globally unique entity identifier.
///
/// Legacy records carry short ids (`d1`, `p_17`); new records get UUID v4
/// strings from [`new_entity_id`].
pub type EntityId = String;

/// Ordered child id sets keyed by child type.
pub type ChildrenMap = BTreeMap<EntityType, Vec<EntityId>>;

/// Generates a fresh stable entity id.
pub fn new_entity_id() -> EntityId {
    Uuid::new_v4().to_string()
}

/// Returns current wall clock as Unix epoch milliseconds.
///
/// Clock skew before the epoch is clamped to `0`.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Entity type tag governing which parent-child edges are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Domain,
    Project,
    Task,
    Idea,
    Note,
    Checklist,
}

const ALL_ENTITY_TYPES: &[EntityType] = &[
    EntityType::Domain,
    EntityType::Project,
    EntityType::Task,
    EntityType::Idea,
    EntityType::Note,
    EntityType::Checklist,
];

impl EntityType {
    /// All entity types in collection order.
    pub fn all() -> &'static [EntityType] {
        ALL_ENTITY_TYPES
    }

    /// Stable wire string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Project => "project",
            Self::Task => "task",
            Self::Idea => "idea",
            Self::Note => "note",
            Self::Checklist => "checklist",
        }
    }

    /// Name of the state collection holding this type.
    pub fn collection_key(self) -> &'static str {
        match self {
            Self::Domain => "domains",
            Self::Project => "projects",
            Self::Task => "tasks",
            Self::Idea => "ideas",
            Self::Note => "notes",
            Self::Checklist => "checklists",
        }
    }

    /// Id prefix character used by legacy records.
    ///
    /// Diagnostics only; type is never derived from it.
    pub fn legacy_id_prefix(self) -> char {
        match self {
            Self::Domain => 'd',
            Self::Project => 'p',
            Self::Task => 't',
            Self::Idea => 'i',
            Self::Note => 'n',
            Self::Checklist => 'c',
        }
    }

    /// Parses a wire string. Accepts singular and collection spellings.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        ALL_ENTITY_TYPES.iter().copied().find(|kind| {
            kind.as_str() == normalized.as_str() || kind.collection_key() == normalized.as_str()
        })
    }
}

impl Display for EntityType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-entity mutation gates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locks {
    /// Suppresses layout-level repositioning.
    #[serde(rename = "move", default)]
    pub move_locked: bool,
    /// Suppresses every parent-link change.
    #[serde(rename = "hierarchy", default)]
    pub hierarchy_locked: bool,
}

/// Layout hints consumed by the map renderer. Not structural.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutConstraints {
    pub max_radius: f64,
    pub orbit_radius: f64,
    pub auto_layout: bool,
}

impl LayoutConstraints {
    /// Default layout hints for one entity type.
    pub fn default_for(kind: EntityType) -> Self {
        let (max_radius, orbit_radius) = match kind {
            EntityType::Domain => (600.0, 300.0),
            EntityType::Project => (300.0, 150.0),
            EntityType::Task => (120.0, 60.0),
            EntityType::Idea => (100.0, 50.0),
            EntityType::Note | EntityType::Checklist => (80.0, 40.0),
        };
        Self {
            max_radius,
            orbit_radius,
            auto_layout: true,
        }
    }
}

/// One hierarchy participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: EntityId,
    /// Serialized as `type`; required on every record.
    #[serde(rename = "type")]
    pub kind: EntityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<EntityId>,
    /// Cached nearest project ancestor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<EntityId>,
    /// Cached domain ancestor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<ChildrenMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locks: Option<Locks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<LayoutConstraints>,
    /// Unix epoch milliseconds of the last relational mutation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl Entity {
    /// Creates an unlinked entity with a generated id.
    pub fn new(kind: EntityType) -> Self {
        Self::with_id(new_entity_id(), kind)
    }

    /// Creates an unlinked entity with a caller-provided id.
    ///
    /// Relational fields start absent, exactly like a legacy record; call
    /// [`Entity::initialize_relational_fields`] to bring it into the engine.
    pub fn with_id(id: impl Into<EntityId>, kind: EntityType) -> Self {
        Self {
            id: id.into(),
            kind,
            parent_id: None,
            project_id: None,
            domain_id: None,
            children: None,
            locks: None,
            constraints: None,
            updated_at: None,
        }
    }

    /// Sets the canonical parent link. Builder-style helper for fixtures.
    pub fn with_parent(mut self, parent_id: impl Into<EntityId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Sets legacy denormalized pointers. Builder-style helper for fixtures.
    pub fn with_legacy_ancestors(
        mut self,
        project_id: Option<&str>,
        domain_id: Option<&str>,
    ) -> Self {
        self.project_id = project_id.map(str::to_string);
        self.domain_id = domain_id.map(str::to_string);
        self
    }

    /// Parent id, falling back to legacy denormalized pointers.
    pub fn effective_parent_id(&self) -> Option<&str> {
        self.parent_id
            .as_deref()
            .or(self.project_id.as_deref())
            .or(self.domain_id.as_deref())
    }

    /// Whether every relational field has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.children.is_some() && self.locks.is_some() && self.constraints.is_some()
    }

    /// Whether any engine-owned field is present.
    pub fn has_relational_fields(&self) -> bool {
        self.parent_id.is_some()
            || self.children.is_some()
            || self.locks.is_some()
            || self.constraints.is_some()
    }

    /// Fills absent relational fields with defaults.
    ///
    /// Existing values are left untouched. Returns whether anything changed.
    pub fn initialize_relational_fields(&mut self) -> bool {
        let mut changed = false;
        if self.children.is_none() {
            self.children = Some(ChildrenMap::new());
            changed = true;
        }
        if self.locks.is_none() {
            self.locks = Some(Locks::default());
            changed = true;
        }
        if self.constraints.is_none() {
            self.constraints = Some(LayoutConstraints::default_for(self.kind));
            changed = true;
        }
        if changed {
            self.touch();
        }
        changed
    }

    /// Removes engine-owned fields. Legacy pointers are kept.
    ///
    /// Returns whether anything changed.
    pub fn clear_relational_fields(&mut self) -> bool {
        if !self.has_relational_fields() {
            return false;
        }
        self.parent_id = None;
        self.children = None;
        self.locks = None;
        self.constraints = None;
        self.touch();
        true
    }

    /// Bumps `updated_at` to now, or one past the previous value on skew.
    pub fn touch(&mut self) {
        let now = now_epoch_ms();
        self.updated_at = Some(match self.updated_at {
            Some(previous) if previous >= now => previous.saturating_add(1),
            _ => now,
        });
    }

    /// Lists `child_id` under `child_kind` when the mirror map is present.
    ///
    /// Returns whether the map changed.
    pub(crate) fn list_child(&mut self, child_kind: EntityType, child_id: &str) -> bool {
        let Some(children) = self.children.as_mut() else {
            return false;
        };
        let ids = children.entry(child_kind).or_default();
        if ids.iter().any(|id| id == child_id) {
            return false;
        }
        ids.push(child_id.to_string());
        true
    }

    /// Removes `child_id` from every key of the mirror map.
    ///
    /// Returns whether the map changed.
    pub(crate) fn unlist_child(&mut self, child_id: &str) -> bool {
        let Some(children) = self.children.as_mut() else {
            return false;
        };
        let mut changed = false;
        for ids in children.values_mut() {
            let before = ids.len();
            ids.retain(|id| id != child_id);
            changed |= ids.len() != before;
        }
        children.retain(|_, ids| !ids.is_empty());
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::{Entity, EntityType, LayoutConstraints, Locks};

    #[test]
    fn parse_accepts_singular_and_collection_names() {
        assert_eq!(EntityType::parse("Task"), Some(EntityType::Task));
        assert_eq!(EntityType::parse(" checklists "), Some(EntityType::Checklist));
        assert_eq!(EntityType::parse("folder"), None);
    }

    #[test]
    fn initialize_is_one_shot_and_preserves_existing_values() {
        let mut entity = Entity::with_id("t1", EntityType::Task);
        entity.locks = Some(Locks {
            move_locked: true,
            hierarchy_locked: false,
        });

        assert!(entity.initialize_relational_fields());
        assert!(entity.is_initialized());
        assert!(entity.locks.expect("locks").move_locked);
        assert_eq!(
            entity.constraints,
            Some(LayoutConstraints::default_for(EntityType::Task))
        );

        let stamp = entity.updated_at;
        assert!(!entity.initialize_relational_fields());
        assert_eq!(entity.updated_at, stamp);
    }

    #[test]
    fn layout_defaults_shrink_down_the_hierarchy() {
        let domain = LayoutConstraints::default_for(EntityType::Domain);
        assert_eq!((domain.max_radius, domain.orbit_radius), (600.0, 300.0));
        let project = LayoutConstraints::default_for(EntityType::Project);
        assert_eq!((project.max_radius, project.orbit_radius), (300.0, 150.0));
        let checklist = LayoutConstraints::default_for(EntityType::Checklist);
        assert_eq!((checklist.max_radius, checklist.orbit_radius), (80.0, 40.0));
        assert!(EntityType::all()
            .iter()
            .all(|kind| LayoutConstraints::default_for(*kind).auto_layout));
    }

    #[test]
    fn touch_is_strictly_increasing() {
        let mut entity = Entity::with_id("n1", EntityType::Note);
        entity.updated_at = Some(i64::MAX - 1);
        entity.touch();
        assert_eq!(entity.updated_at, Some(i64::MAX));
    }

    #[test]
    fn effective_parent_prefers_canonical_link() {
        let entity = Entity::with_id("t1", EntityType::Task)
            .with_legacy_ancestors(Some("p1"), Some("d1"))
            .with_parent("p2");
        assert_eq!(entity.effective_parent_id(), Some("p2"));

        let legacy = Entity::with_id("t2", EntityType::Task).with_legacy_ancestors(None, Some("d1"));
        assert_eq!(legacy.effective_parent_id(), Some("d1"));
    }

    #[test]
    fn child_listing_ignores_absent_mirror_and_duplicates() {
        let mut parent = Entity::with_id("p1", EntityType::Project);
        assert!(!parent.list_child(EntityType::Task, "t1"));

        parent.initialize_relational_fields();
        assert!(parent.list_child(EntityType::Task, "t1"));
        assert!(!parent.list_child(EntityType::Task, "t1"));
        assert!(parent.unlist_child("t1"));
        assert!(parent.children.as_ref().expect("children").is_empty());
    }
}
