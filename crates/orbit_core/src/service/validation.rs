//! Full-graph integrity scan and conservative repair.
//!
//! # Responsibility
//! - Report every structural defect in one pass.
//! - Repair only defects with an unambiguous local fix.
//!
//! # Invariants
//! - `validate_hierarchy` never mutates state.
//! - Defects are collected, never short-circuited.
//! - Repairs treat `parentId` as canonical: `children` mirrors are made to
//!   agree with it, never the other way round.
//! - The fixer never re-parents an entity to a different ancestor.

use crate::hierarchy::cycle_guard;
use crate::hierarchy::index::EntityIndex;
use crate::hierarchy::locks::{self, LockKind};
use crate::hierarchy::registry::{resolve_ancestor_caches, AncestorCaches};
use crate::model::entity::{now_epoch_ms, Entity, EntityId, LayoutConstraints, Locks};
use crate::model::state::HierarchyState;
use crate::service::engine::HierarchyEngine;
use log::{debug, info};
use serde::Serialize;

/// Field name reported for a missing or malformed `locks` record.
pub const FIELD_LOCKS: &str = "locks";
/// Field name reported for a missing or malformed `constraints` record.
pub const FIELD_CONSTRAINTS: &str = "constraints";

/// Structural defect category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    /// `parentId` references an id that does not exist.
    MissingObject,
    /// Entity is its own ancestor.
    CyclicDependency,
    /// `(parent type, child type)` is not in the allowed-edges table.
    InvalidParentType,
    /// `children` mirror disagrees with `parentId`.
    OrphanedObject,
    /// Move-locked entity still handed to auto layout.
    LockViolation,
    /// Same id appears more than once.
    DuplicateId,
    /// `projectId`/`domainId` disagree with the parent chain.
    StaleAncestorCache,
    /// Initialized entity lacks `locks` or `constraints`.
    MissingField,
    /// `constraints` carries a non-positive or non-finite radius.
    MalformedField,
    /// Parent exceeds the configured direct-children cap.
    TooManyChildren,
    /// Entity is deeper than the configured depth cap.
    DepthExceeded,
}

impl ValidationErrorKind {
    /// Stable wire code.
    pub fn code(self) -> &'static str {
        match self {
            Self::MissingObject => "missing_object",
            Self::CyclicDependency => "cyclic_dependency",
            Self::InvalidParentType => "invalid_parent_type",
            Self::OrphanedObject => "orphaned_object",
            Self::LockViolation => "lock_violation",
            Self::DuplicateId => "duplicate_id",
            Self::StaleAncestorCache => "stale_ancestor_cache",
            Self::MissingField => "missing_field",
            Self::MalformedField => "malformed_field",
            Self::TooManyChildren => "too_many_children",
            Self::DepthExceeded => "depth_exceeded",
        }
    }

    /// Whether the defect breaks the graph itself rather than a hint or limit.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            Self::MissingObject
                | Self::CyclicDependency
                | Self::InvalidParentType
                | Self::OrphanedObject
                | Self::DuplicateId
        )
    }
}

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub object_id: EntityId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_id: Option<EntityId>,
    /// Offending field for missing/malformed-field defects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
    pub message: String,
    /// Unix epoch milliseconds when the scan ran.
    pub timestamp: i64,
}

/// Outcome of [`HierarchyEngine::fix_validation_errors`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FixReport {
    pub fixed: usize,
    pub failed: usize,
    /// Defects the fixer does not repair, or that were already resolved.
    pub skipped: usize,
    pub details: Vec<String>,
}

struct Collector {
    timestamp: i64,
    errors: Vec<ValidationError>,
}

impl Collector {
    fn push(
        &mut self,
        kind: ValidationErrorKind,
        object_id: &str,
        parent_id: Option<&str>,
        child_id: Option<&str>,
        message: String,
    ) {
        self.errors.push(ValidationError {
            kind,
            object_id: object_id.to_string(),
            parent_id: parent_id.map(str::to_string),
            child_id: child_id.map(str::to_string),
            field: None,
            message,
            timestamp: self.timestamp,
        });
    }

    fn push_field(
        &mut self,
        kind: ValidationErrorKind,
        object_id: &str,
        field: &'static str,
        message: String,
    ) {
        self.errors.push(ValidationError {
            kind,
            object_id: object_id.to_string(),
            parent_id: None,
            child_id: None,
            field: Some(field),
            message,
            timestamp: self.timestamp,
        });
    }
}

impl HierarchyEngine {
    /// Scans the whole graph and returns every defect found.
    pub fn validate_hierarchy(&self, state: &HierarchyState) -> Vec<ValidationError> {
        let index = EntityIndex::build(state);
        let mut out = Collector {
            timestamp: now_epoch_ms(),
            errors: Vec::new(),
        };

        for duplicate in index.duplicate_ids() {
            out.push(
                ValidationErrorKind::DuplicateId,
                duplicate,
                None,
                None,
                format!("id {duplicate} is used by more than one entity"),
            );
        }

        for entity in index.entities() {
            self.check_parent_link(&index, entity, &mut out);
            self.check_position(&index, entity, &mut out);
            check_children_mirror(&index, entity, &mut out);
            check_fields(entity, &mut out);

            let child_count = index.children_of(&entity.id).len();
            if child_count > self.config().max_children_per_parent {
                out.push(
                    ValidationErrorKind::TooManyChildren,
                    &entity.id,
                    None,
                    None,
                    format!(
                        "{} has {child_count} children; limit is {}",
                        entity.id,
                        self.config().max_children_per_parent
                    ),
                );
            }
        }

        info!(
            "event=hierarchy_validate module=validation status=ok entities={} defects={}",
            index.len(),
            out.errors.len()
        );
        out.errors
    }

    /// Applies conservative repairs for the given defects.
    ///
    /// Cycle and dangling-parent defects clear the offending link; mirror
    /// defects realign `children` with `parentId`; missing or malformed
    /// fields are re-initialized; stale caches are recomputed. Every other
    /// kind is skipped.
    pub fn fix_validation_errors(
        &self,
        errors: &[ValidationError],
        state: &mut HierarchyState,
    ) -> FixReport {
        let mut report = FixReport::default();
        for error in errors {
            match fix_one(error, state) {
                FixOutcome::Fixed(detail) => {
                    report.fixed += 1;
                    report.details.push(detail);
                }
                FixOutcome::Skipped(detail) => {
                    report.skipped += 1;
                    report.details.push(detail);
                }
                FixOutcome::Failed(detail) => {
                    report.failed += 1;
                    report.details.push(detail);
                }
            }
        }
        info!(
            "event=hierarchy_fix module=validation status={} fixed={} failed={} skipped={}",
            if report.failed == 0 { "ok" } else { "partial" },
            report.fixed,
            report.failed,
            report.skipped
        );
        report
    }

    fn check_parent_link(&self, index: &EntityIndex<'_>, entity: &Entity, out: &mut Collector) {
        let Some(parent_id) = entity.parent_id.as_deref() else {
            return;
        };
        let Some(parent) = index.get(parent_id) else {
            out.push(
                ValidationErrorKind::MissingObject,
                &entity.id,
                Some(parent_id),
                None,
                format!("{} references missing parent {parent_id}", entity.id),
            );
            return;
        };

        if !self.is_link_allowed(parent.kind, entity.kind) {
            out.push(
                ValidationErrorKind::InvalidParentType,
                &entity.id,
                Some(parent_id),
                None,
                format!(
                    "{} {} may not be placed under {} {parent_id}",
                    entity.kind, entity.id, parent.kind
                ),
            );
        }

        if resolve_ancestor_caches(parent, entity.kind) != AncestorCaches::of(entity) {
            out.push(
                ValidationErrorKind::StaleAncestorCache,
                &entity.id,
                Some(parent_id),
                None,
                format!("{} carries ancestor caches that disagree with {parent_id}", entity.id),
            );
        }

        let listed = parent.children.as_ref().map(|children| {
            children
                .get(&entity.kind)
                .is_some_and(|ids| ids.iter().any(|id| *id == entity.id))
        });
        if listed == Some(false) {
            out.push(
                ValidationErrorKind::OrphanedObject,
                &entity.id,
                Some(parent_id),
                None,
                format!("{} points to {parent_id} but is not listed as its child", entity.id),
            );
        }
    }

    fn check_position(&self, index: &EntityIndex<'_>, entity: &Entity, out: &mut Collector) {
        if cycle_guard::is_on_cycle(index, &entity.id) {
            out.push(
                ValidationErrorKind::CyclicDependency,
                &entity.id,
                index.parent_of(&entity.id),
                None,
                format!("{} is its own ancestor", entity.id),
            );
            return;
        }

        let depth = cycle_guard::depth(index, &entity.id);
        if depth > self.config().max_depth {
            out.push(
                ValidationErrorKind::DepthExceeded,
                &entity.id,
                index.parent_of(&entity.id),
                None,
                format!(
                    "{} sits at depth {depth}; limit is {}",
                    entity.id,
                    self.config().max_depth
                ),
            );
        }
    }
}

fn check_children_mirror(index: &EntityIndex<'_>, entity: &Entity, out: &mut Collector) {
    let Some(children) = entity.children.as_ref() else {
        return;
    };
    for (kind, ids) in children {
        for child_id in ids {
            let message = match index.get(child_id) {
                None => format!("{} lists missing child {child_id}", entity.id),
                Some(child) if child.parent_id.as_deref() != Some(entity.id.as_str()) => {
                    format!("{} lists {child_id} which does not point back", entity.id)
                }
                Some(child) if child.kind != *kind => {
                    format!("{} lists {child_id} under {kind} but it is a {}", entity.id, child.kind)
                }
                Some(_) => continue,
            };
            out.push(
                ValidationErrorKind::OrphanedObject,
                child_id,
                Some(&entity.id),
                Some(child_id),
                message,
            );
        }
    }
}

fn check_fields(entity: &Entity, out: &mut Collector) {
    if entity.children.is_some() {
        if entity.locks.is_none() {
            out.push_field(
                ValidationErrorKind::MissingField,
                &entity.id,
                FIELD_LOCKS,
                format!("{} is initialized but has no locks", entity.id),
            );
        }
        if entity.constraints.is_none() {
            out.push_field(
                ValidationErrorKind::MissingField,
                &entity.id,
                FIELD_CONSTRAINTS,
                format!("{} is initialized but has no constraints", entity.id),
            );
        }
    }

    let Some(constraints) = entity.constraints else {
        return;
    };
    if !is_positive_radius(constraints.max_radius) || !is_positive_radius(constraints.orbit_radius)
    {
        out.push_field(
            ValidationErrorKind::MalformedField,
            &entity.id,
            FIELD_CONSTRAINTS,
            format!(
                "{} has invalid radii max={} orbit={}",
                entity.id, constraints.max_radius, constraints.orbit_radius
            ),
        );
    }
    if constraints.auto_layout && locks::is_locked(entity, LockKind::Move) {
        out.push(
            ValidationErrorKind::LockViolation,
            &entity.id,
            None,
            None,
            format!("{} is move-locked but still auto-laid-out", entity.id),
        );
    }
}

fn is_positive_radius(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

enum FixOutcome {
    Fixed(String),
    Skipped(String),
    Failed(String),
}

fn fix_one(error: &ValidationError, state: &mut HierarchyState) -> FixOutcome {
    use ValidationErrorKind as Kind;

    let object_id = error.object_id.as_str();
    let code = error.kind.code();
    match error.kind {
        Kind::CyclicDependency => {
            let still_cyclic = cycle_guard::is_on_cycle(&EntityIndex::build(state), object_id);
            if !still_cyclic {
                return FixOutcome::Skipped(format!("{code} {object_id}: already resolved"));
            }
            clear_parent_link(state, object_id, code)
        }
        Kind::MissingObject => clear_parent_link(state, object_id, code),
        Kind::OrphanedObject => realign_mirror(state, error),
        Kind::MissingField | Kind::MalformedField => {
            let Some(entity) = state.find_mut(object_id) else {
                return FixOutcome::Failed(format!("{code} {object_id}: entity not found"));
            };
            match error.field {
                Some(FIELD_LOCKS) => {
                    entity.locks = Some(Locks::default());
                }
                Some(FIELD_CONSTRAINTS) => {
                    entity.constraints = Some(LayoutConstraints::default_for(entity.kind));
                }
                _ => {
                    return FixOutcome::Skipped(format!("{code} {object_id}: unknown field"));
                }
            }
            FixOutcome::Fixed(format!(
                "{code} {object_id}: re-initialized {}",
                error.field.unwrap_or_default()
            ))
        }
        Kind::StaleAncestorCache => {
            let caches = {
                let Some(entity) = state.find(object_id) else {
                    return FixOutcome::Failed(format!("{code} {object_id}: entity not found"));
                };
                let parent = entity.parent_id.as_deref().and_then(|id| state.find(id));
                match parent {
                    Some(parent) => resolve_ancestor_caches(parent, entity.kind),
                    None => {
                        return FixOutcome::Failed(format!("{code} {object_id}: parent not found"))
                    }
                }
            };
            match state.find_mut(object_id) {
                Some(entity) => {
                    if caches.apply_to(entity) {
                        entity.touch();
                    }
                    FixOutcome::Fixed(format!("{code} {object_id}: recomputed ancestor caches"))
                }
                None => FixOutcome::Failed(format!("{code} {object_id}: entity not found")),
            }
        }
        Kind::InvalidParentType
        | Kind::LockViolation
        | Kind::DuplicateId
        | Kind::TooManyChildren
        | Kind::DepthExceeded => {
            FixOutcome::Skipped(format!("{code} {object_id}: requires manual repair"))
        }
    }
}

fn clear_parent_link(state: &mut HierarchyState, object_id: &str, code: &str) -> FixOutcome {
    let previous = match state.find_mut(object_id) {
        Some(entity) => {
            let previous = entity.parent_id.take();
            AncestorCaches::default().apply_to(entity);
            entity.touch();
            previous
        }
        None => return FixOutcome::Failed(format!("{code} {object_id}: entity not found")),
    };
    if let Some(parent) = previous.as_deref().and_then(|id| state.find_mut(id)) {
        if parent.unlist_child(object_id) {
            parent.touch();
        }
    }
    debug!("event=hierarchy_fix module=validation status=ok action=clear_link object_id={object_id}");
    FixOutcome::Fixed(format!(
        "{code} {object_id}: cleared link to {}",
        previous.as_deref().unwrap_or("none")
    ))
}

fn realign_mirror(state: &mut HierarchyState, error: &ValidationError) -> FixOutcome {
    let code = error.kind.code();
    let object_id = error.object_id.as_str();
    let Some(parent_id) = error.parent_id.as_deref() else {
        return FixOutcome::Failed(format!("{code} {object_id}: defect names no parent"));
    };

    // A listed child that does not point back is dropped from the listing;
    // one that does point back is re-listed under its real type.
    if error.child_id.is_some() {
        let relist = state
            .find(object_id)
            .filter(|child| child.parent_id.as_deref() == Some(parent_id))
            .map(|child| child.kind);
        return match state.find_mut(parent_id) {
            Some(parent) => {
                let mut changed = parent.unlist_child(object_id);
                if let Some(kind) = relist {
                    changed |= parent.list_child(kind, object_id);
                }
                if changed {
                    parent.touch();
                }
                FixOutcome::Fixed(format!("{code} {object_id}: realigned {parent_id} children"))
            }
            None => FixOutcome::Failed(format!("{code} {object_id}: parent {parent_id} not found")),
        };
    }

    // A child pointing at a parent that does not list it gets listed.
    let Some(kind) = state.find(object_id).map(|entity| entity.kind) else {
        return FixOutcome::Failed(format!("{code} {object_id}: entity not found"));
    };
    match state.find_mut(parent_id) {
        Some(parent) => {
            if parent.list_child(kind, object_id) {
                parent.touch();
            }
            FixOutcome::Fixed(format!("{code} {object_id}: listed under {parent_id}"))
        }
        None => FixOutcome::Failed(format!("{code} {object_id}: parent {parent_id} not found")),
    }
}
