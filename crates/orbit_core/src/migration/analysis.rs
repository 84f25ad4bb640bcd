//! Legacy data survey and dry-run planning.

use super::{
    estimate_time_ms, MigrationAnalysis, MigrationPreview, Migrator, PlannedLink, PlannedObject,
};
use crate::hierarchy::cycle_guard;
use crate::hierarchy::index::EntityIndex;
use crate::model::entity::{Entity, EntityType};
use crate::model::state::HierarchyState;
use crate::service::engine::HierarchyEngine;
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;

static LEGACY_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<prefix>[a-z])(?:[-_][A-Za-z0-9]+|\d+)$").expect("valid legacy id regex")
});

/// Parent named by an entity's legacy `projectId`/`domainId` pointers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LegacyParent<'a> {
    /// No legacy pointer is set.
    Absent,
    /// Pointer resolves to an entity of the expected type.
    Resolved(&'a Entity),
    /// Pointer names an id that does not exist.
    Dangling {
        field: &'static str,
        id: &'a str,
    },
    /// Pointer names an entity of the wrong type.
    WrongType {
        field: &'static str,
        target: &'a Entity,
    },
}

impl<'a> LegacyParent<'a> {
    /// Resolves legacy pointers, preferring `projectId` over `domainId`.
    ///
    /// A broken `projectId` falls through to `domainId`; the first problem is
    /// reported only when no pointer resolves.
    pub fn resolve(index: &EntityIndex<'a>, entity: &'a Entity) -> Self {
        let candidates = [
            ("projectId", entity.project_id.as_deref(), EntityType::Project),
            ("domainId", entity.domain_id.as_deref(), EntityType::Domain),
        ];

        let mut first_problem = None;
        for (field, pointer, expected) in candidates {
            let Some(id) = pointer else {
                continue;
            };
            if entity.kind == expected || entity.kind == EntityType::Domain {
                continue;
            }
            let outcome = match index.get(id) {
                Some(target) if target.kind == expected => return Self::Resolved(target),
                Some(target) => Self::WrongType { field, target },
                None => Self::Dangling { field, id },
            };
            first_problem.get_or_insert(outcome);
        }
        first_problem.unwrap_or(Self::Absent)
    }
}

/// Links restorable from legacy pointers plus reasons for the ones that are not.
pub(super) struct RestorePlan {
    pub links: Vec<PlannedLink>,
    pub warnings: Vec<(String, String)>,
}

pub(super) fn plan_restorations(engine: &HierarchyEngine, index: &EntityIndex<'_>) -> RestorePlan {
    let mut plan = RestorePlan {
        links: Vec::new(),
        warnings: Vec::new(),
    };

    for entity in index.entities().filter(|entity| entity.parent_id.is_none()) {
        match LegacyParent::resolve(index, entity) {
            LegacyParent::Absent => {}
            LegacyParent::Resolved(parent) if engine.is_link_allowed(parent.kind, entity.kind) => {
                plan.links.push(PlannedLink {
                    child_type: entity.kind,
                    child_id: entity.id.clone(),
                    parent_type: parent.kind,
                    parent_id: parent.id.clone(),
                });
            }
            LegacyParent::Resolved(parent) => plan.warnings.push((
                entity.id.clone(),
                format!(
                    "legacy link {} -> {} is not allowed ({} under {})",
                    entity.id, parent.id, entity.kind, parent.kind
                ),
            )),
            LegacyParent::Dangling { field, id } => plan.warnings.push((
                entity.id.clone(),
                format!("{} {field} points to missing entity {id}", entity.id),
            )),
            LegacyParent::WrongType { field, target } => plan.warnings.push((
                entity.id.clone(),
                format!(
                    "{} {field} points to {} which is a {}",
                    entity.id, target.id, target.kind
                ),
            )),
        }
    }
    plan
}

impl Migrator<'_> {
    /// Surveys legacy data without mutating it.
    pub fn analyze_existing_data(&self, state: &HierarchyState) -> MigrationAnalysis {
        let index = EntityIndex::build(state);
        let mut analysis = MigrationAnalysis {
            total_objects: state.len(),
            ..MigrationAnalysis::default()
        };

        for duplicate in index.duplicate_ids() {
            analysis
                .issues
                .push(format!("id {duplicate} is used by more than one entity"));
        }

        for entity in index.entities() {
            let counts = analysis.by_type.entry(entity.kind).or_default();
            counts.total += 1;
            if entity.is_initialized() {
                counts.with_relational_fields += 1;
                analysis.migrated_objects += 1;
            }

            match entity.parent_id.as_deref() {
                Some(parent_id) => {
                    counts.with_parent_link += 1;
                    analysis.existing_links += 1;
                    if !index.contains(parent_id) {
                        analysis
                            .issues
                            .push(format!("{} references missing parent {parent_id}", entity.id));
                    } else if let LegacyParent::Resolved(legacy) = LegacyParent::resolve(&index, entity) {
                        let agrees = legacy.id == parent_id
                            || cycle_guard::ancestors(&index, &entity.id)
                                .iter()
                                .any(|ancestor| ancestor.id == legacy.id);
                        if !agrees {
                            analysis.issues.push(format!(
                                "{} has parent {parent_id} but legacy pointers name {}",
                                entity.id, legacy.id
                            ));
                        }
                    }
                }
                None => match LegacyParent::resolve(&index, entity) {
                    LegacyParent::Absent => {}
                    LegacyParent::Resolved(_) => {
                        counts.potential_links += 1;
                        analysis.potential_links += 1;
                    }
                    LegacyParent::Dangling { field, id } => analysis
                        .issues
                        .push(format!("{} {field} points to missing entity {id}", entity.id)),
                    LegacyParent::WrongType { field, target } => analysis.issues.push(format!(
                        "{} {field} points to {} which is a {}",
                        entity.id, target.id, target.kind
                    )),
                },
            }

            if let Some(issue) = legacy_prefix_mismatch(entity) {
                analysis.issues.push(issue);
            }
        }

        analysis.recommendations = recommendations(&analysis);
        info!(
            "event=migration_analyze module=migration status=ok objects={} existing_links={} potential_links={} issues={}",
            analysis.total_objects,
            analysis.existing_links,
            analysis.potential_links,
            analysis.issues.len()
        );
        analysis
    }

    /// Enumerates what [`Migrator::migrate`] would do with default options.
    pub fn preview_migration(&self, state: &HierarchyState) -> MigrationPreview {
        let index = EntityIndex::build(state);
        let objects_to_initialize: Vec<PlannedObject> = index
            .entities()
            .filter(|entity| !entity.is_initialized())
            .map(|entity| PlannedObject {
                id: entity.id.clone(),
                kind: entity.kind,
            })
            .collect();
        let plan = plan_restorations(self.engine, &index);
        let existing_links = index
            .entities()
            .filter(|entity| entity.parent_id.is_some())
            .count();
        let connections_to_validate = existing_links + plan.links.len();

        MigrationPreview {
            estimated_time_ms: estimate_time_ms(
                objects_to_initialize.len(),
                plan.links.len(),
                connections_to_validate,
            ),
            objects_to_initialize,
            connections_to_restore: plan.links,
            connections_to_validate,
            warnings: plan.warnings.into_iter().map(|(_, message)| message).collect(),
        }
    }
}

/// Reports ids shaped like a legacy id of a different type.
fn legacy_prefix_mismatch(entity: &Entity) -> Option<String> {
    let captures = LEGACY_ID_RE.captures(&entity.id)?;
    let prefix = captures.name("prefix")?.as_str().chars().next()?;
    let implied = EntityType::all()
        .iter()
        .copied()
        .find(|kind| kind.legacy_id_prefix() == prefix)?;
    (implied != entity.kind).then(|| {
        format!(
            "{} looks like a legacy {implied} id but is tagged {}",
            entity.id, entity.kind
        )
    })
}

fn recommendations(analysis: &MigrationAnalysis) -> Vec<String> {
    let mut out = Vec::new();
    let uninitialized = analysis
        .total_objects
        .saturating_sub(analysis.migrated_objects);
    if uninitialized > 0 {
        out.push(format!(
            "initialize relational fields on {uninitialized} object(s)"
        ));
    }
    if analysis.potential_links > 0 {
        out.push(format!(
            "restore {} link(s) from legacy projectId/domainId",
            analysis.potential_links
        ));
    }
    if !analysis.issues.is_empty() {
        out.push(format!(
            "review {} issue(s) before migrating; unresolved pointers are skipped",
            analysis.issues.len()
        ));
    }
    if out.is_empty() {
        out.push("data already matches the hierarchy model; no migration needed".to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{legacy_prefix_mismatch, LegacyParent};
    use crate::hierarchy::index::EntityIndex;
    use crate::model::entity::{Entity, EntityType};
    use crate::model::state::HierarchyState;

    #[test]
    fn legacy_resolution_falls_back_to_domain() {
        let state = HierarchyState::new()
            .with(Entity::with_id("d1", EntityType::Domain))
            .with(
                Entity::with_id("t1", EntityType::Task)
                    .with_legacy_ancestors(Some("p-missing"), Some("d1")),
            )
            .with(Entity::with_id("t2", EntityType::Task).with_legacy_ancestors(Some("p-gone"), None));
        let index = EntityIndex::build(&state);

        let t1 = index.get("t1").expect("t1");
        assert!(matches!(
            LegacyParent::resolve(&index, t1),
            LegacyParent::Resolved(parent) if parent.id == "d1"
        ));

        let t2 = index.get("t2").expect("t2");
        assert!(matches!(
            LegacyParent::resolve(&index, t2),
            LegacyParent::Dangling { field: "projectId", id: "p-gone" }
        ));
    }

    #[test]
    fn prefix_mismatch_ignores_uuid_ids() {
        let mismatched = Entity::with_id("p7", EntityType::Task);
        assert!(legacy_prefix_mismatch(&mismatched).is_some());

        let matching = Entity::with_id("t_abc", EntityType::Task);
        assert!(legacy_prefix_mismatch(&matching).is_none());

        let uuid = Entity::with_id("d3a1b2c4-0000-4000-8000-000000000000", EntityType::Task);
        assert!(legacy_prefix_mismatch(&uuid).is_none());
    }
}
