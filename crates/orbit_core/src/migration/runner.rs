//! Migration execution and rollback.

use super::analysis::plan_restorations;
use super::{
    MigrationIssue, MigrationOptions, MigrationReport, Migrator, RollbackReport,
    HIERARCHY_MODEL_VERSION,
};
use crate::hierarchy::index::EntityIndex;
use crate::model::entity::Entity;
use crate::model::state::HierarchyState;
use crate::service::mutation::AttachRequest;
use crate::service::validation::ValidationErrorKind;
use log::{info, warn};
use std::time::Instant;

const CODE_DUPLICATE_ID: &str = "duplicate_id";
const CODE_UNRESOLVED_LEGACY_LINK: &str = "unresolved_legacy_link";

impl Migrator<'_> {
    /// Upgrades legacy records to the relational model.
    ///
    /// With `dry_run` the pipeline runs against a copy and `state` is left
    /// untouched; the report is identical to a real run.
    pub fn migrate(&self, state: &mut HierarchyState, options: MigrationOptions) -> MigrationReport {
        let started_at = Instant::now();
        info!(
            "event=migration_run module=migration status=start objects={} dry_run={} clear_existing={}",
            state.len(),
            options.dry_run,
            options.clear_existing
        );

        let report = if options.dry_run {
            let mut scratch = state.clone();
            self.run(&mut scratch, options)
        } else {
            self.run(state, options)
        };

        let duration_ms = started_at.elapsed().as_millis();
        if report.success {
            info!(
                "event=migration_run module=migration status=ok dry_run={} processed={} restored={} validated={} warnings={} duration_ms={duration_ms}",
                report.dry_run,
                report.processed_objects,
                report.restored_connections,
                report.validated_connections,
                report.warnings.len()
            );
        } else {
            warn!(
                "event=migration_run module=migration status=partial dry_run={} processed={} restored={} errors={} warnings={} duration_ms={duration_ms}",
                report.dry_run,
                report.processed_objects,
                report.restored_connections,
                report.errors.len(),
                report.warnings.len()
            );
        }
        report
    }

    /// Removes every engine-owned field, keeping legacy pointers.
    pub fn rollback_migration(&self, state: &mut HierarchyState) -> RollbackReport {
        let started_at = Instant::now();
        let mut report = RollbackReport::default();

        for entity in state.iter_mut() {
            if entity.clear_relational_fields() {
                report.cleared_objects += 1;
            } else {
                report.untouched_objects += 1;
            }
        }

        report.details.push(format!(
            "cleared relational fields on {} object(s); {} had none",
            report.cleared_objects, report.untouched_objects
        ));
        report.success = report.errors.is_empty();
        info!(
            "event=migration_rollback module=migration status=ok cleared={} untouched={} duration_ms={}",
            report.cleared_objects,
            report.untouched_objects,
            started_at.elapsed().as_millis()
        );
        report
    }

    fn run(&self, state: &mut HierarchyState, options: MigrationOptions) -> MigrationReport {
        let mut report = MigrationReport {
            dry_run: options.dry_run,
            model_version: HIERARCHY_MODEL_VERSION,
            processed_objects: state.len(),
            ..MigrationReport::default()
        };

        if options.clear_existing {
            let cleared = state
                .iter_mut()
                .map(Entity::clear_relational_fields)
                .filter(|changed| *changed)
                .count();
            report
                .details
                .push(format!("cleared relational fields on {cleared} object(s)"));
        }

        let duplicates: Vec<String> = EntityIndex::build(state)
            .duplicate_ids()
            .iter()
            .map(|id| id.to_string())
            .collect();
        for id in &duplicates {
            report.errors.push(MigrationIssue::new(
                Some(id.as_str()),
                CODE_DUPLICATE_ID,
                format!("id {id} is used by more than one entity; only the first is linked"),
            ));
        }

        let initialized = self.engine.initialize(state);
        report
            .details
            .push(format!("initialized relational fields on {initialized} object(s)"));

        if options.restore_connections {
            self.restore_connections(state, &mut report);
        }

        if options.validate_connections {
            self.fold_validation(state, &mut report);
        }

        report.success = report.errors.is_empty();
        report
    }

    fn restore_connections(&self, state: &mut HierarchyState, report: &mut MigrationReport) {
        let plan = {
            let index = EntityIndex::build(state);
            plan_restorations(self.engine, &index)
        };

        for (object_id, message) in plan.warnings {
            report.warnings.push(MigrationIssue::new(
                Some(object_id.as_str()),
                CODE_UNRESOLVED_LEGACY_LINK,
                message,
            ));
        }

        for link in plan.links {
            let request = AttachRequest::new(
                link.parent_type,
                link.parent_id,
                link.child_type,
                link.child_id,
            );
            match self.engine.attach(&request, state) {
                Ok(_) => report.restored_connections += 1,
                Err(err) => report.errors.push(MigrationIssue::new(
                    Some(request.child_id.as_str()),
                    err.code(),
                    format!(
                        "could not restore {} -> {}: {err}",
                        request.child_id, request.parent_id
                    ),
                )),
            }
        }

        report.details.push(format!(
            "restored {} connection(s) from legacy pointers",
            report.restored_connections
        ));
    }

    fn fold_validation(&self, state: &HierarchyState, report: &mut MigrationReport) {
        report.validated_connections = state
            .iter()
            .filter(|entity| entity.parent_id.is_some())
            .count();

        for finding in self.engine.validate_hierarchy(state) {
            // Already reported while indexing.
            if finding.kind == ValidationErrorKind::DuplicateId {
                continue;
            }
            let issue = MigrationIssue::new(
                Some(finding.object_id.as_str()),
                finding.kind.code(),
                finding.message,
            );
            if finding.kind.is_structural() {
                report.errors.push(issue);
            } else {
                report.warnings.push(issue);
            }
        }

        report.details.push(format!(
            "validated {} connection(s)",
            report.validated_connections
        ));
    }
}
