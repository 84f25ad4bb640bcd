//! Legacy data migration into the relational hierarchy model.
//!
//! # Responsibility
//! - Analyze legacy records and preview the planned migration.
//! - Initialize relational fields and restore links from legacy pointers.
//! - Roll migrated fields back.
//!
//! # Invariants
//! - No migration state persists between calls; each step reads live state.
//! - One entity's failure is recorded and never aborts the batch.
//! - `success` is `true` iff the aggregate error list is empty.
//! - Re-running a migration restores no link twice.

mod analysis;
mod runner;

use crate::model::entity::{EntityId, EntityType};
use crate::service::engine::HierarchyEngine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use analysis::LegacyParent;

/// Relational model version produced by [`Migrator::migrate`].
pub const HIERARCHY_MODEL_VERSION: u32 = 2;

/// Coarse per-object cost of the initialize step, in milliseconds.
const INIT_COST_MS: u64 = 1;
/// Coarse per-link cost of the restore step, in milliseconds.
const RESTORE_COST_MS: u64 = 2;
/// Coarse per-link cost of the validate step, in milliseconds.
const VALIDATE_COST_MS: u64 = 1;

/// Migration switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MigrationOptions {
    /// Clear every relational field before initializing.
    pub clear_existing: bool,
    /// Re-derive `parentId` from legacy `projectId`/`domainId`.
    pub restore_connections: bool,
    /// Run the validator afterwards and fold findings into the report.
    pub validate_connections: bool,
    /// Run against a scratch copy and leave the state untouched.
    pub dry_run: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            clear_existing: false,
            restore_connections: true,
            validate_connections: true,
            dry_run: false,
        }
    }
}

/// Per-type counts gathered by [`Migrator::analyze_existing_data`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeAnalysis {
    pub total: usize,
    /// Entities with every relational field initialized.
    pub with_relational_fields: usize,
    /// Entities with a canonical `parentId`.
    pub with_parent_link: usize,
    /// Entities without `parentId` whose legacy pointers name a parent.
    pub potential_links: usize,
}

/// Legacy data survey.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationAnalysis {
    pub total_objects: usize,
    pub by_type: BTreeMap<EntityType, TypeAnalysis>,
    pub migrated_objects: usize,
    pub existing_links: usize,
    pub potential_links: usize,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Entity the migration would initialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedObject {
    pub id: EntityId,
    pub kind: EntityType,
}

/// Link the migration would restore from legacy pointers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedLink {
    pub child_type: EntityType,
    pub child_id: EntityId,
    pub parent_type: EntityType,
    pub parent_id: EntityId,
}

/// Dry-run plan of [`Migrator::migrate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationPreview {
    pub objects_to_initialize: Vec<PlannedObject>,
    pub connections_to_restore: Vec<PlannedLink>,
    /// Parent links the validator would check afterwards.
    pub connections_to_validate: usize,
    /// Legacy pointers that cannot be restored, with reasons.
    pub warnings: Vec<String>,
    pub estimated_time_ms: u64,
}

/// One per-entity finding in a migration or rollback report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationIssue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<EntityId>,
    pub code: String,
    pub message: String,
}

impl MigrationIssue {
    pub(crate) fn new(
        object_id: Option<&str>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            object_id: object_id.map(str::to_string),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Outcome of [`Migrator::migrate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub success: bool,
    pub dry_run: bool,
    pub model_version: u32,
    pub processed_objects: usize,
    pub restored_connections: usize,
    pub validated_connections: usize,
    pub errors: Vec<MigrationIssue>,
    pub warnings: Vec<MigrationIssue>,
    pub details: Vec<String>,
}

/// Outcome of [`Migrator::rollback_migration`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackReport {
    pub success: bool,
    pub cleared_objects: usize,
    /// Entities that carried no relational fields.
    pub untouched_objects: usize,
    pub errors: Vec<MigrationIssue>,
    pub details: Vec<String>,
}

/// Migration pipeline bound to one engine configuration.
#[derive(Debug, Clone, Copy)]
pub struct Migrator<'e> {
    engine: &'e HierarchyEngine,
}

impl<'e> Migrator<'e> {
    pub fn new(engine: &'e HierarchyEngine) -> Self {
        Self { engine }
    }
}

impl HierarchyEngine {
    /// Migration pipeline using this engine's rules.
    pub fn migrator(&self) -> Migrator<'_> {
        Migrator::new(self)
    }
}

fn estimate_time_ms(objects: usize, restore: usize, validate: usize) -> u64 {
    let as_u64 = |value: usize| u64::try_from(value).unwrap_or(u64::MAX);
    as_u64(objects)
        .saturating_mul(INIT_COST_MS)
        .saturating_add(as_u64(restore).saturating_mul(RESTORE_COST_MS))
        .saturating_add(as_u64(validate).saturating_mul(VALIDATE_COST_MS))
}
