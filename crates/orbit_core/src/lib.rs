//! Core hierarchy engine for Orbit.
//! This crate owns the relational rules over a caller-held entity state.

pub mod hierarchy;
pub mod logging;
pub mod migration;
pub mod model;
pub mod service;

pub use hierarchy::config::{ConfigError, HierarchyConfig};
pub use hierarchy::locks::{
    lock_statistics, set_lock_many, BatchLockReport, LockKind, LockStatistics,
};
pub use hierarchy::registry::AllowedEdges;
pub use logging::{default_log_level, init_logging, logging_status, LogSink, LoggingError};
pub use migration::{
    MigrationAnalysis, MigrationIssue, MigrationOptions, MigrationPreview, MigrationReport,
    Migrator, RollbackReport,
};
pub use model::entity::{Entity, EntityId, EntityType, LayoutConstraints, Locks};
pub use model::state::HierarchyState;
pub use service::engine::HierarchyEngine;
pub use service::mutation::{
    AttachRequest, DetachRequest, LinkOutcome, MoveOutcome, MoveRequest, MutationError,
    MutationResult,
};
pub use service::validation::{FixReport, ValidationError, ValidationErrorKind};

/// Minimal health-check API for integrations.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
