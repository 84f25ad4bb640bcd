//! Engine configuration.
//!
//! # Responsibility
//! - Carry the allowed-edges table and global validator limits as one value.
//! - Reject configurations the engine cannot honor.
//!
//! # Invariants
//! - Limits are strictly positive.
//! - No configured edge may make `domain` a child.

use crate::hierarchy::registry::AllowedEdges;
use crate::model::entity::EntityType;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Default cap on direct children per parent.
pub const DEFAULT_MAX_CHILDREN_PER_PARENT: usize = 500;
/// Default cap on ancestor chain length (roots have depth `0`).
pub const DEFAULT_MAX_DEPTH: usize = 12;

/// Hierarchy engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HierarchyConfig {
    /// Permitted parent-type -> child-type edges.
    pub allowed_edges: AllowedEdges,
    /// Validator limit on direct children of one parent.
    pub max_children_per_parent: usize,
    /// Validator limit on entity depth.
    pub max_depth: usize,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            allowed_edges: AllowedEdges::default(),
            max_children_per_parent: DEFAULT_MAX_CHILDREN_PER_PARENT,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl HierarchyConfig {
    /// Replaces the allowed-edges table.
    pub fn with_allowed_edges(mut self, allowed_edges: AllowedEdges) -> Self {
        self.allowed_edges = allowed_edges;
        self
    }

    /// Replaces validator limits.
    pub fn with_limits(mut self, max_children_per_parent: usize, max_depth: usize) -> Self {
        self.max_children_per_parent = max_children_per_parent;
        self.max_depth = max_depth;
        self
    }

    /// Validates configuration invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_children_per_parent == 0 {
            return Err(ConfigError::ZeroChildLimit);
        }
        if self.max_depth == 0 {
            return Err(ConfigError::ZeroDepthLimit);
        }
        if let Some(parent) = self.allowed_edges.allowed_parents(EntityType::Domain).first() {
            return Err(ConfigError::DomainAsChild(*parent));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `max_children_per_parent` is zero.
    ZeroChildLimit,
    /// `max_depth` is zero.
    ZeroDepthLimit,
    /// The edge table lets this type parent a domain.
    DomainAsChild(EntityType),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroChildLimit => write!(f, "max_children_per_parent must be positive"),
            Self::ZeroDepthLimit => write!(f, "max_depth must be positive"),
            Self::DomainAsChild(parent) => {
                write!(f, "allowed edges must not place a domain under {parent}")
            }
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::{ConfigError, HierarchyConfig};
    use crate::hierarchy::registry::AllowedEdges;
    use crate::model::entity::EntityType;

    #[test]
    fn default_config_is_valid() {
        HierarchyConfig::default()
            .validate()
            .expect("default config should validate");
    }

    #[test]
    fn rejects_zero_limits() {
        let err = HierarchyConfig::default()
            .with_limits(0, 4)
            .validate()
            .expect_err("zero child limit must fail");
        assert_eq!(err, ConfigError::ZeroChildLimit);

        let err = HierarchyConfig::default()
            .with_limits(4, 0)
            .validate()
            .expect_err("zero depth limit must fail");
        assert_eq!(err, ConfigError::ZeroDepthLimit);
    }

    #[test]
    fn rejects_domain_children() {
        let mut edges = AllowedEdges::leaf_terminal();
        edges.allow(EntityType::Project, EntityType::Domain);
        let err = HierarchyConfig::default()
            .with_allowed_edges(edges)
            .validate()
            .expect_err("domain child must fail");
        assert_eq!(err, ConfigError::DomainAsChild(EntityType::Project));
    }
}
