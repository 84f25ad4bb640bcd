//! Hierarchy rule tables and derived read-only views.
//!
//! # Responsibility
//! - Hold the allowed-edges table and engine configuration.
//! - Build per-call id/adjacency indexes and guarded graph walks.
//! - Read and write per-entity lock flags.
//!
//! # Invariants
//! - Nothing in this module mutates relational fields; only the service
//!   layer does.

pub mod config;
pub mod cycle_guard;
pub mod index;
pub mod locks;
pub mod registry;
