//! Hierarchy engine use-case services.
//!
//! # Responsibility
//! - Expose the engine facade: queries, relational mutations, validation.
//! - Keep rule tables and traversal primitives behind one entry point.
//!
//! # Invariants
//! - Mutations go through `attach`/`detach`/`move_to` only.
//! - Public operations return result values and never panic.

pub mod engine;
pub mod mutation;
pub mod validation;
