//! Hierarchy data model.
//!
//! # Responsibility
//! - Define the typed entity record and the caller-owned state container.
//! - Keep relational field defaults in one place.
//!
//! # Invariants
//! - Every entity carries an explicit, immutable type tag.
//! - The engine owns relational fields only; creation and deletion of
//!   records stay with the caller.

pub mod entity;
pub mod state;
