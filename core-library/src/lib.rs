//! # Library Consistency Module
//!
//! Keeps relationships and denormalized aggregates consistent on top of a
//! remote record store that offers only independent CRUD calls.
//!
//! ## Overview
//!
//! This module manages:
//! - Relationship toggles over join collections (likes, follows, membership)
//! - Recomputation of derived counters from their join rows
//! - Ordered playlist membership, including staged reordering
//! - Two-hop lookups and search/ranking queries
//! - Per-key critical sections for check-then-act sequences
//!
//! Catalog services in [`services`] compose these pieces for the music
//! domain; [`memory::InMemoryStore`] stands in for the remote store in tests.

pub mod error;
pub mod locks;
pub mod membership;
pub mod memory;
pub mod models;
pub mod query;
pub mod reconcile;
pub mod resolver;
pub mod services;
pub mod toggle;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{LibraryError, PartialFailure, Result};
pub use locks::{KeyedLocks, LockKey};
pub use membership::{MembershipChange, MembershipManager, MembershipUpdate};
pub use reconcile::{AggregateReconciler, AggregateSpec, Reconciliation};
pub use resolver::{EntityResolver, Relation};
pub use toggle::{JoinSpec, RelationshipToggle, ToggleOutcome};
