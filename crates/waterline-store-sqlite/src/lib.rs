// crates/waterline-store-sqlite/src/lib.rs
// ============================================================================
// Module: Waterline SQLite Store Library
// Description: Durable row store for entities, runs, and snapshots.
// Purpose: Expose the SQLite implementation of the datastore interfaces.
// Dependencies: crate::store
// ============================================================================

//! ## Overview
//! One SQLite database (WAL by default) implementing both datastore
//! collaborator traits: canonical entity tables with projected natural-key
//! columns and conditional version updates, plus blueprints, submissions,
//! pipeline runs, append-only step results, and append-only entity
//! snapshots.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteJournalMode;
pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteSyncMode;
