// crates/photopipe-store-sqlite/src/lib.rs
// ============================================================================
// Module: Photopipe SQLite Store
// Description: Durable pipeline state store backed by SQLite.
// Purpose: Provide the transactional implementation of the core contracts.
// Dependencies: photopipe-core, rusqlite, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! `photopipe-store-sqlite` persists the pipeline state model in a single
//! `SQLite` database and implements every operation contract from
//! `photopipe-core`. Claims, stage transitions, and registrations run inside
//! immediate write transactions so concurrent workers sharing one database
//! file never observe partial counter updates or double-claim an item.

/// `SQLite`-backed pipeline state store.
pub mod store;

pub use store::SqlitePipelineStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
