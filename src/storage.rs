//! Storage subsystem
//!
//! Append-only SQLite persistence for observed handshakes (`fingerprints`)
//! and for requests answered by the TLS listener (`www`).
//!
//! Components:
//! - `types`: records written by the pipeline and listener, rows read back.
//! - `database_storage`: the sqlx backed store.

pub mod database_storage;
pub mod types;

pub use database_storage::DatabaseStorage;
pub use types::{ConnectionRecord, ConnectionRow, FingerprintRecord, FingerprintRow};
