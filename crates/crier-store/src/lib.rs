//! # crier-store
//!
//! SQLite implementation of the crier [`Store`](crier_core::Store) contract.
//!
//! The schema is created on startup with `CREATE TABLE IF NOT EXISTS`;
//! broadcast ids come from the table's AUTOINCREMENT column, which keeps id
//! assignment atomic under concurrent publishes.

pub mod sqlite;

pub use sqlite::SqliteStore;
