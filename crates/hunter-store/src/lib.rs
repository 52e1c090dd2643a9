//! hunter-store: durable storage for Hunter.
//!
//! A single SQLite database holds both the enrolled persons (with their
//! signatures) and the append-only log of confirmed matches.

pub mod sqlite;

pub use sqlite::SqliteStore;
