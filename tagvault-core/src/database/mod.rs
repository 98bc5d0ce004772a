//! Database layer for the password manager.
//!
//! This module holds the typed entities shared by every backend and the
//! SQLite connection and schema used by the relational backend.

pub mod models;
pub mod schema;

pub use models::{CredentialRecord, StoredRecord, Tag, User};
pub use schema::Database;
