//! Parley storage crate - backend drivers for reference data.
//!
//! Relational subjects are served through [`RelationalDriver`] (SQLite via
//! rusqlite); document subjects through [`DocumentDriver`] (plain text and
//! PDF extraction from the local filesystem).

pub mod document;
pub mod relational;

pub use document::{DocumentDriver, FileDocumentDriver};
pub use relational::{RelationalDriver, SqliteDriver};
