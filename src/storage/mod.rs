//! Storage module for persisting crawl directives
//!
//! Crawl directives are the only state that outlives a run. Persisting them
//! lets back-to-back runs against the same domains skip the robots.txt fetch
//! while the cached copy is still within its TTL.

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteDirectiveStore;
pub use traits::{DirectiveStore, StorageError, StorageResult};

use std::path::Path;

/// Opens (or creates) a directive store database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
pub fn open_directive_store(path: &Path) -> crate::Result<SqliteDirectiveStore> {
    SqliteDirectiveStore::new(path)
}
