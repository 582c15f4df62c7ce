//! Storage traits and error types

use crate::robots::CachedRobots;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence for fetched crawl directives
///
/// The limiter serializes access behind a mutex, so implementations need not
/// be `Sync`.
pub trait DirectiveStore: Send {
    /// Loads the stored directives for a domain, regardless of age
    ///
    /// # Returns
    ///
    /// * `Ok(Some(CachedRobots))` - Stored directives with their fetch time
    /// * `Ok(None)` - Nothing stored for this domain
    fn load_directives(&self, domain: &str) -> StorageResult<Option<CachedRobots>>;

    /// Stores (or replaces) the directives for a domain
    fn save_directives(&self, domain: &str, directives: &CachedRobots) -> StorageResult<()>;

    /// Number of domains with stored directives
    fn count_directives(&self) -> StorageResult<u64>;
}
