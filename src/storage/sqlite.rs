//! SQLite storage implementation

use crate::robots::{CachedRobots, ParsedRobots};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{DirectiveStore, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite-backed directive store
pub struct SqliteDirectiveStore {
    conn: Connection,
}

impl SqliteDirectiveStore {
    /// Opens or creates the database at `path`
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteDirectiveStore)` - Successfully opened/created database
    /// * `Err(GatherError)` - Failed to open database
    pub fn new(path: &Path) -> crate::Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> crate::Result<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl DirectiveStore for SqliteDirectiveStore {
    fn load_directives(&self, domain: &str) -> StorageResult<Option<CachedRobots>> {
        let row = self
            .conn
            .query_row(
                "SELECT content, allow_all, fetched_at FROM directives WHERE domain = ?1",
                params![domain],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((content, allow_all, fetched_at)) = row else {
            return Ok(None);
        };

        let fetched_at = fetched_at.parse::<DateTime<Utc>>().map_err(|e| {
            StorageError::Serialization(format!(
                "Invalid fetched_at for {}: {}",
                domain, e
            ))
        })?;

        let robots = if allow_all != 0 {
            ParsedRobots::allow_all()
        } else {
            ParsedRobots::from_content(&content)
        };

        Ok(Some(CachedRobots::fetched_at(robots, fetched_at)))
    }

    fn save_directives(&self, domain: &str, directives: &CachedRobots) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO directives (domain, content, allow_all, fetched_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                domain,
                directives.content.content(),
                directives.content.is_allow_all() as i64,
                directives.fetched_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn count_directives(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM directives", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
