//! Database schema definitions

/// SQL schema for the directive store
pub const SCHEMA_SQL: &str = r#"
-- Crawl directives per domain (host[:port])
CREATE TABLE IF NOT EXISTS directives (
    domain TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    allow_all INTEGER NOT NULL DEFAULT 0,
    fetched_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
