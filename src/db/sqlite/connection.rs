//! SQLite connection utilities

use rusqlite::Connection;
use std::path::Path;

/// Open a connection with the pragmas the catalog store relies on:
/// WAL for concurrent polling reads, foreign keys for upload rollback.
pub fn create_connection(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
    )?;
    Ok(conn)
}
