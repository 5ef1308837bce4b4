use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use tracing::debug;

/// Open (creating if needed) the SQLite file at `path`, configure the
/// connection, and make sure the schema exists.
pub fn open_database(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create data directory")?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open SQLite database at {}", path.display()))?;
    configure(&conn, busy_timeout)?;
    ensure_schema(&conn)?;
    debug!(path = %path.display(), "database ready");
    Ok(conn)
}

/// Private in-memory store with the full schema, used by tests and dry runs.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    configure(&conn, Duration::ZERO)?;
    ensure_schema(&conn)?;
    Ok(conn)
}

/// Foreign keys are off by default in SQLite and the cascade from books and
/// members to their borrow records depends on them. The busy timeout lets a
/// second writer wait for an open lending transaction instead of failing.
fn configure(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    if busy_timeout.as_millis() > i32::MAX as u128 {
        bail!("busy timeout of {} ms is too large", busy_timeout.as_millis());
    }
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign keys")?;
    conn.busy_timeout(busy_timeout)
        .context("failed to set busy timeout")?;
    Ok(())
}

/// Create the three catalog tables if they are missing.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS books (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            author TEXT NOT NULL,
            total_copies INTEGER NOT NULL CHECK (total_copies >= 1),
            isbn TEXT UNIQUE
        )",
        [],
    )
    .context("failed to create books table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS members (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            join_date TEXT NOT NULL
        )",
        [],
    )
    .context("failed to create members table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS borrow_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            book_id INTEGER NOT NULL,
            member_id INTEGER NOT NULL,
            borrow_date TEXT NOT NULL,
            return_date TEXT,
            CHECK (return_date IS NULL OR return_date >= borrow_date),
            FOREIGN KEY(book_id) REFERENCES books(id) ON DELETE CASCADE,
            FOREIGN KEY(member_id) REFERENCES members(id) ON DELETE CASCADE
        )",
        [],
    )
    .context("failed to create borrow_records table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS borrow_records_open_by_book
            ON borrow_records (book_id) WHERE return_date IS NULL",
        [],
    )
    .context("failed to create borrow record index")?;

    Ok(())
}
