//! Document store schema and connection setup.

use crate::error::CoreResult;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::Duration;

/// How long a connection waits on a locked file before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS documents (
        doc_id   TEXT PRIMARY KEY,
        version  INTEGER NOT NULL,
        hash     TEXT NOT NULL,
        kind     TEXT,
        deleted  INTEGER NOT NULL DEFAULT 0,
        data     TEXT,
        seq_id   TEXT NOT NULL
    ) WITHOUT ROWID;

    CREATE INDEX IF NOT EXISTS idx_documents_seq ON documents (seq_id);

    CREATE TABLE IF NOT EXISTS changes (
        seq_id      TEXT PRIMARY KEY,
        seq_number  INTEGER NOT NULL,
        doc_id      TEXT NOT NULL,
        version     INTEGER NOT NULL,
        hash        TEXT NOT NULL,
        deleted     INTEGER NOT NULL DEFAULT 0
    ) WITHOUT ROWID;

    CREATE UNIQUE INDEX IF NOT EXISTS idx_changes_doc_version ON changes (doc_id, version);
";

/// Opens a read-write connection in WAL mode.
pub(crate) fn open_writer(path: &Path) -> CoreResult<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}

/// Opens a read-only connection.
pub(crate) fn open_reader(path: &Path) -> CoreResult<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

/// Creates the document store relations if missing.
pub(crate) fn initialize(conn: &Connection) -> CoreResult<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
