//! Engine-wide registry of databases and view files.
//!
//! Stored in `dbs/_local.db`:
//!
//! ```text
//! dbs(name, filename)
//! views(db, name, signature, filename)
//! ```
//!
//! View rows are the reference counts for view files: a file is removed once
//! no row of its database points at it.

use crate::error::{CoreError, CoreResult};
use crate::store::schema;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::fmt;
use std::path::Path;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS dbs (
        name      TEXT PRIMARY KEY,
        filename  TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS views (
        db         TEXT NOT NULL,
        name       TEXT NOT NULL,
        signature  TEXT NOT NULL,
        filename   TEXT NOT NULL,
        PRIMARY KEY (db, name)
    );
";

/// A registered view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewEntry {
    /// Qualified view name.
    pub name: String,
    /// Signature of the definition the file was built from.
    pub signature: String,
    /// View file name (without directory).
    pub filename: String,
}

/// The registry database.
pub struct Registry {
    conn: Mutex<Connection>,
}

impl Registry {
    /// Opens (or creates) the registry at `path`.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let conn = schema::open_writer(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// All registered databases as `(name, filename)`, ordered by name.
    pub fn databases(&self) -> CoreResult<Vec<(String, String)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name, filename FROM dbs ORDER BY name")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Registers a database.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseExists` if the name is taken.
    pub fn insert_database(&self, name: &str, filename: &str) -> CoreResult<()> {
        let conn = self.conn.lock();
        match conn.execute(
            "INSERT INTO dbs (name, filename) VALUES (?1, ?2)",
            params![name, filename],
        ) {
            Ok(_) => Ok(()),
            Err(e) if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) => {
                Err(CoreError::DatabaseExists {
                    name: name.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Removes a database and all of its view rows.
    pub fn remove_database(&self, name: &str) -> CoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM views WHERE db = ?1", params![name])?;
        tx.execute("DELETE FROM dbs WHERE name = ?1", params![name])?;
        tx.commit()?;
        Ok(())
    }

    /// Looks up one view row.
    pub fn view(&self, db: &str, name: &str) -> CoreResult<Option<ViewEntry>> {
        view_row(&self.conn.lock(), db, name)
    }

    /// All view rows of `db`.
    pub fn views(&self, db: &str) -> CoreResult<Vec<ViewEntry>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT name, signature, filename FROM views WHERE db = ?1 ORDER BY name")?;
        let rows = stmt
            .query_map(params![db], |row| {
                Ok(ViewEntry {
                    name: row.get(0)?,
                    signature: row.get(1)?,
                    filename: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Points view `name` of `db` at `entry`, returning the previous row.
    pub fn put_view(&self, db: &str, entry: &ViewEntry) -> CoreResult<Option<ViewEntry>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let previous = view_row(&tx, db, &entry.name)?;
        tx.execute(
            "INSERT INTO views (db, name, signature, filename) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT (db, name) DO UPDATE SET \
                signature = excluded.signature, filename = excluded.filename",
            params![db, entry.name, entry.signature, entry.filename],
        )?;
        tx.commit()?;
        Ok(previous)
    }

    /// Removes view `name` of `db`, returning the removed row.
    pub fn remove_view(&self, db: &str, name: &str) -> CoreResult<Option<ViewEntry>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let previous = view_row(&tx, db, name)?;
        tx.execute(
            "DELETE FROM views WHERE db = ?1 AND name = ?2",
            params![db, name],
        )?;
        tx.commit()?;
        Ok(previous)
    }

    /// Number of view rows of `db` pointing at `filename`.
    pub fn file_references(&self, db: &str, filename: &str) -> CoreResult<u64> {
        let conn = self.conn.lock();
        let count = conn.query_row(
            "SELECT COUNT(1) FROM views WHERE db = ?1 AND filename = ?2",
            params![db, filename],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn view_row(conn: &Connection, db: &str, name: &str) -> CoreResult<Option<ViewEntry>> {
    let entry = conn
        .query_row(
            "SELECT name, signature, filename FROM views WHERE db = ?1 AND name = ?2",
            params![db, name],
            |row| {
                Ok(ViewEntry {
                    name: row.get(0)?,
                    signature: row.get(1)?,
                    filename: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(entry)
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}
