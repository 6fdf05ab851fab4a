//! Test fixtures and database helpers.
//!
//! Provides temporary engines plus builders for the documents most tests
//! need.

use kdb_core::{Config, Database, Document, Engine};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// An engine on a temporary data directory.
pub struct TestEngine {
    /// The engine instance.
    pub engine: Engine,
    temp_dir: TempDir,
}

impl TestEngine {
    /// Opens an engine on a fresh temporary directory.
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    /// Like [`TestEngine::new`], letting `f` adjust the configuration.
    pub fn with_config(f: impl FnOnce(Config) -> Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let engine = Engine::open(f(Config::new(temp_dir.path()))).expect("Failed to open engine");
        Self { engine, temp_dir }
    }

    /// Root of the data directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Closes the engine and opens a new one on the same directory.
    #[must_use]
    pub fn reopen(self) -> Self {
        let Self { engine, temp_dir } = self;
        let config = engine.config().clone();
        drop(engine);
        let engine = Engine::open(config).expect("Failed to reopen engine");
        Self { engine, temp_dir }
    }

    /// Creates database `name`.
    pub fn create(&self, name: &str) -> Arc<Database> {
        self.engine
            .create_database(name)
            .expect("Failed to create database")
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestEngine {
    type Target = Engine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// Runs a test against database `test` in a temporary engine.
///
/// # Example
///
/// ```rust,ignore
/// use kdb_testkit::with_temp_db;
///
/// #[test]
/// fn my_test() {
///     with_temp_db(|db| {
///         assert_eq!(db.get_document_count().unwrap().live, 1);
///     });
/// }
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let engine = TestEngine::new();
    let db = engine.create("test");
    f(&db)
}

/// Parses a JSON value into a document.
pub fn doc(value: Value) -> Document {
    Document::from_value(value).expect("Invalid document")
}

/// Design document builders.
pub mod designs {
    use super::*;

    /// A view that records every change it folds in.
    ///
    /// `setup` creates table `{table}`; the delta appends one row per change
    /// (`seq_id`, `doc_id`) and a row to `{table}_builds` per build. The
    /// `default` select returns the number of changes, `builds` the number of
    /// builds, and `ids` the changed ids filtered by `${id}`.
    pub fn change_log_view(table: &str) -> Value {
        json!({
            "setup": [
                format!("CREATE TABLE IF NOT EXISTS {table} (seq_id TEXT PRIMARY KEY, doc_id TEXT)"),
                format!("CREATE TABLE IF NOT EXISTS {table}_builds (end_seq TEXT PRIMARY KEY)"),
            ],
            "delta": [
                format!("INSERT INTO {table} SELECT seq_id, doc_id FROM docsdb.changes WHERE seq_id > ${{begin_seq}} AND seq_id <= ${{end_seq}}"),
                format!("INSERT INTO {table}_builds VALUES (${{end_seq}})"),
            ],
            "select": {
                "default": format!("SELECT COUNT(1) FROM {table}"),
                "builds": format!("SELECT COUNT(1) FROM {table}_builds"),
                "ids": format!("SELECT JSON_GROUP_ARRAY(doc_id) FROM (SELECT doc_id FROM {table} WHERE (${{id}} IS NULL OR doc_id = ${{id}}) ORDER BY seq_id)"),
            },
        })
    }

    /// Design document `_design/{name}` holding `views`.
    pub fn design_document(name: &str, views: Value) -> Document {
        doc(json!({"_id": format!("_design/{name}"), "views": views}))
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates database `test` with `count` documents `doc-0`, `doc-1`, …
    pub fn populated_database(count: usize) -> (TestEngine, Arc<Database>) {
        let engine = TestEngine::new();
        let db = engine.create("test");
        for i in 0..count {
            db.put_document(doc(json!({"_id": format!("doc-{i}"), "index": i})))
                .expect("Failed to put document");
        }
        (engine, db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_temp_db() {
        with_temp_db(|db| {
            assert_eq!(db.name(), "test");
            assert_eq!(db.get_document_count().unwrap().live, 1);
        });
    }

    #[test]
    fn test_populated_scenario() {
        let (_engine, db) = scenarios::populated_database(5);
        assert_eq!(db.get_document_count().unwrap().live, 6);
        assert_eq!(db.get_document("doc-3").unwrap().data["index"], json!(3));
    }

    #[test]
    fn test_reopen_keeps_directory() {
        let engine = TestEngine::new();
        engine.create("keep");
        let path = engine.path().to_path_buf();
        let engine = engine.reopen();
        assert_eq!(engine.path(), path);
        assert_eq!(engine.list_databases(), ["keep"]);
    }
}
