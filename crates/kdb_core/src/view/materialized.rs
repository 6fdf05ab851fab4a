//! A materialized view backed by its own SQLite file.
//!
//! The document store is attached read-only as `docsdb`, so delta scripts
//! read `docsdb.changes` and `docsdb.documents` directly. The build cursor
//! lives in `view_meta` and only moves inside the transaction that applies
//! the deltas:
//!
//! ```text
//! view_meta(id = 1, current_seq, next_seq)
//! ```
//!
//! While a build runs, `current_seq` is the old cursor and `next_seq` the
//! target; at rest both hold the last applied token.

use crate::config::Config;
use crate::document::ViewDefinition;
use crate::error::{CoreError, CoreResult};
use crate::pool::Pool;
use crate::store::schema;
use crate::types::{SelectParams, UpdateSeq};
use crate::view::query::{sql_value, Query};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

const VIEW_META: &str = "
    CREATE TABLE IF NOT EXISTS view_meta (
        id           INTEGER PRIMARY KEY,
        current_seq  TEXT NOT NULL,
        next_seq     TEXT NOT NULL
    );

    INSERT INTO view_meta (id, current_seq, next_seq)
        SELECT 1, '', '' WHERE NOT EXISTS (SELECT 1 FROM view_meta WHERE id = 1);
";

/// Placeholder bound to the view's cursor in delta scripts.
pub const BEGIN_SEQ: &str = "begin_seq";
/// Placeholder bound to the build target in delta scripts.
pub const END_SEQ: &str = "end_seq";

/// One opened view.
pub struct View {
    name: String,
    path: PathBuf,
    delta: Vec<Query>,
    select: BTreeMap<String, Query>,
    writer: Pool<Connection>,
    readers: Pool<Connection>,
}

impl View {
    /// Opens the view file at `path`, running `setup` scripts.
    pub fn open(
        name: &str,
        path: &Path,
        store_path: &Path,
        definition: &ViewDefinition,
        config: &Config,
    ) -> CoreResult<Self> {
        let setup: Vec<Query> = definition.setup.iter().map(|s| Query::parse(s)).collect();
        let delta = definition.delta.iter().map(|s| Query::parse(s)).collect();
        let select = definition
            .select
            .iter()
            .map(|(k, v)| (k.clone(), Query::parse(v)))
            .collect();

        let writer = Pool::open(format!("{name}:writer"), 1, config.acquire_timeout, |_| {
            let mut conn = schema::open_writer(path)?;
            conn.execute_batch(VIEW_META)?;
            attach_store(&conn, store_path)?;

            let tx = conn.transaction()?;
            for script in &setup {
                let values = script.bind(|_| None);
                tx.execute(&script.text, params_from_iter(values))
                    .map_err(|e| CoreError::view_script(&e, &script.source))?;
            }
            tx.commit()?;
            Ok(conn)
        })?;

        let readers = Pool::open(
            format!("{name}:readers"),
            config.view_reader_pool_size,
            config.acquire_timeout,
            |_| {
                let conn = schema::open_reader(path)?;
                attach_store(&conn, store_path)?;
                Ok(conn)
            },
        )?;

        tracing::debug!(view = %name, path = %path.display(), "view opened");

        Ok(Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            delta,
            select,
            writer,
            readers,
        })
    }

    /// Qualified name (`<design doc id>$<view name>`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The last token applied to this view.
    pub fn current_seq(&self) -> CoreResult<String> {
        let conn = self.readers.acquire()?;
        let seq = conn.query_row("SELECT current_seq FROM view_meta WHERE id = 1", [], |row| {
            row.get(0)
        })?;
        Ok(seq)
    }

    /// Applies the delta scripts for `(cursor, target]`.
    ///
    /// Returns `false` without touching the view when the cursor has already
    /// reached `target`. On failure nothing is applied and the cursor stays.
    pub fn build(&self, target: &UpdateSeq) -> CoreResult<bool> {
        let mut conn = self.writer.acquire()?;
        let tx = conn.transaction()?;

        let current: String = tx.query_row(
            "SELECT current_seq FROM view_meta WHERE id = 1",
            [],
            |row| row.get(0),
        )?;
        if target.is_empty() || current.as_str() >= target.id.as_str() {
            return Ok(false);
        }

        tx.execute(
            "UPDATE view_meta SET next_seq = ?1 WHERE id = 1",
            params![target.id],
        )?;

        for script in &self.delta {
            let values = script.bind(|name| match name {
                BEGIN_SEQ => Some(SqlValue::Text(current.clone())),
                END_SEQ => Some(SqlValue::Text(target.id.clone())),
                _ => None,
            });
            tx.execute(&script.text, params_from_iter(values))
                .map_err(|e| CoreError::view_script(&e, &script.source))?;
        }

        tx.execute(
            "UPDATE view_meta SET current_seq = ?1, next_seq = ?1 WHERE id = 1",
            params![target.id],
        )?;
        tx.commit()?;

        tracing::debug!(view = %self.name, from = %current, to = %target.id, "view built");
        Ok(true)
    }

    /// Runs select script `name` and returns its single JSON value.
    ///
    /// # Errors
    ///
    /// - `ViewNotFound` if the view has no such select script
    /// - `ViewResultError` if the script does not produce exactly one column
    pub fn select(&self, name: &str, params: &SelectParams) -> CoreResult<Value> {
        let query = self
            .select
            .get(name)
            .ok_or_else(|| CoreError::view_not_found(format!("{}/{name}", self.name)))?;

        let mut conn = self.readers.acquire()?;
        let tx = conn.transaction()?;
        let result = {
            let mut stmt = tx
                .prepare(&query.text)
                .map_err(|e| CoreError::view_script(&e, &query.source))?;
            let columns = stmt.column_count();
            if columns != 1 {
                return Err(CoreError::ViewResult { columns });
            }

            let values = query.bind(|p| params.get(p).map(sql_value));
            stmt.query_row(params_from_iter(values), |row| row.get::<_, SqlValue>(0))
                .optional()
                .map_err(|e| CoreError::view_script(&e, &query.source))?
        };
        tx.commit()?;

        json_result(result.unwrap_or(SqlValue::Null))
    }

    /// Rebuilds the view file.
    pub fn vacuum(&self) -> CoreResult<()> {
        let conn = self.writer.acquire()?;
        conn.execute_batch("VACUUM")?;
        Ok(())
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Attaches the document store read-only as `docsdb`.
fn attach_store(conn: &Connection, store_path: &Path) -> CoreResult<()> {
    let absolute = std::fs::canonicalize(store_path)?;
    let uri = format!("file:{}?mode=ro", escape_uri_path(&absolute.to_string_lossy()));
    conn.execute("ATTACH DATABASE ?1 AS docsdb", params![uri])?;
    Ok(())
}

fn escape_uri_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '%' => out.push_str("%25"),
            '?' => out.push_str("%3f"),
            '#' => out.push_str("%23"),
            _ => out.push(c),
        }
    }
    out
}

fn json_result(value: SqlValue) -> CoreResult<Value> {
    Ok(match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Real(f) => Value::from(f),
        SqlValue::Text(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        SqlValue::Blob(_) => {
            return Err(CoreError::internal("select returned a blob, want json text"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::store::DocumentStore;
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _temp: TempDir,
        store: DocumentStore,
        view_path: PathBuf,
        config: Config,
    }

    fn fixture() -> Fixture {
        let temp = tempdir().unwrap();
        let config = Config::new(temp.path());
        let store = DocumentStore::open(&temp.path().join("docs.db"), &config).unwrap();
        let view_path = temp.path().join("view.db");
        Fixture {
            _temp: temp,
            store,
            view_path,
            config,
        }
    }

    fn counting_view() -> ViewDefinition {
        ViewDefinition {
            setup: vec!["CREATE TABLE IF NOT EXISTS ids (doc_id TEXT PRIMARY KEY, version INTEGER)".into()],
            delta: vec![
                "DELETE FROM ids WHERE doc_id IN (SELECT doc_id FROM docsdb.changes WHERE seq_id > ${begin_seq} AND seq_id <= ${end_seq})".into(),
                "INSERT INTO ids SELECT d.doc_id, d.version FROM docsdb.documents d WHERE d.deleted = 0 AND d.doc_id IN (SELECT doc_id FROM docsdb.changes WHERE seq_id > ${begin_seq} AND seq_id <= ${end_seq})".into(),
            ],
            select: [
                ("count".to_string(), "SELECT JSON_OBJECT('n', COUNT(1)) FROM ids WHERE (${id} IS NULL OR doc_id = ${id})".to_string()),
                ("pair".to_string(), "SELECT 1, 2".to_string()),
            ]
            .into_iter()
            .collect(),
        }
    }

    fn put(store: &DocumentStore, id: &str) {
        store
            .put_document(Document::from_value(json!({"_id": id})).unwrap())
            .unwrap();
    }

    #[test]
    fn build_applies_changes_and_advances_cursor() {
        let f = fixture();
        put(&f.store, "a");
        put(&f.store, "b");

        let view = View::open("_design/x$v", &f.view_path, f.store.path(), &counting_view(), &f.config).unwrap();
        let target = f.store.get_last_update_sequence().unwrap();

        assert!(view.build(&target).unwrap());
        assert_eq!(view.current_seq().unwrap(), target.id);
        assert_eq!(view.select("count", &SelectParams::new()).unwrap(), json!({"n": 2}));

        let mut params = SelectParams::new();
        params.insert("id".into(), json!("a"));
        assert_eq!(view.select("count", &params).unwrap(), json!({"n": 1}));
    }

    #[test]
    fn build_is_idempotent() {
        let f = fixture();
        put(&f.store, "a");
        let view = View::open("v", &f.view_path, f.store.path(), &counting_view(), &f.config).unwrap();
        let target = f.store.get_last_update_sequence().unwrap();

        assert!(view.build(&target).unwrap());
        assert!(!view.build(&target).unwrap());
        assert_eq!(view.select("count", &SelectParams::new()).unwrap(), json!({"n": 1}));
    }

    #[test]
    fn empty_target_is_a_no_op() {
        let f = fixture();
        let view = View::open("v", &f.view_path, f.store.path(), &counting_view(), &f.config).unwrap();
        assert!(!view.build(&UpdateSeq::default()).unwrap());
        assert_eq!(view.current_seq().unwrap(), "");
    }

    #[test]
    fn incremental_builds_see_only_new_changes() {
        let f = fixture();
        put(&f.store, "a");
        let view = View::open("v", &f.view_path, f.store.path(), &counting_view(), &f.config).unwrap();
        view.build(&f.store.get_last_update_sequence().unwrap()).unwrap();

        put(&f.store, "b");
        put(&f.store, "c");
        view.build(&f.store.get_last_update_sequence().unwrap()).unwrap();
        assert_eq!(view.select("count", &SelectParams::new()).unwrap(), json!({"n": 3}));
    }

    #[test]
    fn failed_build_keeps_cursor() {
        let f = fixture();
        put(&f.store, "a");
        let mut def = counting_view();
        def.delta.push("INSERT INTO missing_table VALUES (1)".into());
        let view = View::open("v", &f.view_path, f.store.path(), &def, &f.config).unwrap();

        let err = view.build(&f.store.get_last_update_sequence().unwrap()).unwrap_err();
        assert!(matches!(&err, CoreError::ViewScript { script, .. } if script.contains("missing_table")));
        assert_eq!(view.current_seq().unwrap(), "");
        assert_eq!(view.select("count", &SelectParams::new()).unwrap(), json!({"n": 0}));
    }

    #[test]
    fn select_checks_shape_and_name() {
        let f = fixture();
        let view = View::open("v", &f.view_path, f.store.path(), &counting_view(), &f.config).unwrap();

        let err = view.select("pair", &SelectParams::new()).unwrap_err();
        assert!(matches!(err, CoreError::ViewResult { columns: 2 }));

        let err = view.select("nope", &SelectParams::new()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ViewNotFound);
    }

    #[test]
    fn reopen_keeps_state() {
        let f = fixture();
        put(&f.store, "a");
        let target = f.store.get_last_update_sequence().unwrap();
        {
            let view = View::open("v", &f.view_path, f.store.path(), &counting_view(), &f.config).unwrap();
            view.build(&target).unwrap();
        }
        let view = View::open("v", &f.view_path, f.store.path(), &counting_view(), &f.config).unwrap();
        assert!(!view.build(&target).unwrap());
        assert_eq!(view.select("count", &SelectParams::new()).unwrap(), json!({"n": 1}));
    }

    #[test]
    fn uri_escaping() {
        assert_eq!(escape_uri_path("/a b/c?d#e%"), "/a b/c%3fd%23e%25");
    }
}
