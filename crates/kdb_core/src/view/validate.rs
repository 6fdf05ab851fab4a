//! Design document validation.
//!
//! Every view is replayed against a throwaway in-memory database that mirrors
//! what a real view file sees: `docsdb.documents` and `docsdb.changes` with a
//! few sample rows, plus `view_meta`. A design document is rejected if any
//! script uses a denylisted keyword, fails to run, or leaves the stand-ins
//! with a different projection or row count.

use crate::document::{DesignDocument, Document, ViewDefinition};
use crate::error::{CoreError, CoreResult};
use crate::view::materialized::{BEGIN_SEQ, END_SEQ};
use crate::view::query::Query;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};

/// Keywords no view script may contain (whole word, any case).
pub const DENYLIST: &[&str] = &[
    "ATTACH",
    "DETACH",
    "PRAGMA",
    "VACUUM",
    "BEGIN",
    "COMMIT",
    "ROLLBACK",
    "SAVEPOINT",
    "RELEASE",
    "REINDEX",
    "ANALYZE",
    "SQLITE_MASTER",
    "SQLITE_SCHEMA",
    "LOAD_EXTENSION",
];

const STAND_INS: &str = "
    ATTACH DATABASE ':memory:' AS docsdb;

    CREATE TABLE docsdb.documents (
        doc_id   TEXT PRIMARY KEY,
        version  INTEGER NOT NULL,
        hash     TEXT NOT NULL,
        kind     TEXT,
        deleted  INTEGER NOT NULL DEFAULT 0,
        data     TEXT,
        seq_id   TEXT NOT NULL
    ) WITHOUT ROWID;

    CREATE TABLE docsdb.changes (
        seq_id      TEXT PRIMARY KEY,
        seq_number  INTEGER NOT NULL,
        doc_id      TEXT NOT NULL,
        version     INTEGER NOT NULL,
        hash        TEXT NOT NULL,
        deleted     INTEGER NOT NULL DEFAULT 0
    ) WITHOUT ROWID;

    CREATE TABLE view_meta (
        id           INTEGER PRIMARY KEY,
        current_seq  TEXT NOT NULL,
        next_seq     TEXT NOT NULL
    );

    INSERT INTO docsdb.documents VALUES
        ('a', 1, 'h1', NULL, 0, '{\"x\":1}', 'B'),
        ('b', 2, 'h2', 'k', 1, NULL, 'D');
    INSERT INTO docsdb.changes VALUES
        ('A', 1, 'b', 1, 'h0', 0),
        ('B', 2, 'a', 1, 'h1', 0),
        ('D', 3, 'b', 2, 'h2', 1);
    INSERT INTO view_meta VALUES (1, '', 'D');
";

/// Stand-in relations and the projection each must keep.
const CHECKS: &[(&str, &str)] = &[
    (
        "docsdb.documents",
        "doc_id, version, hash, kind, deleted, data, seq_id",
    ),
    (
        "docsdb.changes",
        "seq_id, seq_number, doc_id, version, hash, deleted",
    ),
    ("view_meta", "id, current_seq, next_seq"),
];

/// Token every delta is replayed up to.
const SAMPLE_END_SEQ: &str = "D";

/// Validates `doc` and returns its parsed views.
///
/// # Errors
///
/// Returns `InvalidSqlStatement` describing the first offending script.
pub fn validate_design_document(doc: &Document) -> CoreResult<DesignDocument> {
    let ddoc = DesignDocument::from_document(doc)
        .map_err(|e| CoreError::invalid_sql(e.to_string(), None))?;

    for (name, view) in &ddoc.views {
        validate_view(view).map_err(|e| match e {
            CoreError::InvalidSqlStatement { message, script } => CoreError::InvalidSqlStatement {
                message: format!("view {name}: {message}"),
                script,
            },
            other => other,
        })?;
    }

    Ok(ddoc)
}

fn validate_view(view: &ViewDefinition) -> CoreResult<()> {
    let scripts = view
        .setup
        .iter()
        .chain(&view.delta)
        .chain(view.select.values());
    for script in scripts {
        if let Some(keyword) = denylisted_keyword(script) {
            return Err(CoreError::invalid_sql(
                format!("keyword {keyword} is not allowed"),
                Some(script),
            ));
        }
    }

    let conn = Connection::open_in_memory()?;
    conn.execute_batch(STAND_INS)?;
    let baseline = snapshot(&conn)?;

    for script in view.setup.iter().chain(&view.delta) {
        let query = Query::parse(script);
        let values = query.bind(|name| match name {
            BEGIN_SEQ => Some(SqlValue::Text(String::new())),
            END_SEQ => Some(SqlValue::Text(SAMPLE_END_SEQ.to_string())),
            _ => None,
        });
        conn.execute(&query.text, params_from_iter(values))
            .map_err(|e| CoreError::invalid_sql(e.to_string(), Some(script)))?;
    }

    for script in view.select.values() {
        let query = Query::parse(script);
        conn.prepare(&query.text)
            .map_err(|e| CoreError::invalid_sql(e.to_string(), Some(script)))?;
    }

    match snapshot(&conn) {
        Ok(after) if after == baseline => Ok(()),
        Ok(_) | Err(_) => Err(CoreError::invalid_sql(
            "scripts must not alter docsdb.documents, docsdb.changes or view_meta",
            None,
        )),
    }
}

/// Row counts of every stand-in, queried through its full projection.
fn snapshot(conn: &Connection) -> CoreResult<Vec<i64>> {
    CHECKS
        .iter()
        .map(|(table, columns)| {
            let sql = format!("SELECT COUNT(1) FROM (SELECT {columns} FROM {table})");
            Ok(conn.query_row(&sql, [], |row| row.get(0))?)
        })
        .collect()
}

/// Returns the first denylisted keyword used as a whole word in `script`.
#[must_use]
pub fn denylisted_keyword(script: &str) -> Option<&'static str> {
    script
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty())
        .find_map(|word| {
            DENYLIST
                .iter()
                .find(|keyword| keyword.eq_ignore_ascii_case(word))
                .copied()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::builtin;
    use serde_json::json;

    fn design(views: serde_json::Value) -> Document {
        Document::from_value(json!({"_id": "_design/t", "views": views})).unwrap()
    }

    fn view(setup: &[&str], delta: &[&str], select: &[(&str, &str)]) -> serde_json::Value {
        json!({
            "setup": setup,
            "delta": delta,
            "select": select.iter().map(|(k, v)| (k.to_string(), json!(v))).collect::<serde_json::Map<_, _>>(),
        })
    }

    #[test]
    fn builtin_views_pass() {
        let ddoc = validate_design_document(&builtin::default_design_document()).unwrap();
        assert!(ddoc.view(builtin::ALL_DOCS).is_some());
    }

    #[test]
    fn denylist_matches_whole_words() {
        assert_eq!(denylisted_keyword("pragma foo"), Some("PRAGMA"));
        assert_eq!(denylisted_keyword("SELECT * FROM sqlite_master"), Some("SQLITE_MASTER"));
        assert_eq!(denylisted_keyword("SELECT ${begin_seq}"), None);
        assert_eq!(denylisted_keyword("SELECT committed FROM t"), None);
    }

    #[test]
    fn rejects_denylisted_script() {
        let doc = design(json!({"v": view(&["ATTACH DATABASE 'x' AS y"], &[], &[])}));
        let err = validate_design_document(&doc).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidSqlStatement { script: Some(ref s), .. } if s.starts_with("ATTACH")
        ));
    }

    #[test]
    fn rejects_failing_script() {
        let doc = design(json!({"v": view(&[], &["INSERT INTO nowhere VALUES (1)"], &[])}));
        let err = validate_design_document(&doc).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidSqlStatement);
    }

    #[test]
    fn rejects_bad_select_syntax() {
        let doc = design(json!({"v": view(&[], &[], &[("default", "SELEC 1")])}));
        assert!(validate_design_document(&doc).is_err());
    }

    #[test]
    fn rejects_stand_in_mutation() {
        let doc = design(json!({"v": view(&[], &["DELETE FROM docsdb.changes"], &[])}));
        assert!(validate_design_document(&doc).is_err());

        let doc = design(json!({"v": view(&["DROP TABLE view_meta"], &[], &[])}));
        assert!(validate_design_document(&doc).is_err());

        let doc = design(json!({"v": view(&["ALTER TABLE docsdb.documents RENAME COLUMN data TO body"], &[], &[])}));
        assert!(validate_design_document(&doc).is_err());
    }

    #[test]
    fn accepts_well_formed_view() {
        let doc = design(json!({"v": view(
            &["CREATE TABLE IF NOT EXISTS kinds (kind TEXT PRIMARY KEY, n INTEGER)"],
            &["INSERT OR REPLACE INTO kinds SELECT IFNULL(kind, ''), COUNT(1) FROM docsdb.documents d JOIN docsdb.changes c USING (doc_id) WHERE c.seq_id > ${begin_seq} AND c.seq_id <= ${end_seq} GROUP BY kind"],
            &[("default", "SELECT JSON_GROUP_OBJECT(kind, n) FROM kinds WHERE (${kind} IS NULL OR kind = ${kind})")],
        )}));
        let ddoc = validate_design_document(&doc).unwrap();
        assert_eq!(ddoc.views.len(), 1);
    }

    #[test]
    fn rejects_malformed_views() {
        let doc = Document::from_value(json!({"_id": "_design/t", "views": 3})).unwrap();
        assert_eq!(
            validate_design_document(&doc).unwrap_err().kind(),
            crate::ErrorKind::InvalidSqlStatement
        );
    }
}
