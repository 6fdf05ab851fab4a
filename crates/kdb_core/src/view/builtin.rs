//! The design document every new database starts with.

use crate::document::{Document, ViewDefinition, DESIGN_KIND};
use serde_json::{json, Map, Value};

/// Id of the built-in design document.
pub const DEFAULT_DESIGN_ID: &str = "_design/_views";

/// Name of the built-in view listing every document.
pub const ALL_DOCS: &str = "_all_docs";

const CHANGED_IDS: &str = "SELECT DISTINCT doc_id FROM docsdb.changes \
     WHERE seq_id > ${begin_seq} AND seq_id <= ${end_seq}";

/// The `_all_docs` view: one row per live document, keyed by id.
#[must_use]
pub fn all_docs() -> ViewDefinition {
    ViewDefinition {
        setup: vec![
            "CREATE TABLE IF NOT EXISTS all_docs (key TEXT PRIMARY KEY, value TEXT, doc_id TEXT)"
                .to_string(),
        ],
        delta: vec![
            format!("DELETE FROM all_docs WHERE doc_id IN ({CHANGED_IDS})"),
            format!(
                "INSERT INTO all_docs (key, value, doc_id) \
                 SELECT d.doc_id, JSON_OBJECT('version', d.version, 'rev', d.version || '-' || d.hash), d.doc_id \
                 FROM docsdb.documents d JOIN ({CHANGED_IDS}) c USING (doc_id) \
                 WHERE d.deleted = 0"
            ),
        ],
        select: [
            (
                "default".to_string(),
                "SELECT JSON_OBJECT('offset', MIN(offset), \
                 'rows', JSON_GROUP_ARRAY(JSON_OBJECT('key', key, 'value', JSON(value), 'id', doc_id)), \
                 'total_rows', (SELECT COUNT(1) FROM all_docs)) \
                 FROM (SELECT (ROW_NUMBER() OVER (ORDER BY key) - 1) AS offset, * FROM all_docs ORDER BY key) \
                 WHERE (${key} IS NULL OR key = ${key})"
                    .to_string(),
            ),
            (
                "with_docs".to_string(),
                "SELECT JSON_OBJECT('offset', MIN(offset), \
                 'rows', JSON_GROUP_ARRAY(JSON_OBJECT('id', doc_id, 'key', key, 'value', JSON(value), \
                 'doc', JSON((SELECT JSON_SET(d.data, '$._id', d.doc_id, '$._rev', d.version || '-' || d.hash) \
                 FROM docsdb.documents d WHERE d.doc_id = o.doc_id)))), \
                 'total_rows', (SELECT COUNT(1) FROM all_docs)) \
                 FROM (SELECT (ROW_NUMBER() OVER (ORDER BY key) - 1) AS offset, * FROM all_docs ORDER BY key) o \
                 WHERE (${key} IS NULL OR key = ${key})"
                    .to_string(),
            ),
        ]
        .into_iter()
        .collect(),
    }
}

/// The built-in design document, unversioned.
#[must_use]
pub fn default_design_document() -> Document {
    let mut views = Map::new();
    views.insert(
        ALL_DOCS.to_string(),
        serde_json::to_value(all_docs()).unwrap_or(Value::Null),
    );
    let mut data = Map::new();
    data.insert("views".to_string(), json!(views));

    let mut doc = Document::new(DEFAULT_DESIGN_ID, data);
    doc.kind = Some(DESIGN_KIND.to_string());
    doc
}
