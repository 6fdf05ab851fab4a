//! Read-side queries over a document store connection.

use crate::document::Document;
use crate::error::{CoreError, CoreResult};
use crate::types::{ChangeEntry, DocumentCount, UpdateSeq};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};

const METADATA_COLUMNS: &str = "doc_id, version, hash, kind, deleted";
const DOCUMENT_COLUMNS: &str = "doc_id, version, hash, kind, deleted, data";

/// Queries over one connection (usually inside a transaction).
pub(crate) struct StoreReader<'a> {
    conn: &'a Connection,
}

impl<'a> StoreReader<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Latest revision metadata, deleted or not.
    pub(crate) fn current_revision(&self, id: &str) -> CoreResult<Option<Document>> {
        let sql = format!("SELECT {METADATA_COLUMNS} FROM documents WHERE doc_id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], metadata_from_row)
            .optional()?)
    }

    pub(crate) fn metadata(&self, id: &str) -> CoreResult<Document> {
        let sql = format!("SELECT {METADATA_COLUMNS} FROM documents WHERE doc_id = ?1");
        let doc = self
            .conn
            .query_row(&sql, params![id], metadata_from_row)
            .optional()?;
        live(id, doc)
    }

    pub(crate) fn metadata_version(&self, id: &str, version: u64) -> CoreResult<Document> {
        let sql = format!(
            "SELECT {METADATA_COLUMNS} FROM documents WHERE doc_id = ?1 AND version = ?2"
        );
        let doc = self
            .conn
            .query_row(&sql, params![id, version], metadata_from_row)
            .optional()?;
        live(id, doc)
    }

    pub(crate) fn document(&self, id: &str) -> CoreResult<Document> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE doc_id = ?1");
        let row = self
            .conn
            .query_row(&sql, params![id], document_from_row)
            .optional()?;
        live(id, row.map(decode_body).transpose()?)
    }

    pub(crate) fn document_version(&self, id: &str, version: u64) -> CoreResult<Document> {
        let sql =
            format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE doc_id = ?1 AND version = ?2");
        let row = self
            .conn
            .query_row(&sql, params![id, version], document_from_row)
            .optional()?;
        live(id, row.map(decode_body).transpose()?)
    }

    pub(crate) fn design_documents(&self) -> CoreResult<Vec<Document>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents \
             WHERE doc_id GLOB '_design/*' AND deleted = 0 ORDER BY doc_id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], document_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(decode_body).collect()
    }

    pub(crate) fn changes(
        &self,
        since: Option<&str>,
        limit: usize,
        descending: bool,
    ) -> CoreResult<Vec<ChangeEntry>> {
        let order = if descending { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT seq_id, doc_id, version, deleted FROM changes \
             WHERE (?1 IS NULL OR seq_id > ?1) ORDER BY seq_id {order} LIMIT ?2"
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![since.filter(|s| !s.is_empty()), limit], |row| {
                Ok(ChangeEntry {
                    seq: row.get(0)?,
                    id: row.get(1)?,
                    version: row.get(2)?,
                    deleted: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Whether a change for revision `version` of `id` is recorded.
    pub(crate) fn has_change(&self, id: &str, version: u64) -> CoreResult<bool> {
        let found = self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM changes WHERE doc_id = ?1 AND version = ?2)",
            params![id, version],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    pub(crate) fn last_update_seq(&self) -> CoreResult<UpdateSeq> {
        let seq = self
            .conn
            .query_row(
                "SELECT seq_number, seq_id FROM changes ORDER BY seq_id DESC LIMIT 1",
                [],
                |row| Ok(UpdateSeq::new(row.get(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(seq.unwrap_or_default())
    }

    pub(crate) fn document_count(&self) -> CoreResult<DocumentCount> {
        let mut stmt = self
            .conn
            .prepare("SELECT deleted, COUNT(1) FROM documents GROUP BY deleted")?;
        let mut count = DocumentCount::default();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, bool>(0)?, row.get::<_, u64>(1)?)))?;
        for row in rows {
            let (deleted, n) = row?;
            if deleted {
                count.deleted = n;
            } else {
                count.live = n;
            }
        }
        Ok(count)
    }
}

fn metadata_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        version: row.get(1)?,
        hash: row.get(2)?,
        kind: row.get(3)?,
        deleted: row.get(4)?,
        data: Map::new(),
    })
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<(Document, Option<String>)> {
    Ok((metadata_from_row(row)?, row.get(5)?))
}

fn decode_body((mut doc, body): (Document, Option<String>)) -> CoreResult<Document> {
    if let Some(body) = body {
        match serde_json::from_str(&body) {
            Ok(Value::Object(data)) => doc.data = data,
            Ok(_) | Err(_) => {
                return Err(CoreError::internal(format!(
                    "stored body of {} is not a json object",
                    doc.id
                )))
            }
        }
    }
    Ok(doc)
}

/// Maps a missing or deleted row to `DocumentNotFound`.
fn live(id: &str, doc: Option<Document>) -> CoreResult<Document> {
    match doc {
        None => Err(CoreError::document_not_found(id)),
        Some(doc) if doc.deleted => Err(CoreError::document_deleted(doc)),
        Some(doc) => Ok(doc),
    }
}
