//! The single writer of a document store.

use crate::document::{content_hash, Document};
use crate::error::{CoreError, CoreResult};
use crate::sequence::SequenceGenerator;
use crate::store::reader::StoreReader;
use crate::store::schema;
use rusqlite::{params, Connection, ErrorCode};
use serde_json::Map;
use std::path::Path;

/// Owns the read-write connection and the sequence generator.
///
/// Exactly one exists per store, checked out through a pool of size one, so
/// conflict checking and sequence issuance never interleave.
pub(crate) struct Writer {
    conn: Connection,
    sequence: SequenceGenerator,
}

impl Writer {
    /// Opens the store file, creating the schema, and resumes the sequence.
    pub(crate) fn open(path: &Path) -> CoreResult<Self> {
        let conn = schema::open_writer(path)?;
        schema::initialize(&conn)?;
        let last = StoreReader::new(&conn).last_update_seq()?;
        let sequence = SequenceGenerator::resume(&last)?;
        Ok(Self { conn, sequence })
    }

    /// Writes a new revision of `doc` after checking it against the stored one.
    ///
    /// The change record and the document row are written in one transaction.
    pub(crate) fn put(&mut self, mut doc: Document) -> CoreResult<Document> {
        let tx = self.conn.transaction()?;

        let reader = StoreReader::new(&tx);
        let current = reader.current_revision(&doc.id)?;
        let next_version = check_revision(&doc, current.as_ref())?;
        // The (doc_id, version) index is the last word on concurrent revisions.
        if reader.has_change(&doc.id, next_version)? {
            return Err(CoreError::document_conflict(&doc.id));
        }

        doc.version = next_version;
        doc.hash = content_hash(&doc.data);
        let seq = self.sequence.next()?;

        let inserted = tx.execute(
            "INSERT INTO changes (seq_id, seq_number, doc_id, version, hash, deleted) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![seq.id, seq.number, doc.id, doc.version, doc.hash, doc.deleted],
        );
        if let Err(e) = inserted {
            return Err(match e.sqlite_error_code() {
                Some(ErrorCode::ConstraintViolation) => {
                    CoreError::internal(format!("update sequence collision at {}", seq.id))
                }
                _ => e.into(),
            });
        }

        if doc.deleted {
            doc.data = Map::new();
        }
        let body = if doc.deleted {
            None
        } else {
            Some(doc.body_json()?)
        };

        tx.execute(
            "INSERT INTO documents (doc_id, version, hash, kind, deleted, data, seq_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT (doc_id) DO UPDATE SET \
                version = excluded.version, hash = excluded.hash, kind = excluded.kind, \
                deleted = excluded.deleted, data = excluded.data, seq_id = excluded.seq_id",
            params![doc.id, doc.version, doc.hash, doc.kind, doc.deleted, body, seq.id],
        )?;

        tx.commit()?;
        Ok(doc)
    }

    pub(crate) fn vacuum(&self) -> CoreResult<()> {
        self.conn.execute_batch("VACUUM")?;
        Ok(())
    }
}

/// Applies the optimistic concurrency rules and returns the next version.
fn check_revision(doc: &Document, current: Option<&Document>) -> CoreResult<u64> {
    let Some(current) = current else {
        if doc.version != 0 || doc.deleted {
            return Err(CoreError::document_not_found(&doc.id));
        }
        return Ok(1);
    };

    if current.deleted {
        // A deleted id may be written again, unless the caller is behind it.
        if doc.deleted {
            return Err(CoreError::document_deleted(current.clone()));
        }
        if doc.version != 0 && doc.version < current.version {
            return Err(CoreError::document_conflict(&doc.id));
        }
        return Ok(current.version + 1);
    }

    let hash_matches = doc.hash.is_empty() || doc.hash == current.hash;
    if doc.version != current.version || !hash_matches {
        return Err(CoreError::document_conflict(&doc.id));
    }
    Ok(current.version + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use serde_json::json;
    use tempfile::tempdir;

    fn doc(value: serde_json::Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn create_then_update() {
        let temp = tempdir().unwrap();
        let mut writer = Writer::open(&temp.path().join("s.db")).unwrap();

        let first = writer.put(doc(json!({"_id": "a", "x": 1}))).unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(first.hash.len(), 32);

        let second = writer
            .put(doc(json!({"_id": "a", "_rev": first.rev(), "x": 2})))
            .unwrap();
        assert_eq!(second.version, 2);
        assert_ne!(first.hash, second.hash);
    }

    #[test]
    fn stale_revision_conflicts() {
        let temp = tempdir().unwrap();
        let mut writer = Writer::open(&temp.path().join("s.db")).unwrap();

        let first = writer.put(doc(json!({"_id": "a", "x": 1}))).unwrap();
        writer
            .put(doc(json!({"_id": "a", "_rev": first.rev(), "x": 2})))
            .unwrap();

        let err = writer
            .put(doc(json!({"_id": "a", "_rev": first.rev(), "x": 3})))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DocumentConflict);

        let err = writer.put(doc(json!({"_id": "a", "x": 4}))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DocumentConflict);
    }

    #[test]
    fn version_only_compares_versions() {
        let temp = tempdir().unwrap();
        let mut writer = Writer::open(&temp.path().join("s.db")).unwrap();

        writer.put(doc(json!({"_id": "a"}))).unwrap();
        let second = writer
            .put(doc(json!({"_id": "a", "_version": 1, "y": true})))
            .unwrap();
        assert_eq!(second.version, 2);
    }

    #[test]
    fn unknown_id_with_revision_is_not_found() {
        let temp = tempdir().unwrap();
        let mut writer = Writer::open(&temp.path().join("s.db")).unwrap();

        let err = writer
            .put(doc(json!({"_id": "ghost", "_rev": "3-abc"})))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DocumentNotFound);
    }

    #[test]
    fn deleted_id_can_be_resurrected() {
        let temp = tempdir().unwrap();
        let mut writer = Writer::open(&temp.path().join("s.db")).unwrap();

        let first = writer.put(doc(json!({"_id": "a"}))).unwrap();
        let gone = writer
            .put(doc(json!({"_id": "a", "_rev": first.rev(), "_deleted": true})))
            .unwrap();
        assert!(gone.deleted);
        assert_eq!(gone.version, 2);

        let back = writer.put(doc(json!({"_id": "a", "z": 1}))).unwrap();
        assert_eq!(back.version, 3);
        assert!(!back.deleted);
    }

    #[test]
    fn resurrect_behind_deleted_version_conflicts() {
        let temp = tempdir().unwrap();
        let mut writer = Writer::open(&temp.path().join("s.db")).unwrap();

        let v1 = writer.put(doc(json!({"_id": "a"}))).unwrap();
        let v2 = writer
            .put(doc(json!({"_id": "a", "_rev": v1.rev()})))
            .unwrap();
        writer
            .put(doc(json!({"_id": "a", "_rev": v2.rev(), "_deleted": true})))
            .unwrap();

        let err = writer
            .put(doc(json!({"_id": "a", "_rev": v1.rev()})))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DocumentConflict);
    }

    #[test]
    fn conflict_leaves_no_change_record() {
        let temp = tempdir().unwrap();
        let mut writer = Writer::open(&temp.path().join("s.db")).unwrap();

        writer.put(doc(json!({"_id": "a"}))).unwrap();
        let _ = writer.put(doc(json!({"_id": "a", "_rev": "9-x"})));

        let changes = StoreReader::new(&writer.conn)
            .changes(None, 100, false)
            .unwrap();
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn recorded_revision_conflicts_before_issuing_a_sequence() {
        let temp = tempdir().unwrap();
        let mut writer = Writer::open(&temp.path().join("s.db")).unwrap();

        let first = writer.put(doc(json!({"_id": "a"}))).unwrap();
        writer
            .conn
            .execute(
                "INSERT INTO changes (seq_id, seq_number, doc_id, version, hash, deleted) \
                 VALUES ('~', 99, 'a', 2, 'h', 0)",
                [],
            )
            .unwrap();
        let before = StoreReader::new(&writer.conn).last_update_seq().unwrap();

        let err = writer
            .put(doc(json!({"_id": "a", "_rev": first.rev(), "x": 1})))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DocumentConflict);

        let after = StoreReader::new(&writer.conn).last_update_seq().unwrap();
        assert_eq!(after, before);
        assert_eq!(writer.put(doc(json!({"_id": "b"}))).unwrap().version, 1);
    }

    #[test]
    fn sequence_collision_is_internal() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("s.db");
        let mut writer = Writer::open(&path).unwrap();
        writer.put(doc(json!({"_id": "a"}))).unwrap();

        let mut next = SequenceGenerator::resume(
            &StoreReader::new(&writer.conn).last_update_seq().unwrap(),
        )
        .unwrap();
        let taken = next.next().unwrap();
        writer
            .conn
            .execute(
                "INSERT INTO changes (seq_id, seq_number, doc_id, version, hash, deleted) \
                 VALUES (?1, ?2, 'other', 1, 'h', 0)",
                params![taken.id, taken.number],
            )
            .unwrap();

        let err = writer.put(doc(json!({"_id": "b"}))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InternalError);
        assert!(err.to_string().contains("collision"));
    }

    #[test]
    fn sequence_resumes_after_reopen() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("s.db");

        let before = {
            let mut writer = Writer::open(&path).unwrap();
            writer.put(doc(json!({"_id": "a"}))).unwrap();
            StoreReader::new(&writer.conn).last_update_seq().unwrap()
        };

        let mut writer = Writer::open(&path).unwrap();
        writer.put(doc(json!({"_id": "b"}))).unwrap();
        let after = StoreReader::new(&writer.conn).last_update_seq().unwrap();
        assert!(after > before);
        assert_eq!(after.number, before.number + 1);
    }
}
