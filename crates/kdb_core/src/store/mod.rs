//! Document store.
//!
//! One SQLite file per logical database holding:
//!
//! ```text
//! documents   latest revision per id (body NULL once deleted)
//! changes     one row per successful write, keyed by sequence token
//! ```
//!
//! Reads go through a pool of read-only connections; writes go through a
//! single writer slot that also owns the sequence generator.

mod reader;
pub(crate) mod schema;
mod writer;

use crate::config::Config;
use crate::document::Document;
use crate::error::CoreResult;
use crate::pool::Pool;
use crate::types::{ChangeEntry, DocumentCount, UpdateSeq};
use reader::StoreReader;
use rusqlite::Connection;
use std::fmt;
use std::path::{Path, PathBuf};
use writer::Writer;

/// Versioned document storage for one logical database.
pub struct DocumentStore {
    path: PathBuf,
    writer: Pool<Writer>,
    readers: Pool<Connection>,
}

impl DocumentStore {
    /// Opens (or creates) the store at `path`.
    pub fn open(path: &Path, config: &Config) -> CoreResult<Self> {
        let name = path.display().to_string();
        let writer = Pool::open(format!("{name}:writer"), 1, config.acquire_timeout, |_| {
            Writer::open(path)
        })?;
        let readers = Pool::open(
            format!("{name}:readers"),
            config.reader_pool_size,
            config.acquire_timeout,
            |_| schema::open_reader(path),
        )?;

        tracing::debug!(path = %path.display(), readers = readers.size(), "document store opened");

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            readers,
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes a new revision of `doc`.
    ///
    /// A new id must present version 0. An existing id must present its
    /// current revision (or just its version, via `_version`). A deleted id
    /// accepts any version that is not behind the deleted one.
    pub fn put_document(&self, doc: Document) -> CoreResult<Document> {
        let mut writer = self.writer.acquire()?;
        writer.put(doc)
    }

    /// Latest revision with body.
    pub fn get_document(&self, id: &str) -> CoreResult<Document> {
        self.read(|r| r.document(id))
    }

    /// Revision `version` with body, if it is the latest one.
    pub fn get_document_version(&self, id: &str, version: u64) -> CoreResult<Document> {
        self.read(|r| r.document_version(id, version))
    }

    /// Latest revision metadata without body.
    pub fn get_document_metadata(&self, id: &str) -> CoreResult<Document> {
        self.read(|r| r.metadata(id))
    }

    /// Revision `version` metadata without body, if it is the latest one.
    pub fn get_document_metadata_version(&self, id: &str, version: u64) -> CoreResult<Document> {
        self.read(|r| r.metadata_version(id, version))
    }

    /// All live design documents, ordered by id.
    pub fn get_all_design_documents(&self) -> CoreResult<Vec<Document>> {
        self.read(|r| r.design_documents())
    }

    /// Up to `limit` changes strictly after `since`.
    pub fn get_changes(
        &self,
        since: Option<&str>,
        limit: usize,
        descending: bool,
    ) -> CoreResult<Vec<ChangeEntry>> {
        self.read(|r| r.changes(since, limit, descending))
    }

    /// Latest issued sequence, or the empty sequence.
    pub fn get_last_update_sequence(&self) -> CoreResult<UpdateSeq> {
        self.read(|r| r.last_update_seq())
    }

    /// Live and deleted document counts.
    pub fn get_document_count(&self) -> CoreResult<DocumentCount> {
        self.read(|r| r.document_count())
    }

    /// Rebuilds the backing file.
    pub fn vacuum(&self) -> CoreResult<()> {
        let writer = self.writer.acquire()?;
        writer.vacuum()
    }

    fn read<R>(&self, f: impl FnOnce(&StoreReader<'_>) -> CoreResult<R>) -> CoreResult<R> {
        let mut conn = self.readers.acquire()?;
        let tx = conn.transaction()?;
        let out = f(&StoreReader::new(&tx))?;
        tx.commit()?;
        Ok(out)
    }
}

impl fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use serde_json::json;
    use tempfile::tempdir;

    fn open(dir: &Path) -> DocumentStore {
        DocumentStore::open(&dir.join("store.db"), &Config::new(dir)).unwrap()
    }

    fn doc(value: serde_json::Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn empty_store() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());

        assert!(store.get_last_update_sequence().unwrap().is_empty());
        assert_eq!(store.get_document_count().unwrap(), DocumentCount::default());
        assert!(store.get_changes(None, 10, false).unwrap().is_empty());
        assert_eq!(
            store.get_document("a").unwrap_err().kind(),
            ErrorKind::DocumentNotFound
        );
    }

    #[test]
    fn reads_return_latest_revision() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());

        let v1 = store
            .put_document(doc(json!({"_id": "a", "_kind": "k", "x": 1})))
            .unwrap();
        let v2 = store
            .put_document(doc(json!({"_id": "a", "_rev": v1.rev(), "x": 2})))
            .unwrap();

        let got = store.get_document("a").unwrap();
        assert_eq!(got.version, 2);
        assert_eq!(got.hash, v2.hash);
        assert_eq!(got.data["x"], json!(2));
        assert_eq!(got.kind, None);

        let meta = store.get_document_metadata("a").unwrap();
        assert_eq!(meta.version, 2);
        assert!(meta.data.is_empty());

        assert!(store.get_document_version("a", 2).is_ok());
        assert!(store.get_document_metadata_version("a", 2).is_ok());
        assert_eq!(
            store.get_document_version("a", 1).unwrap_err().kind(),
            ErrorKind::DocumentNotFound
        );
    }

    #[test]
    fn deleted_reads_carry_metadata() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());

        let v1 = store.put_document(doc(json!({"_id": "a", "x": 1}))).unwrap();
        store
            .put_document(doc(json!({"_id": "a", "_rev": v1.rev(), "_deleted": true})))
            .unwrap();

        let err = store.get_document("a").unwrap_err();
        let tombstone = err.deleted_document().unwrap();
        assert_eq!(tombstone.version, 2);
        assert!(tombstone.deleted);
        assert!(tombstone.data.is_empty());

        assert!(store
            .get_document_metadata("a")
            .unwrap_err()
            .deleted_document()
            .is_some());

        let count = store.get_document_count().unwrap();
        assert_eq!(count.live, 0);
        assert_eq!(count.deleted, 1);
    }

    #[test]
    fn changes_are_ordered_and_paged() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());

        for id in ["a", "b", "c", "d"] {
            store.put_document(doc(json!({"_id": id}))).unwrap();
        }

        let all = store.get_changes(None, 10, false).unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].seq < w[1].seq));
        assert_eq!(
            all.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            ["a", "b", "c", "d"]
        );

        let after = store.get_changes(Some(&all[1].seq), 10, false).unwrap();
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].id, "c");

        let newest = store.get_changes(None, 2, true).unwrap();
        assert_eq!(newest[0].id, "d");
        assert_eq!(newest[1].id, "c");

        assert_eq!(
            store.get_last_update_sequence().unwrap().id,
            all[3].seq
        );
    }

    #[test]
    fn design_documents_listed() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());

        store
            .put_document(doc(json!({"_id": "_design/b", "views": {}})))
            .unwrap();
        store
            .put_document(doc(json!({"_id": "_design/a", "views": {}})))
            .unwrap();
        store.put_document(doc(json!({"_id": "plain"}))).unwrap();

        let ddocs = store.get_all_design_documents().unwrap();
        assert_eq!(
            ddocs.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
            ["_design/a", "_design/b"]
        );
    }

    #[test]
    fn vacuum_keeps_data() {
        let temp = tempdir().unwrap();
        let store = open(temp.path());
        store.put_document(doc(json!({"_id": "a", "x": 1}))).unwrap();
        store.vacuum().unwrap();
        assert_eq!(store.get_document("a").unwrap().data["x"], json!(1));
    }
}
