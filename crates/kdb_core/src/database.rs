//! Database facade.

use crate::config::Config;
use crate::dir::DataDir;
use crate::document::{self, parse_rev, Document, DESIGN_KIND, DESIGN_PREFIX};
use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::registry::Registry;
use crate::stats::{DatabaseStats, StatsSnapshot};
use crate::store::DocumentStore;
use crate::types::{ChangeEntry, DatabaseStat, DocumentCount, SelectParams, UpdateSeq};
use crate::validator::SchemaValidator;
use crate::view::{builtin, ViewManager};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use uuid::Uuid;

/// One logical database: a document store plus the views derived from its
/// design documents.
///
/// Obtained from [`Engine`](crate::Engine); all methods take `&self` and are
/// safe to call from many threads. Writes are serialized by the store's
/// single writer slot, reads run on a small reader pool.
///
/// ```rust,ignore
/// use kdb_core::{Config, Document, Engine};
///
/// let engine = Engine::open(Config::new("data"))?;
/// let db = engine.create_database("notes")?;
///
/// let doc = Document::parse(br#"{"_id": "n1", "title": "hello"}"#)?;
/// let stored = db.put_document(doc)?;
/// assert_eq!(stored.version, 1);
///
/// let all = db.select_view("_views", "_all_docs", "default", &Default::default(), false)?;
/// ```
pub struct Database {
    name: String,
    file_stem: String,
    config: Config,
    store: DocumentStore,
    views: ViewManager,
    /// Serializes design document writes with the view reconciliation that
    /// follows them.
    design_lock: Mutex<()>,
    validator: Arc<dyn SchemaValidator>,
    stats: DatabaseStats,
}

impl Database {
    /// Opens the database stored under `file_stem`.
    ///
    /// With `create`, the store starts empty and the built-in design document
    /// is written; otherwise the views are reconciled with the stored design
    /// documents.
    pub(crate) fn open(
        name: &str,
        file_stem: &str,
        dir: &DataDir,
        registry: Arc<Registry>,
        config: &Config,
        create: bool,
    ) -> CoreResult<Self> {
        let store_path = dir.store_path(file_stem);
        let store = DocumentStore::open(&store_path, config)?;
        let views = ViewManager::new(
            name,
            file_stem,
            &store_path,
            &dir.views_dir(),
            registry,
            config,
        );

        let db = Self {
            name: name.to_string(),
            file_stem: file_stem.to_string(),
            config: config.clone(),
            store,
            views,
            design_lock: Mutex::new(()),
            validator: (config.validator_factory)(name),
            stats: DatabaseStats::new(),
        };

        let design_documents = db.store.get_all_design_documents()?;
        db.views.initialize(&design_documents)?;
        db.validator.refresh(&design_documents)?;

        if create {
            db.put_document(builtin::default_design_document())?;
        }

        tracing::info!(db = %name, file = %file_stem, created = create, "database opened");
        Ok(db)
    }

    /// Name of the database.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn file_stem(&self) -> &str {
        &self.file_stem
    }

    /// Writes a new revision of `doc`.
    ///
    /// A document without `_id` gets a fresh id. Design documents are checked
    /// before they are stored and their views are reconciled afterwards;
    /// documents with a `_kind` go through the schema validator.
    ///
    /// # Errors
    ///
    /// `DocumentConflict` when the presented revision is not the current one,
    /// `DocumentNotFound` when a revision is presented for an unknown id,
    /// `InvalidSqlStatement` for a rejected design document, `InvalidInput`
    /// for a rejected body.
    pub fn put_document(&self, doc: Document) -> CoreResult<Document> {
        let result = isolate("put_document", || self.write(doc));
        match &result {
            Ok(stored) => self.stats.record_write(stored.deleted),
            Err(e) if e.kind() == ErrorKind::DocumentConflict => self.stats.record_conflict(),
            Err(_) => self.stats.record_error(),
        }
        result
    }

    /// Deletes `id`, which must currently be at revision `rev`.
    pub fn delete_document(&self, id: &str, rev: &str) -> CoreResult<Document> {
        let (version, hash) = parse_rev(rev)?;
        self.put_document(Document {
            id: id.to_string(),
            version,
            hash,
            deleted: true,
            ..Document::default()
        })
    }

    /// Latest revision of `id` with its body.
    pub fn get_document(&self, id: &str) -> CoreResult<Document> {
        self.read("get_document", || self.store.get_document(id))
    }

    /// Revision `version` of `id` with its body.
    pub fn get_document_version(&self, id: &str, version: u64) -> CoreResult<Document> {
        self.read("get_document_version", || {
            self.store.get_document_version(id, version)
        })
    }

    /// Latest revision of `id`, without body.
    pub fn get_document_metadata(&self, id: &str) -> CoreResult<Document> {
        self.read("get_document_metadata", || {
            self.store.get_document_metadata(id)
        })
    }

    /// Revision `version` of `id`, without body.
    pub fn get_document_metadata_version(&self, id: &str, version: u64) -> CoreResult<Document> {
        self.read("get_document_metadata_version", || {
            self.store.get_document_metadata_version(id, version)
        })
    }

    /// Writes each document independently.
    ///
    /// One result per input, in order; a failing item never affects the
    /// others.
    pub fn bulk_put_documents(&self, docs: Vec<Document>) -> Vec<CoreResult<Document>> {
        docs.into_iter().map(|doc| self.put_document(doc)).collect()
    }

    /// Reads each `(id, version)` independently; `None` means latest.
    pub fn bulk_get_documents(&self, refs: &[(String, Option<u64>)]) -> Vec<CoreResult<Document>> {
        refs.iter()
            .map(|(id, version)| match version {
                Some(v) => self.get_document_version(id, *v),
                None => self.get_document(id),
            })
            .collect()
    }

    /// Up to `limit` changes strictly after `since` (empty: from the start).
    ///
    /// A `limit` of 0 uses the configured default. With `descending`, the
    /// newest changes come first.
    pub fn get_changes(
        &self,
        since: &str,
        limit: usize,
        descending: bool,
    ) -> CoreResult<Vec<ChangeEntry>> {
        let limit = if limit == 0 {
            self.config.default_changes_limit
        } else {
            limit
        };
        let since = (!since.is_empty()).then_some(since);
        self.read("get_changes", || {
            self.store.get_changes(since, limit, descending)
        })
    }

    /// Latest issued update sequence.
    pub fn get_last_update_sequence(&self) -> CoreResult<UpdateSeq> {
        isolate("get_last_update_sequence", || {
            self.store.get_last_update_sequence()
        })
    }

    /// Live and deleted document counts.
    pub fn get_document_count(&self) -> CoreResult<DocumentCount> {
        isolate("get_document_count", || self.store.get_document_count())
    }

    /// Every live design document, ordered by id.
    pub fn get_all_design_documents(&self) -> CoreResult<Vec<Document>> {
        self.read("get_all_design_documents", || {
            self.store.get_all_design_documents()
        })
    }

    /// Runs select `select` of view `view` in design document `ddoc`.
    ///
    /// `ddoc` may be given with or without the `_design/` prefix. Unless
    /// `stale`, the view first catches up with every write issued so far.
    pub fn select_view(
        &self,
        ddoc: &str,
        view: &str,
        select: &str,
        params: &SelectParams,
        stale: bool,
    ) -> CoreResult<Value> {
        let ddoc_id = if document::is_design_id(ddoc) {
            ddoc.to_string()
        } else {
            format!("{DESIGN_PREFIX}{ddoc}")
        };
        let result = isolate("select_view", || {
            let target = self.store.get_last_update_sequence()?;
            self.views
                .select_view(&ddoc_id, view, select, params, stale, &target)
        });
        match result {
            Ok((value, built)) => {
                self.stats.record_select(built);
                Ok(value)
            }
            Err(e) => {
                self.stats.record_error();
                Err(e)
            }
        }
    }

    /// Summary of the database.
    pub fn stat(&self) -> CoreResult<DatabaseStat> {
        isolate("stat", || {
            let count = self.store.get_document_count()?;
            Ok(DatabaseStat {
                db_name: self.name.clone(),
                update_seq: self.store.get_last_update_sequence()?,
                doc_count: count.live,
                deleted_doc_count: count.deleted,
            })
        })
    }

    /// Vacuums the document store and every open view.
    pub fn vacuum(&self) -> CoreResult<()> {
        isolate("vacuum", || {
            self.store.vacuum()?;
            self.views.vacuum()?;
            tracing::info!(db = %self.name, "database vacuumed");
            Ok(())
        })
    }

    /// Operation counters since the database was opened.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Closes every view and removes the view files.
    pub(crate) fn destroy_views(&self) -> CoreResult<()> {
        let _design = self.design_lock.lock();
        self.views.destroy()
    }

    fn write(&self, mut doc: Document) -> CoreResult<Document> {
        if doc.id.is_empty() {
            if doc.version != 0 {
                return Err(CoreError::invalid_input("missing _id for a revised document"));
            }
            doc.id = Uuid::new_v4().simple().to_string();
        }
        document::validate_id(&doc.id)?;

        if !doc.is_design() {
            if doc.kind.is_some() && !doc.deleted {
                let violations = self.validator.validate(&doc);
                if !violations.is_empty() {
                    return Err(CoreError::invalid_input(violations.join("; ")));
                }
            }
            return self.store.put_document(doc);
        }

        doc.kind = Some(DESIGN_KIND.to_string());
        let _design = self.design_lock.lock();
        if !doc.deleted {
            self.views.validate_design_document(&doc)?;
        }
        let stored = self.store.put_document(doc)?;
        self.views.update_design_document(&stored)?;
        self.validator
            .refresh(&self.store.get_all_design_documents()?)?;
        Ok(stored)
    }

    fn read<T>(&self, op: &str, f: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
        let result = isolate(op, f);
        match &result {
            Ok(_) => self.stats.record_read(),
            Err(e) if e.kind() == ErrorKind::DocumentNotFound => self.stats.record_read(),
            Err(_) => self.stats.record_error(),
        }
        result
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("file_stem", &self.file_stem)
            .field("open_views", &self.views.open_views())
            .finish_non_exhaustive()
    }
}

/// Runs `f`, turning a panic into `InternalError`.
pub(crate) fn isolate<T>(op: &str, f: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!(op, panic = %message, "operation panicked");
        Err(CoreError::internal(format!("{op} panicked: {message}")))
    })
}
