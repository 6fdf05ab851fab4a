//! View lifecycle for one database.
//!
//! The manager keeps the current design documents and the views opened from
//! them. View files are named by the signature of their setup and delta
//! scripts, so a definition change lands in a fresh file and an unchanged one
//! keeps its built state across design document updates and restarts.

use crate::config::Config;
use crate::dir;
use crate::document::{DesignDocument, Document, ViewDefinition};
use crate::error::{CoreError, CoreResult};
use crate::registry::{Registry, ViewEntry};
use crate::types::{SelectParams, UpdateSeq};
use crate::view::materialized::View;
use crate::view::validate;
use parking_lot::RwLock;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt::{self, Write as _};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Extension of view files.
const VIEW_EXT: &str = "db";

#[derive(Default)]
struct ViewState {
    ddocs: HashMap<String, DesignDocument>,
    views: HashMap<String, Arc<View>>,
}

/// Owns the views of one database.
pub struct ViewManager {
    db_name: String,
    file_prefix: String,
    store_path: PathBuf,
    view_dir: PathBuf,
    registry: Arc<Registry>,
    config: Config,
    state: RwLock<ViewState>,
}

impl ViewManager {
    /// Creates a manager for database `db_name`.
    ///
    /// `file_stem` is the database's file identity; view files are named
    /// `<file_stem>$<signature>.db` inside `view_dir`.
    pub fn new(
        db_name: &str,
        file_stem: &str,
        store_path: &Path,
        view_dir: &Path,
        registry: Arc<Registry>,
        config: &Config,
    ) -> Self {
        Self {
            db_name: db_name.to_string(),
            file_prefix: format!("{file_stem}$"),
            store_path: store_path.to_path_buf(),
            view_dir: view_dir.to_path_buf(),
            registry,
            config: config.clone(),
            state: RwLock::new(ViewState::default()),
        }
    }

    /// Loads design documents and drops stale registry rows and view files.
    pub fn initialize(&self, design_documents: &[Document]) -> CoreResult<()> {
        let mut state = self.state.write();
        state.ddocs.clear();
        for doc in design_documents {
            match DesignDocument::from_document(doc) {
                Ok(ddoc) => {
                    state.ddocs.insert(doc.id.clone(), ddoc);
                }
                Err(e) => tracing::warn!(db = %self.db_name, ddoc = %doc.id, error = %e, "skipping unreadable design document"),
            }
        }

        for entry in self.registry.views(&self.db_name)? {
            let current = split_view_name(&entry.name)
                .and_then(|(ddoc_id, view)| state.ddocs.get(ddoc_id)?.view(view))
                .map(calculate_signature);
            if current.as_deref() != Some(entry.signature.as_str()) {
                self.registry.remove_view(&self.db_name, &entry.name)?;
                tracing::debug!(db = %self.db_name, view = %entry.name, "dropped stale view registration");
            }
        }

        let referenced: HashSet<String> = self
            .registry
            .views(&self.db_name)?
            .into_iter()
            .map(|e| e.filename)
            .collect();
        for filename in self.view_files()? {
            if !referenced.contains(&filename) {
                self.remove_view_file(&filename);
            }
        }
        Ok(())
    }

    /// Validates a design document before it is written.
    pub fn validate_design_document(&self, doc: &Document) -> CoreResult<DesignDocument> {
        validate::validate_design_document(doc).inspect_err(|e| {
            tracing::info!(db = %self.db_name, ddoc = %doc.id, error = %e, "rejected design document");
        })
    }

    /// Returns the view, opening it (and reconciling its file) if needed.
    pub fn open_view(&self, ddoc_id: &str, view_name: &str) -> CoreResult<Arc<View>> {
        let qualified = qualified_name(ddoc_id, view_name);
        if let Some(view) = self.state.read().views.get(&qualified) {
            return Ok(Arc::clone(view));
        }

        let mut state = self.state.write();
        if let Some(view) = state.views.get(&qualified) {
            return Ok(Arc::clone(view));
        }

        let definition = state
            .ddocs
            .get(ddoc_id)
            .ok_or_else(|| CoreError::view_not_found(ddoc_id))?
            .view(view_name)
            .ok_or_else(|| CoreError::view_not_found(&qualified))?;

        let signature = calculate_signature(definition);
        let entry = ViewEntry {
            name: qualified.clone(),
            filename: format!("{}{signature}.{VIEW_EXT}", self.file_prefix),
            signature,
        };

        let previous = self.registry.put_view(&self.db_name, &entry)?;
        if let Some(previous) = previous.filter(|p| p.filename != entry.filename) {
            self.collect_file(&previous.filename)?;
        }

        let view = Arc::new(View::open(
            &qualified,
            &self.view_dir.join(&entry.filename),
            &self.store_path,
            definition,
            &self.config,
        )?);
        state.views.insert(qualified, Arc::clone(&view));
        Ok(view)
    }

    /// Brings the view up to `target` (unless `stale`) and runs a select.
    pub fn select_view(
        &self,
        ddoc_id: &str,
        view_name: &str,
        select_name: &str,
        params: &SelectParams,
        stale: bool,
        target: &UpdateSeq,
    ) -> CoreResult<(Value, bool)> {
        let view = self.open_view(ddoc_id, view_name)?;
        let built = if stale { false } else { view.build(target)? };
        Ok((view.select(select_name, params)?, built))
    }

    /// Reconciles views after `doc` (a design document) was written.
    ///
    /// Live instances of the document's views are closed so the next read
    /// picks up new select scripts. Views removed from the document, or whose
    /// signature changed, lose their registry row and file.
    pub fn update_design_document(&self, doc: &Document) -> CoreResult<()> {
        let new_ddoc = if doc.deleted {
            None
        } else {
            Some(DesignDocument::from_document(doc)?)
        };

        let mut state = self.state.write();
        let prefix = format!("{}$", doc.id);
        state.views.retain(|name, _| !name.starts_with(&prefix));

        if let Some(old) = state.ddocs.get(&doc.id) {
            for (name, definition) in &old.views {
                let unchanged = new_ddoc
                    .as_ref()
                    .and_then(|n| n.view(name))
                    .is_some_and(|d| calculate_signature(d) == calculate_signature(definition));
                if !unchanged {
                    self.unregister_view(&qualified_name(&doc.id, name))?;
                }
            }
        }

        match new_ddoc {
            Some(ddoc) => {
                state.ddocs.insert(doc.id.clone(), ddoc);
            }
            None => {
                state.ddocs.remove(&doc.id);
            }
        }

        tracing::debug!(db = %self.db_name, ddoc = %doc.id, deleted = doc.deleted, "design document applied");
        Ok(())
    }

    /// Vacuums every open view.
    pub fn vacuum(&self) -> CoreResult<()> {
        let views: Vec<Arc<View>> = self.state.read().views.values().cloned().collect();
        for view in views {
            view.vacuum()?;
        }
        Ok(())
    }

    /// Closes all views and removes every view file of this database.
    pub fn destroy(&self) -> CoreResult<()> {
        let mut state = self.state.write();
        state.views.clear();
        state.ddocs.clear();
        for entry in self.registry.views(&self.db_name)? {
            self.registry.remove_view(&self.db_name, &entry.name)?;
        }
        for filename in self.view_files()? {
            self.remove_view_file(&filename);
        }
        Ok(())
    }

    /// Names of the currently open views.
    #[must_use]
    pub fn open_views(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.read().views.keys().cloned().collect();
        names.sort();
        names
    }

    fn unregister_view(&self, qualified: &str) -> CoreResult<()> {
        if let Some(entry) = self.registry.remove_view(&self.db_name, qualified)? {
            self.collect_file(&entry.filename)?;
        }
        Ok(())
    }

    /// Removes `filename` once no registry row references it.
    fn collect_file(&self, filename: &str) -> CoreResult<()> {
        if self.registry.file_references(&self.db_name, filename)? == 0 {
            self.remove_view_file(filename);
        }
        Ok(())
    }

    fn remove_view_file(&self, filename: &str) {
        match dir::remove_database_file(&self.view_dir.join(filename)) {
            Ok(_) => tracing::debug!(db = %self.db_name, file = %filename, "view file collected"),
            Err(e) => tracing::warn!(db = %self.db_name, file = %filename, error = %e, "failed to remove view file"),
        }
    }

    /// View files of this database present on disk.
    fn view_files(&self) -> CoreResult<Vec<String>> {
        let mut files = Vec::new();
        if !self.view_dir.exists() {
            return Ok(files);
        }
        let suffix = format!(".{VIEW_EXT}");
        for entry in fs::read_dir(&self.view_dir)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if name.starts_with(&self.file_prefix) && name.ends_with(&suffix) {
                files.push(name);
            }
        }
        Ok(files)
    }
}

impl fmt::Debug for ViewManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewManager")
            .field("db_name", &self.db_name)
            .field("view_dir", &self.view_dir)
            .finish_non_exhaustive()
    }
}

/// Fingerprint of a view's setup and delta scripts.
///
/// Select scripts are left out: changing them never requires a rebuild.
#[must_use]
pub fn calculate_signature(definition: &ViewDefinition) -> String {
    let mut hasher = Sha256::new();
    for script in &definition.setup {
        hasher.update(script.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update([1u8]);
    for script in &definition.delta {
        hasher.update(script.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for byte in &digest[..16] {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// `<design doc id>$<view name>`.
#[must_use]
pub fn qualified_name(ddoc_id: &str, view_name: &str) -> String {
    format!("{ddoc_id}${view_name}")
}

fn split_view_name(qualified: &str) -> Option<(&str, &str)> {
    qualified.rsplit_once('$')
}
