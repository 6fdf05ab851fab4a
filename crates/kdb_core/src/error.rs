//! Error types for kdb core.

use crate::document::Document;
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Stable, machine-readable classification of a [`CoreError`].
///
/// Transport layers map these to their own status codes; the string form
/// returned by [`ErrorKind::as_str`] never changes between releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed database name or document id.
    InvalidName,
    /// Database already exists.
    AlreadyExists,
    /// Database does not exist.
    NotFound,
    /// Document does not exist, or its latest revision is deleted.
    DocumentNotFound,
    /// Presented revision does not match the stored one.
    DocumentConflict,
    /// Malformed JSON or otherwise unacceptable input.
    InvalidInput,
    /// Unparseable `_rev` value.
    InvalidRevision,
    /// View, select variant or design document absent.
    ViewNotFound,
    /// Select script returned the wrong shape.
    ViewResultError,
    /// Design document failed validation.
    InvalidSqlStatement,
    /// Anything else: backend failures, pool exhaustion, sequence collisions.
    InternalError,
}

impl ErrorKind {
    /// Returns the stable code for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidName => "invalid_name",
            Self::AlreadyExists => "db_exists",
            Self::NotFound => "db_not_found",
            Self::DocumentNotFound => "doc_not_found",
            Self::DocumentConflict => "doc_conflict",
            Self::InvalidInput => "invalid_input",
            Self::InvalidRevision => "invalid_rev",
            Self::ViewNotFound => "view_not_found",
            Self::ViewResultError => "view_result_error",
            Self::InvalidSqlStatement => "invalid_sql",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in kdb core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// SQLite backend error.
    #[error("storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid database name or document id.
    #[error("invalid name: {name:?}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// Database already exists.
    #[error("database already exists: {name}")]
    DatabaseExists {
        /// Name of the database.
        name: String,
    },

    /// Database not found.
    #[error("database not found: {name}")]
    DatabaseNotFound {
        /// Name of the database.
        name: String,
    },

    /// Document not found.
    ///
    /// When the latest revision of the document is deleted, `deleted` carries
    /// its metadata so callers can tell a deleted document from a missing one.
    #[error("document not found: {id}")]
    DocumentNotFound {
        /// The requested document id.
        id: String,
        /// Metadata of the deleted revision, if the id exists but is deleted.
        deleted: Option<Box<Document>>,
    },

    /// Document update conflict.
    #[error("document update conflict: {id}")]
    DocumentConflict {
        /// The conflicting document id.
        id: String,
    },

    /// Malformed input.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description of the problem.
        message: String,
    },

    /// Unparseable revision string.
    #[error("invalid revision: {rev:?}")]
    InvalidRevision {
        /// The rejected revision.
        rev: String,
    },

    /// View or design document not found.
    #[error("view not found: {name}")]
    ViewNotFound {
        /// Qualified name of the missing view (or select variant).
        name: String,
    },

    /// Select script returned a result with the wrong number of columns.
    #[error("select have {columns}, want 1 column")]
    ViewResult {
        /// Number of columns the select produced.
        columns: usize,
    },

    /// Design document failed validation.
    #[error("invalid sql statement: {message}")]
    InvalidSqlStatement {
        /// Description of the failure.
        message: String,
        /// The offending script, when one can be singled out.
        script: Option<String>,
    },

    /// A delta or select script failed while running against a view.
    #[error("view script failed: {message} (script: {script})")]
    ViewScript {
        /// Backend error message.
        message: String,
        /// The offending script text.
        script: String,
    },

    /// The data directory is held by another engine.
    #[error("data directory locked: another process has exclusive access")]
    DirectoryLocked,

    /// The sequence generator ran out of tokens.
    #[error("update sequence exhausted")]
    SequenceExhausted,

    /// Unexpected internal failure.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Returns the stable kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidName { .. } => ErrorKind::InvalidName,
            Self::DatabaseExists { .. } => ErrorKind::AlreadyExists,
            Self::DatabaseNotFound { .. } => ErrorKind::NotFound,
            Self::DocumentNotFound { .. } => ErrorKind::DocumentNotFound,
            Self::DocumentConflict { .. } => ErrorKind::DocumentConflict,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::InvalidRevision { .. } => ErrorKind::InvalidRevision,
            Self::ViewNotFound { .. } => ErrorKind::ViewNotFound,
            Self::ViewResult { .. } => ErrorKind::ViewResultError,
            Self::InvalidSqlStatement { .. } => ErrorKind::InvalidSqlStatement,
            Self::Sqlite(_)
            | Self::Io(_)
            | Self::ViewScript { .. }
            | Self::DirectoryLocked
            | Self::SequenceExhausted
            | Self::Internal { .. } => ErrorKind::InternalError,
        }
    }

    /// Creates an invalid name error.
    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName { name: name.into() }
    }

    /// Creates a document not found error for an id that never existed.
    pub fn document_not_found(id: impl Into<String>) -> Self {
        Self::DocumentNotFound {
            id: id.into(),
            deleted: None,
        }
    }

    /// Creates a document not found error carrying the deleted revision.
    pub fn document_deleted(doc: Document) -> Self {
        Self::DocumentNotFound {
            id: doc.id.clone(),
            deleted: Some(Box::new(doc)),
        }
    }

    /// Creates a document conflict error.
    pub fn document_conflict(id: impl Into<String>) -> Self {
        Self::DocumentConflict { id: id.into() }
    }

    /// Creates an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates an invalid revision error.
    pub fn invalid_revision(rev: impl Into<String>) -> Self {
        Self::InvalidRevision { rev: rev.into() }
    }

    /// Creates a view not found error.
    pub fn view_not_found(name: impl Into<String>) -> Self {
        Self::ViewNotFound { name: name.into() }
    }

    /// Creates an invalid SQL statement error.
    pub fn invalid_sql(message: impl Into<String>, script: Option<&str>) -> Self {
        Self::InvalidSqlStatement {
            message: message.into(),
            script: script.map(str::to_string),
        }
    }

    /// Creates a view script error.
    pub fn view_script(source: &rusqlite::Error, script: &str) -> Self {
        Self::ViewScript {
            message: source.to_string(),
            script: script.to_string(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the deleted revision carried by a `DocumentNotFound` error.
    #[must_use]
    pub fn deleted_document(&self) -> Option<&Document> {
        match self {
            Self::DocumentNotFound { deleted, .. } => deleted.as_deref(),
            _ => None,
        }
    }
}
