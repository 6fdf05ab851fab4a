//! # kdb core
//!
//! Embedded, versioned JSON document store with incremental SQL views.
//!
//! This crate provides:
//! - A document store with optimistic revision checks and a totally ordered
//!   change feed
//! - Materialized views maintained by SQL delta scripts over that feed
//! - Design document validation and view file lifecycle
//! - An [`Engine`] owning a data directory of named databases
//!
//! ```rust,ignore
//! use kdb_core::{Config, Document, Engine};
//!
//! let engine = Engine::open(Config::new("data"))?;
//! let db = engine.create_database("notes")?;
//! let stored = db.put_document(Document::parse(br#"{"_id": "n1", "x": 1}"#)?)?;
//! db.delete_document("n1", &stored.rev())?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod dir;
pub mod document;
mod engine;
mod error;
mod pool;
mod registry;
pub mod sequence;
mod stats;
pub mod store;
mod types;
mod validator;
pub mod view;

pub use config::{Config, ValidatorFactory};
pub use database::Database;
pub use document::{DesignDocument, Document, ViewDefinition};
pub use engine::{validate_db_name, Engine};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use stats::{DatabaseStats, StatsSnapshot};
pub use types::{ChangeEntry, DatabaseStat, DocumentCount, SelectParams, UpdateSeq};
pub use validator::{AcceptAll, SchemaValidator};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
