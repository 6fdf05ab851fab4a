//! Engine configuration.

use crate::validator::{AcceptAll, SchemaValidator};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Builds the schema validator of one database, given the database name.
pub type ValidatorFactory = Arc<dyn Fn(&str) -> Arc<dyn SchemaValidator> + Send + Sync>;

/// Configuration for opening an [`Engine`](crate::Engine).
#[derive(Clone)]
pub struct Config {
    /// Root of the data directory (`dbs/`, `mrviews/`, `LOCK`).
    pub data_dir: PathBuf,

    /// Number of pooled reader connections per document store.
    pub reader_pool_size: usize,

    /// Number of pooled reader connections per materialized view.
    pub view_reader_pool_size: usize,

    /// How long to wait for a pooled connection (`None` = block).
    pub acquire_timeout: Option<Duration>,

    /// Change feed limit used when a caller passes `0`.
    pub default_changes_limit: usize,

    /// Builds the collaborator that validates document bodies by `_kind`.
    ///
    /// Called once per opened database; each database owns its validator.
    pub validator_factory: ValidatorFactory,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            reader_pool_size: 2,
            view_reader_pool_size: 2,
            acquire_timeout: None,
            default_changes_limit: 10_000,
            validator_factory: Arc::new(accept_all),
        }
    }
}

fn accept_all(_db_name: &str) -> Arc<dyn SchemaValidator> {
    Arc::new(AcceptAll)
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("data_dir", &self.data_dir)
            .field("reader_pool_size", &self.reader_pool_size)
            .field("view_reader_pool_size", &self.view_reader_pool_size)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("default_changes_limit", &self.default_changes_limit)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Creates a new configuration rooted at `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the document store reader pool size.
    #[must_use]
    pub const fn reader_pool_size(mut self, size: usize) -> Self {
        self.reader_pool_size = size;
        self
    }

    /// Sets the per-view reader pool size.
    #[must_use]
    pub const fn view_reader_pool_size(mut self, size: usize) -> Self {
        self.view_reader_pool_size = size;
        self
    }

    /// Sets the pool acquire timeout.
    #[must_use]
    pub const fn acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Sets the default change feed limit.
    #[must_use]
    pub const fn default_changes_limit(mut self, limit: usize) -> Self {
        self.default_changes_limit = limit;
        self
    }

    /// Sets how each database builds its schema validator.
    #[must_use]
    pub fn validator_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&str) -> Arc<dyn SchemaValidator> + Send + Sync + 'static,
    {
        self.validator_factory = Arc::new(factory);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.reader_pool_size, 2);
        assert_eq!(config.view_reader_pool_size, 2);
        assert_eq!(config.default_changes_limit, 10_000);
        assert!(config.acquire_timeout.is_none());
    }

    #[test]
    fn validator_factory_builds_one_per_call() {
        let config = Config::default();
        let a = (config.validator_factory)("a");
        let b = (config.validator_factory)("b");
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new("/tmp/kdb")
            .reader_pool_size(4)
            .acquire_timeout(Some(Duration::from_millis(50)))
            .default_changes_limit(10);

        assert_eq!(config.data_dir, PathBuf::from("/tmp/kdb"));
        assert_eq!(config.reader_pool_size, 4);
        assert_eq!(config.acquire_timeout, Some(Duration::from_millis(50)));
        assert_eq!(config.default_changes_limit, 10);
    }
}
