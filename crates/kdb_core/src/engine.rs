//! The engine: a data directory and the databases living in it.

use crate::config::Config;
use crate::database::{isolate, Database};
use crate::dir::{self, DataDir};
use crate::error::{CoreError, CoreResult};
use crate::registry::Registry;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Owns the data directory, the registry and every open database.
///
/// ```rust,ignore
/// use kdb_core::{Config, Engine};
///
/// let engine = Engine::open(Config::new("data"))?;
/// engine.create_database("notes")?;
/// assert_eq!(engine.list_databases(), ["notes"]);
/// ```
pub struct Engine {
    config: Config,
    dir: DataDir,
    registry: Arc<Registry>,
    databases: RwLock<HashMap<String, Arc<Database>>>,
}

impl Engine {
    /// Opens the data directory named by `config` and every registered
    /// database in it.
    ///
    /// A database that fails to open is logged and left out; it stays
    /// registered and is retried on the next start.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryLocked` if another engine uses the directory.
    pub fn open(config: Config) -> CoreResult<Self> {
        let dir = DataDir::open(&config.data_dir)?;
        let registry = Arc::new(Registry::open(&dir.registry_path())?);

        let mut databases = HashMap::new();
        for (name, file_stem) in registry.databases()? {
            let opened = isolate("open_database", || {
                Database::open(&name, &file_stem, &dir, Arc::clone(&registry), &config, false)
            });
            match opened {
                Ok(db) => {
                    databases.insert(name, Arc::new(db));
                }
                Err(e) => {
                    tracing::warn!(db = %name, error = %e, "failed to open database, skipping");
                }
            }
        }

        tracing::info!(path = %dir.path().display(), databases = databases.len(), "engine opened");

        Ok(Self {
            config,
            dir,
            registry,
            databases: RwLock::new(databases),
        })
    }

    /// Creates an empty database seeded with the built-in design document.
    ///
    /// # Errors
    ///
    /// `InvalidName` unless the name matches `^[a-z][a-z0-9_-]*$`,
    /// `DatabaseExists` if the name is taken.
    pub fn create_database(&self, name: &str) -> CoreResult<Arc<Database>> {
        validate_db_name(name)?;
        isolate("create_database", || {
            let mut databases = self.databases.write();
            if databases.contains_key(name) {
                return Err(CoreError::DatabaseExists {
                    name: name.to_string(),
                });
            }

            let id = Uuid::new_v4().simple().to_string();
            let file_stem = format!("{name}-{}", &id[..8]);
            self.registry.insert_database(name, &file_stem)?;

            let opened = Database::open(
                name,
                &file_stem,
                &self.dir,
                Arc::clone(&self.registry),
                &self.config,
                true,
            );
            let db = match opened {
                Ok(db) => Arc::new(db),
                Err(e) => {
                    self.registry.remove_database(name)?;
                    dir::remove_database_file(&self.dir.store_path(&file_stem))?;
                    return Err(e);
                }
            };

            databases.insert(name.to_string(), Arc::clone(&db));
            tracing::info!(db = %name, file = %file_stem, "database created");
            Ok(db)
        })
    }

    /// Deletes a database with its store file and every view file.
    ///
    /// Handles obtained earlier keep working until dropped, but their files
    /// are gone.
    pub fn delete_database(&self, name: &str) -> CoreResult<()> {
        isolate("delete_database", || {
            let mut databases = self.databases.write();
            let db = databases
                .remove(name)
                .ok_or_else(|| CoreError::DatabaseNotFound {
                    name: name.to_string(),
                })?;

            db.destroy_views()?;
            self.registry.remove_database(name)?;
            let store_path = self.dir.store_path(db.file_stem());
            drop(db);
            dir::remove_database_file(&store_path)?;

            tracing::info!(db = %name, "database deleted");
            Ok(())
        })
    }

    /// Names of the open databases, sorted.
    #[must_use]
    pub fn list_databases(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Looks up an open database.
    pub fn database(&self, name: &str) -> CoreResult<Arc<Database>> {
        self.databases
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::DatabaseNotFound {
                name: name.to_string(),
            })
    }

    /// The configuration the engine was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("path", &self.dir.path())
            .field("databases", &self.list_databases())
            .finish_non_exhaustive()
    }
}

/// Checks a database name against `^[a-z][a-z0-9_-]*$`.
pub fn validate_db_name(name: &str) -> CoreResult<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(CoreError::invalid_name(name))
    }
}
