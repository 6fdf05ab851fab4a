//! Data directory management.
//!
//! This module handles the file system layout of an engine:
//!
//! ```text
//! <data_dir>/
//! ├─ LOCK                      # Advisory lock, one engine per directory
//! ├─ dbs/
//! │  ├─ _local.db              # Registry of databases and views
//! │  └─ <name>-<id>.db         # One document store per database
//! └─ mrviews/
//!    └─ <name>-<id>$<sig>.db   # One file per view signature
//! ```
//!
//! Every SQLite file may be accompanied by `-wal` and `-shm` siblings.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const DBS_DIR: &str = "dbs";
const VIEWS_DIR: &str = "mrviews";
const REGISTRY_FILE: &str = "_local.db";
const DB_EXT: &str = "db";

/// Suffixes SQLite may add next to a database file.
const SIDECAR_SUFFIXES: [&str; 2] = ["-wal", "-shm"];

/// The engine's data directory.
///
/// Holds an exclusive lock on `LOCK` for its whole lifetime, so only one
/// engine can use a directory at a time.
#[derive(Debug)]
pub struct DataDir {
    path: PathBuf,
    _lock_file: File,
}

impl DataDir {
    /// Opens the directory, creating it and its subdirectories if missing.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryLocked` if another engine holds the lock.
    pub fn open(path: &Path) -> CoreResult<Self> {
        fs::create_dir_all(path)?;
        if !path.is_dir() {
            return Err(CoreError::internal(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DirectoryLocked);
        }

        fs::create_dir_all(path.join(DBS_DIR))?;
        fs::create_dir_all(path.join(VIEWS_DIR))?;

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Root of the directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the registry database.
    #[must_use]
    pub fn registry_path(&self) -> PathBuf {
        self.path.join(DBS_DIR).join(REGISTRY_FILE)
    }

    /// Path of the document store whose file stem is `stem`.
    #[must_use]
    pub fn store_path(&self, stem: &str) -> PathBuf {
        self.path.join(DBS_DIR).join(format!("{stem}.{DB_EXT}"))
    }

    /// Directory holding view files.
    #[must_use]
    pub fn views_dir(&self) -> PathBuf {
        self.path.join(VIEWS_DIR)
    }
}

/// Removes a SQLite file together with its `-wal` and `-shm` siblings.
///
/// Missing files are not an error. Returns the number of files removed.
pub fn remove_database_file(path: &Path) -> CoreResult<usize> {
    let mut removed = 0;
    let base = path.as_os_str().to_os_string();
    let targets = std::iter::once(path.to_path_buf()).chain(SIDECAR_SUFFIXES.iter().map(|suffix| {
        let mut name = base.clone();
        name.push(suffix);
        PathBuf::from(name)
    }));
    for target in targets {
        match fs::remove_file(&target) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_layout() {
        let temp = tempdir().unwrap();
        let root = temp.path().join("data");
        assert!(!root.exists());

        let dir = DataDir::open(&root).unwrap();
        assert!(root.join("dbs").is_dir());
        assert!(dir.views_dir().is_dir());
        assert_eq!(dir.registry_path(), root.join("dbs").join("_local.db"));
        assert_eq!(dir.store_path("a-1"), root.join("dbs").join("a-1.db"));
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let _dir1 = DataDir::open(temp.path()).unwrap();

        let result = DataDir::open(temp.path());
        assert!(matches!(result, Err(CoreError::DirectoryLocked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        {
            let _dir = DataDir::open(temp.path()).unwrap();
        }
        let _dir2 = DataDir::open(temp.path()).unwrap();
    }

    #[test]
    fn open_rejects_file_path() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("plain");
        fs::write(&file, b"x").unwrap();
        assert!(DataDir::open(&file).is_err());
    }

    #[test]
    fn remove_database_file_takes_siblings() {
        let temp = tempdir().unwrap();
        let db = temp.path().join("x.db");
        fs::write(&db, b"").unwrap();
        fs::write(temp.path().join("x.db-wal"), b"").unwrap();

        assert_eq!(remove_database_file(&db).unwrap(), 2);
        assert!(!db.exists());
        assert_eq!(remove_database_file(&db).unwrap(), 0);
    }
}
