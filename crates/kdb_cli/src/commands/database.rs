//! Database administration commands.

use super::{print_json, CommandResult};
use kdb_core::{DatabaseStat, Engine, StatsSnapshot};
use serde::Serialize;

/// Output of `stat`.
#[derive(Debug, Serialize)]
pub struct StatOutput {
    /// Database summary.
    #[serde(flatten)]
    pub stat: DatabaseStat,
    /// Counters since the engine was opened.
    pub stats: StatsSnapshot,
}

/// Lists databases, one per line.
pub fn list(engine: &Engine) -> CommandResult {
    for name in engine.list_databases() {
        println!("{name}");
    }
    Ok(())
}

/// Creates a database.
pub fn create(engine: &Engine, db: &str) -> CommandResult {
    engine.create_database(db)?;
    println!("created {db}");
    Ok(())
}

/// Deletes a database.
pub fn drop_database(engine: &Engine, db: &str) -> CommandResult {
    engine.delete_database(db)?;
    println!("deleted {db}");
    Ok(())
}

/// Prints the database summary.
pub fn stat(engine: &Engine, db: &str) -> CommandResult {
    let db = engine.database(db)?;
    print_json(&StatOutput {
        stat: db.stat()?,
        stats: db.stats(),
    })
}

/// Vacuums a database.
pub fn vacuum(engine: &Engine, db: &str) -> CommandResult {
    engine.database(db)?.vacuum()?;
    println!("vacuumed {db}");
    Ok(())
}
