//! kdb CLI
//!
//! Command-line tools for kdb data directories.
//!
//! # Commands
//!
//! - `list`, `create`, `drop` - Manage databases
//! - `get`, `put`, `delete` - Read and write documents
//! - `changes` - Read the change feed
//! - `select` - Query a view
//! - `stat`, `vacuum` - Administration

mod commands;

use clap::{Parser, Subcommand};
use kdb_core::{Config, Engine};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// kdb command-line database tools.
#[derive(Parser)]
#[command(name = "kdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long, default_value = "data")]
    path: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List databases
    List,

    /// Create a database
    Create {
        /// Database name
        db: String,
    },

    /// Delete a database and all of its files
    Drop {
        /// Database name
        db: String,
    },

    /// Read a document
    Get {
        /// Database name
        db: String,
        /// Document id
        id: String,
        /// Read this version instead of the latest
        #[arg(long)]
        version: Option<u64>,
        /// Omit the body
        #[arg(short, long)]
        meta: bool,
    },

    /// Write a document (JSON text, `@file`, or `-` for stdin)
    Put {
        /// Database name
        db: String,
        /// Document JSON
        doc: String,
    },

    /// Delete a document
    Delete {
        /// Database name
        db: String,
        /// Document id
        id: String,
        /// Current revision (`<version>-<hash>`)
        rev: String,
    },

    /// Read the change feed
    Changes {
        /// Database name
        db: String,
        /// Only changes after this sequence token
        #[arg(short, long, default_value = "")]
        since: String,
        /// Maximum number of entries (0 = configured default)
        #[arg(short, long, default_value = "0")]
        limit: usize,
        /// Newest first
        #[arg(short, long)]
        descending: bool,
    },

    /// Run a view select
    Select {
        /// Database name
        db: String,
        /// Design document (with or without `_design/`)
        ddoc: String,
        /// View name
        view: String,
        /// Select variant
        #[arg(default_value = "default")]
        select: String,
        /// Select parameter as `name=value` (value parsed as JSON when possible)
        #[arg(short = 'P', long = "param")]
        params: Vec<String>,
        /// Skip the incremental build
        #[arg(long)]
        stale: bool,
    },

    /// Show database summary and counters
    Stat {
        /// Database name
        db: String,
    },

    /// Vacuum a database and its open views
    Vacuum {
        /// Database name
        db: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::Version = cli.command {
        println!("kdb CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("kdb core v{}", kdb_core::VERSION);
        return Ok(());
    }

    tracing::debug!(path = %cli.path.display(), "opening data directory");
    let engine = Engine::open(Config::new(&cli.path))?;

    match cli.command {
        Commands::List => commands::database::list(&engine)?,
        Commands::Create { db } => commands::database::create(&engine, &db)?,
        Commands::Drop { db } => commands::database::drop_database(&engine, &db)?,
        Commands::Get {
            db,
            id,
            version,
            meta,
        } => commands::document::get(&engine, &db, &id, version, meta)?,
        Commands::Put { db, doc } => commands::document::put(&engine, &db, &doc)?,
        Commands::Delete { db, id, rev } => commands::document::delete(&engine, &db, &id, &rev)?,
        Commands::Changes {
            db,
            since,
            limit,
            descending,
        } => commands::document::changes(&engine, &db, &since, limit, descending)?,
        Commands::Select {
            db,
            ddoc,
            view,
            select,
            params,
            stale,
        } => commands::view::select(&engine, &db, &ddoc, &view, &select, &params, stale)?,
        Commands::Stat { db } => commands::database::stat(&engine, &db)?,
        Commands::Vacuum { db } => commands::database::vacuum(&engine, &db)?,
        Commands::Version => {}
    }

    Ok(())
}
