//! Document and change feed commands.

use super::{print_json, CommandResult};
use kdb_core::{Document, Engine};
use std::fs;
use std::io::{self, Read};

/// Prints one document.
pub fn get(engine: &Engine, db: &str, id: &str, version: Option<u64>, meta: bool) -> CommandResult {
    let db = engine.database(db)?;
    let doc = match (version, meta) {
        (None, false) => db.get_document(id),
        (None, true) => db.get_document_metadata(id),
        (Some(v), false) => db.get_document_version(id, v),
        (Some(v), true) => db.get_document_metadata_version(id, v),
    };
    match doc {
        Ok(doc) => print_json(&doc),
        Err(e) => match e.deleted_document() {
            Some(tombstone) => {
                print_json(tombstone)?;
                Err(e.into())
            }
            None => Err(e.into()),
        },
    }
}

/// Writes a document and prints the stored revision.
pub fn put(engine: &Engine, db: &str, input: &str) -> CommandResult {
    let db = engine.database(db)?;
    let bytes = read_input(input)?;
    let stored = db.put_document(Document::parse(&bytes)?)?;
    print_json(&serde_json::json!({"id": stored.id, "rev": stored.rev()}))
}

/// Deletes a document and prints the tombstone revision.
pub fn delete(engine: &Engine, db: &str, id: &str, rev: &str) -> CommandResult {
    let db = engine.database(db)?;
    let stored = db.delete_document(id, rev)?;
    print_json(&serde_json::json!({"id": stored.id, "rev": stored.rev()}))
}

/// Prints change feed entries.
pub fn changes(
    engine: &Engine,
    db: &str,
    since: &str,
    limit: usize,
    descending: bool,
) -> CommandResult {
    let db = engine.database(db)?;
    print_json(&db.get_changes(since, limit, descending)?)
}

/// Reads a document argument: literal JSON, `@path`, or `-` for stdin.
pub fn read_input(input: &str) -> io::Result<Vec<u8>> {
    if input == "-" {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else if let Some(path) = input.strip_prefix('@') {
        fs::read(path)
    } else {
        Ok(input.as_bytes().to_vec())
    }
}
