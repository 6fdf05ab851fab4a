//! CLI command implementations.

pub mod database;
pub mod document;
pub mod view;

use serde::Serialize;

/// Result type of every command.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Prints `value` as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
