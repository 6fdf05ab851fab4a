//! Materialized views.
//!
//! A view is a separate SQLite file with the document store attached
//! read-only as `docsdb`. Its delta scripts fold the changes between two
//! sequence tokens into view tables; select scripts read those tables and
//! return one JSON value.

pub mod builtin;
mod manager;
mod materialized;
mod query;
mod validate;

pub(crate) use manager::ViewManager;
pub use manager::{calculate_signature, qualified_name};
pub use materialized::{View, BEGIN_SEQ, END_SEQ};
pub use query::Query;
pub use validate::{denylisted_keyword, validate_design_document, DENYLIST};
