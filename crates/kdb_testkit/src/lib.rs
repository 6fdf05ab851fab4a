//! # kdb testkit
//!
//! Test utilities for kdb.
//!
//! This crate provides:
//! - Temporary engines and databases that clean up after themselves
//! - Design document builders for common view shapes
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kdb_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_database() {
//!     with_temp_db(|db| {
//!         db.put_document(doc(json!({"_id": "a"}))).unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
