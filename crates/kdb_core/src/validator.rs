//! Schema validation boundary.
//!
//! Documents that carry a `_kind` are handed to a [`SchemaValidator`] before
//! they are written. Every database owns its validator, built by
//! [`Config::validator_factory`](crate::Config::validator_factory()). It is
//! refreshed with the database's design documents whenever one of them
//! changes, so it can derive its per-kind rules from them.

use crate::document::Document;
use crate::error::CoreResult;

/// Validates document bodies by kind.
pub trait SchemaValidator: Send + Sync {
    /// Rebuilds validation rules from the database's design documents.
    fn refresh(&self, design_documents: &[Document]) -> CoreResult<()>;

    /// Validates `doc`, returning one message per violation.
    ///
    /// An empty vector means the document is accepted.
    fn validate(&self, doc: &Document) -> Vec<String>;
}

/// Validator that accepts every document.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl SchemaValidator for AcceptAll {
    fn refresh(&self, _design_documents: &[Document]) -> CoreResult<()> {
        Ok(())
    }

    fn validate(&self, _doc: &Document) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_all_accepts() {
        let doc = Document::parse(br#"{"_id":"a","_kind":"user","x":1}"#).unwrap();
        assert!(AcceptAll.validate(&doc).is_empty());
        AcceptAll.refresh(&[doc]).unwrap();
    }
}
