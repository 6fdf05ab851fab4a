//! Versioned JSON documents.
//!
//! A [`Document`] is the in-memory form of one revision. Reserved top-level
//! keys (`_id`, `_rev`, `_version`, `_deleted`, `_kind`) are lifted out of the
//! body on [`Document::parse`] and injected back, `_id` first, when the
//! document is serialized.

mod design;

pub use design::{DesignDocument, ViewDefinition};

use crate::error::{CoreError, CoreResult};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Id prefix of design documents.
pub const DESIGN_PREFIX: &str = "_design/";

/// Kind forced onto every design document.
pub const DESIGN_KIND: &str = "design";

/// One revision of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    /// Document id. Empty until assigned.
    pub id: String,
    /// Revision number. `0` means "new".
    pub version: u64,
    /// Content hash of the body. Empty when only a version was presented.
    pub hash: String,
    /// Whether this revision deletes the document.
    pub deleted: bool,
    /// Optional schema routing tag.
    pub kind: Option<String>,
    /// Application data, without reserved keys.
    pub data: Map<String, Value>,
}

impl Document {
    /// Creates a new, unversioned document.
    pub fn new(id: impl Into<String>, data: Map<String, Value>) -> Self {
        let hash = content_hash(&data);
        Self {
            id: id.into(),
            hash,
            data,
            ..Self::default()
        }
    }

    /// Parses a document from its JSON wire form.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for malformed JSON, a non-object payload, mistyped
    ///   reserved keys, or a revision without an id
    /// - `InvalidRevision` for a `_rev` that is not `"<version>-<hash>"`
    pub fn parse(bytes: &[u8]) -> CoreResult<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| CoreError::invalid_input(format!("invalid json format: {e}")))?;
        Self::from_value(value)
    }

    /// Builds a document from an already-decoded JSON value.
    pub fn from_value(value: Value) -> CoreResult<Self> {
        let Value::Object(mut data) = value else {
            return Err(CoreError::invalid_input("payload expected as json object"));
        };

        let id = match data.remove("_id") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(id)) => id,
            Some(_) => return Err(CoreError::invalid_input("_id must be a string")),
        };

        let rev = data.remove("_rev");
        let version_only = data.remove("_version");
        let (version, hash) = match (rev, version_only) {
            (Some(Value::String(rev)), _) => parse_rev(&rev)?,
            (Some(Value::Null) | None, Some(v)) => {
                let version = v
                    .as_u64()
                    .ok_or_else(|| CoreError::invalid_revision(v.to_string()))?;
                (version, String::new())
            }
            (Some(Value::Null) | None, None) => (0, String::new()),
            (Some(other), _) => return Err(CoreError::invalid_revision(other.to_string())),
        };

        let deleted = match data.remove("_deleted") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(deleted)) => deleted,
            Some(_) => return Err(CoreError::invalid_input("_deleted must be a bool")),
        };

        let kind = match data.remove("_kind") {
            None | Some(Value::Null) => None,
            Some(Value::String(kind)) => Some(kind),
            Some(_) => return Err(CoreError::invalid_input("_kind must be a string")),
        };

        if id.is_empty() && version != 0 {
            return Err(CoreError::invalid_input(
                "document can't have _rev without _id",
            ));
        }

        Ok(Self {
            id,
            version,
            hash,
            deleted,
            kind,
            data,
        })
    }

    /// Returns the revision string `"<version>-<hash>"`.
    #[must_use]
    pub fn rev(&self) -> String {
        format!("{}-{}", self.version, self.hash)
    }

    /// Returns `true` if this is a design document.
    #[must_use]
    pub fn is_design(&self) -> bool {
        is_design_id(&self.id)
    }

    /// Serializes the document to its JSON wire form.
    pub fn to_json(&self) -> CoreResult<String> {
        serde_json::to_string(self).map_err(|e| CoreError::internal(e.to_string()))
    }

    /// Serializes the body alone, key-sorted.
    pub(crate) fn body_json(&self) -> CoreResult<String> {
        serde_json::to_string(&self.data).map_err(|e| CoreError::internal(e.to_string()))
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("_id", &self.id)?;
        if self.version > 0 {
            map.serialize_entry("_rev", &self.rev())?;
        }
        if self.deleted {
            map.serialize_entry("_deleted", &true)?;
        }
        if let Some(kind) = &self.kind {
            map.serialize_entry("_kind", kind)?;
        }
        for (key, value) in &self.data {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Splits a `"<version>-<hash>"` revision.
pub fn parse_rev(rev: &str) -> CoreResult<(u64, String)> {
    let (version, hash) = rev
        .split_once('-')
        .ok_or_else(|| CoreError::invalid_revision(rev))?;
    let version: u64 = version
        .parse()
        .map_err(|_| CoreError::invalid_revision(rev))?;
    if version == 0 || hash.is_empty() {
        return Err(CoreError::invalid_revision(rev));
    }
    Ok((version, hash.to_string()))
}

/// Content hash of a body: first 16 bytes of SHA-256 over key-sorted JSON.
#[must_use]
pub fn content_hash(data: &Map<String, Value>) -> String {
    // `Map` is ordered by key, so serialization is canonical.
    let canonical = serde_json::to_vec(data).unwrap_or_default();
    let digest = Sha256::digest(&canonical);
    let mut out = String::with_capacity(32);
    for byte in &digest[..16] {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Returns `true` for ids under the design prefix.
#[must_use]
pub fn is_design_id(id: &str) -> bool {
    id.starts_with(DESIGN_PREFIX)
}

/// Validates a document id.
///
/// Ids must be non-empty and may only start with `_` when they name a design
/// document.
pub fn validate_id(id: &str) -> CoreResult<()> {
    if id.is_empty() {
        return Err(CoreError::invalid_name(id));
    }
    if id.starts_with('_') && !(is_design_id(id) && id.len() > DESIGN_PREFIX.len()) {
        return Err(CoreError::invalid_name(id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_strips_reserved_keys() {
        let doc = Document::parse(
            br#"{"_id":"a","_rev":"2-abc","_deleted":true,"_kind":"user","x":1}"#,
        )
        .unwrap();
        assert_eq!(doc.id, "a");
        assert_eq!(doc.version, 2);
        assert_eq!(doc.hash, "abc");
        assert!(doc.deleted);
        assert_eq!(doc.kind.as_deref(), Some("user"));
        assert_eq!(doc.data.len(), 1);
        assert_eq!(doc.data["x"], json!(1));
    }

    #[test]
    fn version_only_input() {
        let doc = Document::parse(br#"{"_id":"a","_version":3}"#).unwrap();
        assert_eq!(doc.version, 3);
        assert!(doc.hash.is_empty());

        let doc = Document::parse(br#"{"_id":"a","_rev":"4-h","_version":3}"#).unwrap();
        assert_eq!(doc.version, 4);
        assert_eq!(doc.hash, "h");
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            Document::parse(b"{not json").unwrap_err().kind(),
            crate::ErrorKind::InvalidInput
        );
        assert_eq!(
            Document::parse(b"[1,2]").unwrap_err().kind(),
            crate::ErrorKind::InvalidInput
        );
        assert_eq!(
            Document::parse(br#"{"_rev":"1-abc"}"#).unwrap_err().kind(),
            crate::ErrorKind::InvalidInput
        );
        assert_eq!(
            Document::parse(br#"{"_id":"a","_rev":"nope"}"#)
                .unwrap_err()
                .kind(),
            crate::ErrorKind::InvalidRevision
        );
        assert_eq!(
            Document::parse(br#"{"_id":"a","_rev":"x-abc"}"#)
                .unwrap_err()
                .kind(),
            crate::ErrorKind::InvalidRevision
        );
    }

    #[test]
    fn deleted_must_be_bool() {
        let err = Document::parse(br#"{"_id":"a","_deleted":"true"}"#).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidInput);
        assert!(err.to_string().contains("_deleted"));
        assert!(!Document::parse(br#"{"_id":"a","_deleted":null}"#).unwrap().deleted);
    }

    #[test]
    fn serialize_puts_id_first() {
        let mut doc = Document::parse(br#"{"_id":"a","b":2,"a":1}"#).unwrap();
        doc.version = 1;
        doc.hash = content_hash(&doc.data);
        let text = doc.to_json().unwrap();
        assert!(text.starts_with(r#"{"_id":"a","_rev":"1-"#));
        assert!(text.ends_with(r#""a":1,"b":2}"#));
    }

    #[test]
    fn new_document_omits_rev() {
        let doc = Document::new("a", Map::new());
        assert_eq!(doc.to_json().unwrap(), r#"{"_id":"a"}"#);
    }

    #[test]
    fn hash_ignores_key_order() {
        let a = Document::parse(br#"{"x":1,"y":{"b":1,"a":2}}"#).unwrap();
        let b = Document::parse(br#"{"y":{"a":2,"b":1},"x":1}"#).unwrap();
        assert_eq!(content_hash(&a.data), content_hash(&b.data));
        assert_eq!(content_hash(&a.data).len(), 32);
    }

    #[test]
    fn round_trip_with_and_without_kind() {
        for input in [
            r#"{"_id":"a","_rev":"3-ff","x":[1,2]}"#,
            r#"{"_id":"b","_rev":"1-aa","_deleted":true,"_kind":"k"}"#,
        ] {
            let doc = Document::parse(input.as_bytes()).unwrap();
            let again = Document::parse(doc.to_json().unwrap().as_bytes()).unwrap();
            assert_eq!(doc, again);
        }
    }

    #[test]
    fn id_rules() {
        assert!(validate_id("a").is_ok());
        assert!(validate_id("_design/x").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("_private").is_err());
        assert!(validate_id("_design/").is_err());
    }
}
