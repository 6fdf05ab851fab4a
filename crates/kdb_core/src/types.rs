//! Core type definitions for kdb.

use crate::error::{CoreError, CoreResult};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Parameters bound to `${name}` placeholders of a select script.
pub type SelectParams = BTreeMap<String, serde_json::Value>;

/// A point in a database's change history.
///
/// `id` is the fixed-width token issued by the sequence generator and is the
/// only authoritative ordering key; `number` is a human-readable ordinal that
/// wraps. The empty sequence (`number == 0`, empty token) sorts before every
/// issued one.
#[derive(Debug, Clone, Default)]
pub struct UpdateSeq {
    /// Informational ordinal.
    pub number: u64,
    /// Sortable token.
    pub id: String,
}

impl UpdateSeq {
    /// Creates a sequence from its parts.
    #[must_use]
    pub fn new(number: u64, id: impl Into<String>) -> Self {
        Self {
            number,
            id: id.into(),
        }
    }

    /// Returns `true` for the empty sequence of a store with no writes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }
}

impl PartialEq for UpdateSeq {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for UpdateSeq {}

impl Hash for UpdateSeq {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for UpdateSeq {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UpdateSeq {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for UpdateSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        write!(f, "{}-{}", self.number, self.id)
    }
}

impl FromStr for UpdateSeq {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        if s.is_empty() {
            return Ok(Self::default());
        }
        // The token alphabet contains '-', so only the first one separates.
        let (number, id) = s
            .split_once('-')
            .ok_or_else(|| CoreError::invalid_input(format!("malformed update sequence: {s}")))?;
        let number = number
            .parse()
            .map_err(|_| CoreError::invalid_input(format!("malformed update sequence: {s}")))?;
        Ok(Self::new(number, id))
    }
}

impl Serialize for UpdateSeq {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One entry of the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEntry {
    /// Sequence token of the change.
    pub seq: String,
    /// Document id.
    pub id: String,
    /// Version produced by the change.
    pub version: u64,
    /// Whether the change deleted the document.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

/// Live and deleted document counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DocumentCount {
    /// Documents whose latest revision is live.
    pub live: u64,
    /// Documents whose latest revision is deleted.
    pub deleted: u64,
}

/// Summary of one logical database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseStat {
    /// Database name.
    pub db_name: String,
    /// Last issued update sequence (`"<number>-<token>"`).
    pub update_seq: UpdateSeq,
    /// Number of live documents.
    pub doc_count: u64,
    /// Number of deleted documents.
    pub deleted_doc_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_seq_display_and_parse() {
        let seq = UpdateSeq::new(12, "-0000000000000000000000A");
        let text = seq.to_string();
        assert_eq!(text, "12--0000000000000000000000A");
        assert_eq!(text.parse::<UpdateSeq>().unwrap(), seq);
    }

    #[test]
    fn empty_update_seq() {
        let seq = UpdateSeq::default();
        assert!(seq.is_empty());
        assert_eq!(seq.to_string(), "");
        assert_eq!("".parse::<UpdateSeq>().unwrap(), seq);
        assert!(seq < UpdateSeq::new(1, "-"));
    }

    #[test]
    fn malformed_update_seq() {
        assert!("abc".parse::<UpdateSeq>().is_err());
        assert!("x-abc".parse::<UpdateSeq>().is_err());
    }

    #[test]
    fn ordering_follows_token_not_number() {
        let a = UpdateSeq::new(16_773_119, "A");
        let b = UpdateSeq::new(1, "B");
        assert!(a < b);
    }

    #[test]
    fn equality_follows_token() {
        use std::collections::HashSet;

        let a = UpdateSeq::new(3, "B");
        let wrapped = UpdateSeq::new(16_777_219, "B");
        assert_eq!(a.cmp(&wrapped), std::cmp::Ordering::Equal);
        assert_eq!(a, wrapped);
        assert_ne!(a, UpdateSeq::new(3, "C"));

        let set: HashSet<UpdateSeq> = [a, wrapped].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn change_entry_omits_false_deleted() {
        let live = ChangeEntry {
            seq: "s".into(),
            id: "a".into(),
            version: 1,
            deleted: false,
        };
        let json = serde_json::to_value(&live).unwrap();
        assert!(json.get("deleted").is_none());

        let gone = ChangeEntry {
            deleted: true,
            ..live
        };
        let json = serde_json::to_value(&gone).unwrap();
        assert_eq!(json["deleted"], serde_json::Value::Bool(true));
    }
}
