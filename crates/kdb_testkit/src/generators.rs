//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use proptest::prelude::*;
use serde_json::{Map, Value};

/// Strategy for generating valid, non-design document ids.
pub fn doc_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9][a-z0-9_-]{0,15}").expect("Invalid regex")
}

/// Strategy for generating valid database names.
pub fn db_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_-]{0,15}").expect("Invalid regex")
}

/// Strategy for generating optional `_kind` values.
pub fn kind_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop::string::string_regex("[a-z]{1,8}").expect("Invalid regex"))
}

/// Strategy for generating JSON leaves.
pub fn json_leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,16}".prop_map(Value::String),
    ]
}

/// Strategy for generating document bodies (no reserved keys).
pub fn body_strategy() -> impl Strategy<Value = Map<String, Value>> {
    let value = json_leaf_strategy().prop_recursive(2, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    });
    prop::collection::btree_map("[a-z][a-z0-9]{0,7}", value, 0..6)
        .prop_map(|m| m.into_iter().collect())
}

/// One step of a generated workload.
#[derive(Debug, Clone)]
pub enum DocOperation {
    /// Write a new revision of `id` (creating it if needed)
    Put {
        /// Document id
        id: String,
        /// Document body
        body: Map<String, Value>,
    },
    /// Delete `id` if it is live
    Delete {
        /// Document id
        id: String,
    },
}

impl DocOperation {
    /// The document id the operation targets.
    pub fn id(&self) -> &str {
        match self {
            Self::Put { id, .. } | Self::Delete { id } => id,
        }
    }
}

/// Strategy for generating operations over a small id space, so ids repeat.
pub fn doc_operation_strategy() -> impl Strategy<Value = DocOperation> {
    let id = prop::sample::select(vec!["a", "b", "c", "d"]).prop_map(str::to_string);
    prop_oneof![
        3 => (id.clone(), body_strategy()).prop_map(|(id, body)| DocOperation::Put { id, body }),
        1 => id.prop_map(|id| DocOperation::Delete { id }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<DocOperation>> {
    prop::collection::vec(doc_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    ///
    /// Every case opens SQLite files, so on-disk properties use this.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 16,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
