use crate::document::Document;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Scripts defining one materialized view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDefinition {
    /// Statements creating the view's relations. Run when the view is opened.
    #[serde(default)]
    pub setup: Vec<String>,
    /// Statements applied, in order, for each build range.
    #[serde(default)]
    pub delta: Vec<String>,
    /// Named select scripts, each returning one JSON column.
    #[serde(default)]
    pub select: BTreeMap<String, String>,
}

/// The view-bearing part of a design document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignDocument {
    /// Id of the underlying document.
    #[serde(skip)]
    pub id: String,
    /// Views by name.
    #[serde(default)]
    pub views: BTreeMap<String, ViewDefinition>,
}

impl DesignDocument {
    /// Extracts the view definitions from a stored design document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `views` does not have the expected shape.
    pub fn from_document(doc: &Document) -> CoreResult<Self> {
        let mut ddoc: Self = serde_json::from_value(Value::Object(doc.data.clone()))
            .map_err(|e| {
                CoreError::invalid_input(format!("invalid design document {}: {e}", doc.id))
            })?;
        ddoc.id = doc.id.clone();
        Ok(ddoc)
    }

    /// Returns the definition of `name`, if present.
    #[must_use]
    pub fn view(&self, name: &str) -> Option<&ViewDefinition> {
        self.views.get(name)
    }
}
