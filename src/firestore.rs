pub mod credential;
#[cfg(test)]
pub(crate) mod memory;
pub mod rest;
pub mod value;

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use value::Value;

/// `collection/id`, relative to the database documents root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DocumentPath {
    pub collection: String,
    pub id: String,
}

impl DocumentPath {
    pub fn new(collection: &str, id: &str) -> Self {
        Self {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

impl Display for DocumentPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

/// Condition the stored document must satisfy for a write to be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    Exists,
    UpdateTime(String),
}

/// Read and partially update single documents.
#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    /// `Ok(None)` when the document does not exist.
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, Error>;

    /// Sets one top-level field, leaving every other field of the document untouched.
    async fn update(
        &self,
        path: &DocumentPath,
        field: &str,
        value: Value,
        precondition: Precondition,
    ) -> Result<Document, Error>;
}
