//! Module: identity
//! Responsibility: model names, record ids, and the (model, id) identity pair.
//! Does not own: identity maps or the global id index (see `graph`, `index`).
//!
//! Invariants:
//! - Ids are stored as text; numeric JSON ids are normalized to their
//!   decimal rendering so `7` and `"7"` name the same record.
//! - Nested identities compare by model name and id, where two absent ids
//!   denote the same anonymous slot.

use crate::error::{IdentityError, InternalError};
use derive_more::{Deref, Display, From};
use serde::{Deserialize, Serialize};
use serde_json::Value;

///
/// ModelName
///

#[derive(
    Clone, Debug, Deref, Deserialize, Display, Eq, From, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(transparent)]
pub struct ModelName(String);

impl ModelName {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ModelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModelName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl PartialEq<str> for ModelName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ModelName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

///
/// RecordId
///

#[derive(
    Clone, Debug, Deref, Deserialize, Display, Eq, From, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read an id out of raw JSON; `null` means "no id".
    pub fn from_json(value: &Value) -> Result<Option<Self>, InternalError> {
        match value {
            Value::Null => Ok(None),
            Value::String(id) => Ok(Some(Self(id.clone()))),
            Value::Number(id) => Ok(Some(Self(id.to_string()))),
            other => Err(IdentityError::InvalidId {
                value: other.to_string(),
            }
            .into()),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::String(self.0.clone())
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl PartialEq<&str> for RecordId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

///
/// RecordIdentity
///
/// (model, id) pair. `id` is absent for unsaved records and for anonymous
/// nested entities.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct RecordIdentity {
    pub model_name: ModelName,
    pub id: Option<RecordId>,
}

impl RecordIdentity {
    #[must_use]
    pub fn new(model_name: impl Into<ModelName>, id: Option<RecordId>) -> Self {
        Self {
            model_name: model_name.into(),
            id,
        }
    }

    /// Whether a nested value with `other` identity denotes the same child.
    #[must_use]
    pub fn same_nested_slot(&self, other: &Self) -> bool {
        self.model_name == other.model_name && self.id == other.id
    }

    /// Lookup key for identity maps; absent ids are never indexed.
    #[must_use]
    pub fn key(&self) -> Option<IdentityKey> {
        self.id
            .as_ref()
            .map(|id| (self.model_name.clone(), id.clone()))
    }
}

impl std::fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}:{id}", self.model_name),
            None => write!(f, "{}:<new>", self.model_name),
        }
    }
}

/// Identity map key: (model name, id).
pub type IdentityKey = (ModelName, RecordId);

///
/// TESTS
///
