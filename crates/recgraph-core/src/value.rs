use crate::graph::{ArrayHandle, ModelHandle};
use serde_json::Value;

///
/// AttrValue
///
/// What an attribute bucket holds. Raw JSON from the server or the host, or
/// an already-resolved model or lazy array written by the host.
///
/// Equality is deep for JSON and by handle for models and arrays, which is
/// exactly the rule the dirty check relies on.
///

#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Json(Value),
    Model(ModelHandle),
    Array(ArrayHandle),
}

impl AttrValue {
    #[must_use]
    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Model(_) | Self::Array(_) => None,
        }
    }

    #[must_use]
    pub const fn as_model(&self) -> Option<ModelHandle> {
        match self {
            Self::Model(model) => Some(*model),
            Self::Json(_) | Self::Array(_) => None,
        }
    }

    #[must_use]
    pub const fn as_array(&self) -> Option<ArrayHandle> {
        match self {
            Self::Array(array) => Some(*array),
            Self::Json(_) | Self::Model(_) => None,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Json(Value::Null))
    }

    /// Default resolution heuristic: handles are resolved, JSON is not.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        matches!(self, Self::Model(_) | Self::Array(_))
    }

    #[must_use]
    pub fn to_resolved(&self) -> Resolved {
        match self {
            Self::Json(value) => Resolved::Value(value.clone()),
            Self::Model(model) => Resolved::Model(*model),
            Self::Array(array) => Resolved::Array(*array),
        }
    }
}

impl From<Value> for AttrValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<ModelHandle> for AttrValue {
    fn from(model: ModelHandle) -> Self {
        Self::Model(model)
    }
}

impl From<ArrayHandle> for AttrValue {
    fn from(array: ArrayHandle) -> Self {
        Self::Array(array)
    }
}

///
/// Resolved
///
/// What a facade read produces after the schema has had its say.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Resolved {
    Value(Value),
    Model(ModelHandle),
    Array(ArrayHandle),
}

impl Resolved {
    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Model(_) | Self::Array(_) => None,
        }
    }

    #[must_use]
    pub const fn as_model(&self) -> Option<ModelHandle> {
        match self {
            Self::Model(model) => Some(*model),
            Self::Value(_) | Self::Array(_) => None,
        }
    }

    #[must_use]
    pub const fn as_array(&self) -> Option<ArrayHandle> {
        match self {
            Self::Array(array) => Some(*array),
            Self::Value(_) | Self::Model(_) => None,
        }
    }
}

///
/// TESTS
///
