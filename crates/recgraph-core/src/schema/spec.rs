use crate::identity::{ModelName, RecordId, RecordIdentity};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

///
/// RecordRef
///
/// One reference produced by the schema. An absent `model_name` means the
/// target is looked up by id alone through the global identity index.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RecordRef {
    pub id: RecordId,
    pub model_name: Option<ModelName>,
}

impl RecordRef {
    #[must_use]
    pub fn typed(model_name: impl Into<ModelName>, id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            model_name: Some(model_name.into()),
        }
    }

    #[must_use]
    pub fn untyped(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            model_name: None,
        }
    }

    /// Raw reference shape used when a resolved reference is rendered back
    /// into JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("id".to_string(), self.id.to_json());
        if let Some(model_name) = &self.model_name {
            out.insert(
                "type".to_string(),
                Value::String(model_name.as_str().to_string()),
            );
        }

        Value::Object(out)
    }
}

///
/// ReferenceSpec
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReferenceSpec {
    One(RecordRef),
    Many(Vec<RecordRef>),
}

///
/// NestedModelSpec
///
/// An embedded entity recognized inside a raw attribute value.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NestedModelSpec {
    pub model_name: ModelName,
    pub id: Option<RecordId>,
    pub attributes: Map<String, Value>,
}

impl NestedModelSpec {
    #[must_use]
    pub fn new(
        model_name: impl Into<ModelName>,
        id: Option<RecordId>,
        attributes: Map<String, Value>,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            id,
            attributes,
        }
    }

    #[must_use]
    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity::new(self.model_name.clone(), self.id.clone())
    }
}
