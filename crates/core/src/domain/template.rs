//! Tenant-defined record shapes.
//!
//! Entities reference templates; templates are made of sections, sections of
//! fields, and table fields carry their own column definitions. A nested
//! collection that is missing, `null` or not a list decodes as empty, and an
//! element that does not fit is dropped without taking its siblings with it.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TemplateId(pub String);

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LifecycleStatus {
    Active,
    #[default]
    Inactive,
    Other(String),
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Other(raw) => raw,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl From<String> for LifecycleStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ACTIVE" => Self::Active,
            "INACTIVE" => Self::Inactive,
            _ => Self::Other(value),
        }
    }
}

impl From<LifecycleStatus> for String {
    fn from(value: LifecycleStatus) -> Self {
        value.as_str().to_string()
    }
}

/// Input-type tag of a field or column.
///
/// `ENTITY` stores an opaque id whose readable value lives under the same key
/// with a `/name` suffix. `ENTITY_TABLE` is a pure container and never becomes
/// a queryable path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InputType {
    Entity,
    EntityTable,
    Scalar(String),
}

impl InputType {
    pub const DEFAULT_SCALAR: &'static str = "string";

    pub fn as_str(&self) -> &str {
        match self {
            Self::Entity => "ENTITY",
            Self::EntityTable => "ENTITY_TABLE",
            Self::Scalar(tag) => tag,
        }
    }

    pub fn is_entity_reference(&self) -> bool {
        matches!(self, Self::Entity)
    }

    pub fn is_entity_table(&self) -> bool {
        matches!(self, Self::EntityTable)
    }
}

impl Default for InputType {
    fn default() -> Self {
        Self::Scalar(Self::DEFAULT_SCALAR.to_string())
    }
}

impl From<String> for InputType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ENTITY" => Self::Entity,
            "ENTITY_TABLE" => Self::EntityTable,
            _ => Self::Scalar(value),
        }
    }
}

impl From<&str> for InputType {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<InputType> for String {
    fn from(value: InputType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default, rename = "inputType")]
    pub input_type: Option<InputType>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default, rename = "inputType")]
    pub input_type: Option<InputType>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub data_table_columns: Vec<Column>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default, deserialize_with = "lenient_vec")]
    pub fields: Vec<Field>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    #[serde(default)]
    pub status: LifecycleStatus,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub sections: Vec<Section>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
    #[serde(default)]
    pub template_id: Option<TemplateId>,
}

/// A named record type owned by one tenant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(default)]
    pub status: LifecycleStatus,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub templates: Vec<TemplateRef>,
}

impl Entity {
    /// Referenced template ids in the entity's own order; refs without an id are skipped.
    pub fn template_ids(&self) -> Vec<TemplateId> {
        self.templates.iter().filter_map(|reference| reference.template_id.clone()).collect()
    }
}

fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Value::Array(items) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items.into_iter().filter_map(|item| serde_json::from_value(item).ok()).collect())
}
