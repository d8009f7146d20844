//! Input records and the documents built from them

use crate::ids::IdGenerator;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue, json};

/// Which resource to create for an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    /// Unique key within a run
    pub entity_name: String,
    pub resource_type: String,
    #[serde(default)]
    pub profiles: Vec<String>,
}

impl ResourceDefinition {
    pub fn new(entity_name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            resource_type: resource_type.into(),
            profiles: Vec::new(),
        }
    }

    pub fn with_profiles(mut self, profiles: Vec<String>) -> Self {
        self.profiles = profiles;
        self
    }
}

/// Which document path a field fills, with one raw value per subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub entity_name: String,
    /// Data element name, unique within the entity
    #[serde(default)]
    pub field_name: String,
    #[serde(rename = "jsonpath")]
    pub path: String,
    #[serde(default)]
    pub value_type: String,
    #[serde(default)]
    pub value_set: Option<String>,
    #[serde(default)]
    pub values: Vec<JsonValue>,
}

impl FieldMapping {
    pub fn new(
        entity_name: impl Into<String>,
        path: impl Into<String>,
        value_type: impl Into<String>,
    ) -> Self {
        let path = path.into();
        Self {
            entity_name: entity_name.into(),
            field_name: path.clone(),
            path,
            value_type: value_type.into(),
            value_set: None,
            values: Vec::new(),
        }
    }

    pub fn with_values(mut self, values: Vec<JsonValue>) -> Self {
        self.values = values;
        self
    }

    /// Raw value for a subject; `None` when null or past the end of the list
    pub fn value_at(&self, index: usize) -> Option<&JsonValue> {
        self.values.get(index).filter(|value| !value.is_null())
    }
}

/// Declaration that one document's field references another document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLinkSpec {
    pub origin_entity: String,
    pub destination_entity: String,
    /// Always lower case
    #[serde(deserialize_with = "lowercase")]
    pub reference_path: String,
}

impl ResourceLinkSpec {
    pub fn new(
        origin_entity: impl Into<String>,
        destination_entity: impl Into<String>,
        reference_path: impl AsRef<str>,
    ) -> Self {
        Self {
            origin_entity: origin_entity.into(),
            destination_entity: destination_entity.into(),
            reference_path: reference_path.as_ref().trim().to_lowercase(),
        }
    }
}

fn lowercase<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().to_lowercase())
}

/// One resource tree under construction
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDocument {
    pub entity_name: String,
    pub resource_type: String,
    pub id: String,
    pub resource: JsonValue,
}

impl ResourceDocument {
    /// Create the base resource with its identity fields
    ///
    /// The identifier is drawn here, before any field is written, and never
    /// changes afterwards.
    pub fn initialize(definition: &ResourceDefinition, ids: &mut dyn IdGenerator) -> Self {
        let id = ids.next_id();
        let mut root = Map::new();
        root.insert(
            "resourceType".to_string(),
            JsonValue::String(definition.resource_type.clone()),
        );
        root.insert("id".to_string(), JsonValue::String(id.clone()));
        if !definition.profiles.is_empty() {
            root.insert("meta".to_string(), json!({ "profile": definition.profiles }));
        }

        Self {
            entity_name: definition.entity_name.clone(),
            resource_type: definition.resource_type.clone(),
            id,
            resource: JsonValue::Object(root),
        }
    }

    /// Typed reference string (`Patient/<id>`)
    pub fn reference(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }
}
