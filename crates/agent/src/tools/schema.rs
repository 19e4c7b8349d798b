use std::sync::Arc;

use async_trait::async_trait;
use querent_core::schema::CachedSchema;
use serde_json::{json, Map, Value};

use super::query::PipelineExecutor;
use super::{Tool, ToolError};

/// `mongodb_list_collections`
pub struct ListCollectionsTool {
    executor: Arc<dyn PipelineExecutor>,
}

impl ListCollectionsTool {
    pub fn new(executor: Arc<dyn PipelineExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Tool for ListCollectionsTool {
    fn name(&self) -> &'static str {
        "mongodb_list_collections"
    }

    fn description(&self) -> &'static str {
        "Lists the collections that can be queried. Call this first."
    }

    async fn execute(&self, _input: Value) -> Result<Value, ToolError> {
        Ok(json!({ "collections": self.executor.collections() }))
    }
}

/// `mongodb_schema`: the tenant's flattened field paths, grouped by entity.
pub struct SchemaTool {
    executor: Arc<dyn PipelineExecutor>,
    schema: Arc<CachedSchema>,
}

impl SchemaTool {
    pub fn new(executor: Arc<dyn PipelineExecutor>, schema: Arc<CachedSchema>) -> Self {
        Self { executor, schema }
    }
}

#[async_trait]
impl Tool for SchemaTool {
    fn name(&self) -> &'static str {
        "mongodb_schema"
    }

    fn description(&self) -> &'static str {
        "Returns the field paths and data types of each entity stored in the collection. \
         Paths look like templates_fields_data.<template-id>#<field>: <type>. Optionally \
         pass entity names to narrow the result."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "collection_name": {
                    "type": "string",
                    "description": "Collection to describe; defaults to the only collection."
                },
                "entity_names": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Entities to include; all entities when omitted."
                }
            }
        }))
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let collections = self.executor.collections();
        let collection = match input.get("collection_name").and_then(Value::as_str) {
            Some(requested) if !collections.iter().any(|known| known == requested) => {
                return Err(ToolError::InvalidArguments(format!(
                    "unknown collection `{requested}`; available: {}",
                    collections.join(", ")
                )));
            }
            Some(requested) => requested.to_string(),
            None => collections.into_iter().next().unwrap_or_default(),
        };

        let wanted: Vec<&str> = input
            .get("entity_names")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut entities = Map::new();
        for (name, paths) in self.schema.vocabulary.iter() {
            if wanted.is_empty() || wanted.iter().any(|candidate| candidate.eq_ignore_ascii_case(name)) {
                entities.insert(name.to_string(), json!(paths));
            }
        }
        if !wanted.is_empty() && entities.is_empty() {
            let known: Vec<&str> = self.schema.vocabulary.entity_names().collect();
            return Err(ToolError::InvalidArguments(format!(
                "no entity matches {wanted:?}; known entities: {}",
                known.join(", ")
            )));
        }

        Ok(json!({ "collection": collection, "entities": entities }))
    }
}
