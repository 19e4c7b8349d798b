use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use querent_core::config::QueryConfig;
use querent_core::domain::tenant::TenantId;
use querent_core::errors::ApplicationError;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::pipeline::{check_pipeline, mentions_tenant, pipeline_from_arguments, scope_to_tenant};
use super::{Tool, ToolError};

/// Read-only access to the document store's aggregation endpoint.
#[async_trait]
pub trait PipelineExecutor: Send + Sync {
    fn collections(&self) -> Vec<String>;

    async fn aggregate(&self, collection: &str, pipeline: &[Value]) -> Result<Vec<Value>, ToolError>;
}

/// Runs pipelines through a MongoDB-compatible HTTP Data API
/// (`POST {endpoint}/action/aggregate`).
#[derive(Clone, Debug)]
pub struct DataApiExecutor {
    http: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    data_source: String,
    database: String,
    collection: String,
    max_documents: usize,
}

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    documents: Vec<Value>,
}

impl DataApiExecutor {
    pub fn from_config(config: &QueryConfig) -> Result<Self, ApplicationError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .map(|endpoint| endpoint.trim_end_matches('/').to_string())
            .filter(|endpoint| !endpoint.is_empty())
            .ok_or_else(|| {
                ApplicationError::Configuration("query.endpoint must be set to run queries".to_string())
            })?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| ApplicationError::Integration(error.to_string()))?;

        Ok(Self {
            http,
            endpoint,
            api_key: config.api_key.clone(),
            data_source: config.data_source.clone(),
            database: config.database.clone(),
            collection: config.collection.clone(),
            max_documents: config.max_documents as usize,
        })
    }
}

#[async_trait]
impl PipelineExecutor for DataApiExecutor {
    fn collections(&self) -> Vec<String> {
        vec![self.collection.clone()]
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Value]) -> Result<Vec<Value>, ToolError> {
        let mut request = self.http.post(format!("{}/action/aggregate", self.endpoint)).json(&json!({
            "dataSource": self.data_source,
            "database": self.database,
            "collection": collection,
            "pipeline": pipeline,
        }));
        if let Some(api_key) = &self.api_key {
            request = request.header("api-key", api_key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| ToolError::Execution(format!("query backend unreachable: {error}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Execution(format!(
                "query failed with status {}: {}",
                status.as_u16(),
                body.chars().take(500).collect::<String>()
            )));
        }

        let mut parsed: AggregateResponse = response
            .json()
            .await
            .map_err(|error| ToolError::Execution(format!("malformed query response: {error}")))?;
        debug!(
            event_name = "query.aggregate.completed",
            collection,
            stages = pipeline.len(),
            documents = parsed.documents.len(),
            "aggregation finished"
        );
        parsed.documents.truncate(self.max_documents);
        Ok(parsed.documents)
    }
}

fn query_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "Aggregation in strict JSON, e.g. db.entities_data.aggregate([{\"$match\": {...}}]). ObjectId(\"...\") and ISODate(\"...\") are accepted."
            }
        },
        "required": ["query"]
    })
}

/// `mongodb_query_checker`: structural check of a pipeline before running it.
pub struct QueryCheckerTool {
    tenant_id: TenantId,
}

impl QueryCheckerTool {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }
}

#[async_trait]
impl Tool for QueryCheckerTool {
    fn name(&self) -> &'static str {
        "mongodb_query_checker"
    }

    fn description(&self) -> &'static str {
        "Checks an aggregation pipeline for syntax and structural mistakes. Use it before mongodb_query."
    }

    fn parameters(&self) -> Option<Value> {
        Some(query_parameters())
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let checked = pipeline_from_arguments(&input).and_then(|pipeline| check_pipeline(&pipeline));
        Ok(match checked {
            Ok(stages) => {
                let mut notes = Vec::new();
                if !mentions_tenant(&stages, &self.tenant_id) {
                    notes.push(format!(
                        "no $match on company {}; the tenant filter will be added when the query runs",
                        self.tenant_id
                    ));
                }
                json!({ "valid": true, "stages": stages.len(), "pipeline": stages, "notes": notes })
            }
            Err(error) => json!({ "valid": false, "problems": error.to_string() }),
        })
    }
}

/// `mongodb_query`: runs a pipeline, always scoped to the request's tenant.
pub struct QueryTool {
    executor: Arc<dyn PipelineExecutor>,
    tenant_id: TenantId,
}

impl QueryTool {
    pub fn new(executor: Arc<dyn PipelineExecutor>, tenant_id: TenantId) -> Self {
        Self { executor, tenant_id }
    }
}

#[async_trait]
impl Tool for QueryTool {
    fn name(&self) -> &'static str {
        "mongodb_query"
    }

    fn description(&self) -> &'static str {
        "Executes a read-only aggregation pipeline against the entities collection and returns the resulting documents."
    }

    fn parameters(&self) -> Option<Value> {
        Some(query_parameters())
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let pipeline = pipeline_from_arguments(&input).map_err(|error| ToolError::InvalidArguments(error.to_string()))?;
        let stages = check_pipeline(&pipeline).map_err(|error| ToolError::InvalidArguments(error.to_string()))?;
        let collection = self
            .executor
            .collections()
            .into_iter()
            .next()
            .ok_or_else(|| ToolError::Execution("no collection is configured".to_string()))?;

        let scoped = scope_to_tenant(stages, &self.tenant_id);
        let documents = self.executor.aggregate(&collection, &scoped).await?;
        Ok(json!({ "count": documents.len(), "documents": documents }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use querent_core::config::{AppConfig, QueryConfig};
    use querent_core::domain::tenant::TenantId;
    use serde_json::json;

    use super::{DataApiExecutor, QueryCheckerTool, QueryTool};
    use crate::tools::testing::RecordingExecutor;
    use crate::tools::{Tool, ToolError};

    const TENANT: &str = "683c317abb9177f8bc5896fe";

    #[tokio::test]
    async fn query_is_scoped_to_the_tenant_before_execution() {
        let executor = Arc::new(RecordingExecutor { documents: vec![json!({"total": 3})], ..Default::default() });
        let tool = QueryTool::new(executor.clone(), TenantId::from(TENANT));

        let output = tool
            .execute(json!({"query": "db.entities_data.aggregate([{\"$count\": \"total\"}])"}))
            .await
            .expect("query");

        assert_eq!(output, json!({"count": 1, "documents": [{"total": 3}]}));
        let seen = executor.seen.lock().expect("lock");
        let (collection, pipeline) = &seen[0];
        assert_eq!(collection, "entities_data");
        assert_eq!(pipeline.len(), 2);
        assert_eq!(pipeline[0]["$match"]["company"]["$oid"], TENANT);
        assert_eq!(pipeline[1], json!({"$count": "total"}));
    }

    #[tokio::test]
    async fn union_with_reaches_the_backend_scoped_to_the_tenant() {
        let executor = Arc::new(RecordingExecutor::default());
        let tool = QueryTool::new(executor.clone(), TenantId::from(TENANT));

        tool.execute(json!({"pipeline": [{"$unionWith": {"coll": "entities_data", "pipeline": [{"$match": {}}]}}]}))
            .await
            .expect("query");

        let seen = executor.seen.lock().expect("lock");
        let union = &seen[0].1[1]["$unionWith"];
        assert_eq!(union["pipeline"][0]["$match"]["company"]["$oid"], TENANT);
        assert_eq!(union["pipeline"][1], json!({"$match": {}}));
    }

    #[tokio::test]
    async fn write_pipelines_never_reach_the_backend() {
        let executor = Arc::new(RecordingExecutor::default());
        let tool = QueryTool::new(executor.clone(), TenantId::from(TENANT));

        let result = tool.execute(json!({"pipeline": [{"$merge": {"into": "other"}}]})).await;

        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
        assert!(executor.seen.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn checker_notes_missing_tenant_filter() {
        let tool = QueryCheckerTool::new(TenantId::from(TENANT));

        let output = tool.execute(json!({"pipeline": [{"$limit": 5}]})).await.expect("check");

        assert_eq!(output["valid"], true);
        assert_eq!(output["notes"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn checker_reports_syntax_errors() {
        let tool = QueryCheckerTool::new(TenantId::from(TENANT));

        let output = tool.execute(json!({"query": "db.entities_data.aggregate([{$match: {}}])"})).await.expect("check");

        assert_eq!(output["valid"], false);
        assert!(output["problems"].as_str().is_some_and(|problems| problems.contains("not valid JSON")));
    }

    #[test]
    fn data_api_executor_requires_an_endpoint() {
        let config = AppConfig::default().query;

        assert!(DataApiExecutor::from_config(&config).is_err());

        let configured =
            QueryConfig { endpoint: Some("https://data.example.test/v1/".to_string()), ..config };
        let executor = DataApiExecutor::from_config(&configured).expect("executor");
        assert_eq!(executor.endpoint, "https://data.example.test/v1");
    }
}
