//! Tools the agent may call while answering a question.
//!
//! A fresh [`ToolRegistry`] is assembled per request by [`ToolsetBuilder`],
//! because several tools are bound to the request's tenant, timezone and
//! schema.

pub mod pipeline;
pub mod query;
pub mod schema;
pub mod time;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use querent_core::domain::message::ToolCall;
use querent_core::domain::tenant::TenantId;
use querent_core::schema::CachedSchema;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::llm::ToolSpec;

pub use query::{DataApiExecutor, PipelineExecutor, QueryCheckerTool, QueryTool};
pub use schema::{ListCollectionsTool, SchemaTool};
pub use time::{ConvertDateToUtcTool, CurrentDateTimeTool};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Execution(String),
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    /// JSON schema of the arguments; `None` for tools that take none.
    fn parameters(&self) -> Option<Value> {
        None
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name(), Box::new(tool));
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }

    /// Runs the requested tool and renders its outcome as JSON text.
    ///
    /// Failures become an `{"error": ...}` payload so the model can react.
    pub async fn dispatch(&self, call: &ToolCall) -> String {
        let Some(tool) = self.tools.get(call.name.as_str()) else {
            warn!(event_name = "agent.tool.unknown", tool = %call.name, "model requested unknown tool");
            return json!({ "error": format!("unknown tool `{}`", call.name) }).to_string();
        };

        let started = Instant::now();
        let outcome = tool.execute(call.arguments.clone()).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(value) => {
                info!(event_name = "agent.tool.executed", tool = %call.name, elapsed_ms, "tool call succeeded");
                value.to_string()
            }
            Err(error) => {
                warn!(
                    event_name = "agent.tool.failed",
                    tool = %call.name,
                    elapsed_ms,
                    error = %error,
                    "tool call failed"
                );
                json!({ "error": error.to_string() }).to_string()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Assembles the per-request toolset around one shared query backend.
#[derive(Clone)]
pub struct ToolsetBuilder {
    executor: Arc<dyn PipelineExecutor>,
}

impl ToolsetBuilder {
    pub fn new(executor: Arc<dyn PipelineExecutor>) -> Self {
        Self { executor }
    }

    pub fn collections(&self) -> Vec<String> {
        self.executor.collections()
    }

    pub fn build(&self, tenant_id: &TenantId, timezone: &str, schema: Arc<CachedSchema>) -> ToolRegistry {
        let mut registry = ToolRegistry::default();
        registry.register(ListCollectionsTool::new(Arc::clone(&self.executor)));
        registry.register(SchemaTool::new(Arc::clone(&self.executor), schema));
        registry.register(QueryCheckerTool::new(tenant_id.clone()));
        registry.register(QueryTool::new(Arc::clone(&self.executor), tenant_id.clone()));
        registry.register(CurrentDateTimeTool::new(timezone));
        registry.register(ConvertDateToUtcTool::new(timezone));
        registry
    }
}
