//! Request-level control flow for answering one question.
//!
//! ```text
//! SCHEMA_READY -> INVOKING -> SUCCESS
//!                    |  ^
//!       quota or     v  | retries < pool size
//!       transient  RETRYING
//!                    |
//!                    v
//!                  FAILED
//! ```
//!
//! Quota and transient provider failures rotate the shared credential cursor
//! and retry, at most once per credential. User-facing failures pass through
//! untouched; anything else means no answer could be derived.

use std::sync::Arc;

use querent_core::domain::message::Message;
use querent_core::domain::tenant::{TenantId, ThreadId};
use querent_core::errors::AskError;
use querent_core::schema::CachedSchema;
use tracing::{error, info, warn};

use crate::credentials::CredentialPool;
use crate::error::AgentError;
use crate::prompt::PromptRenderer;
use crate::runtime::{AgentRuntime, AgentTurn};
use crate::schema::TenantSchemaProvider;
use crate::tools::ToolsetBuilder;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AskRequest {
    pub tenant_id: TenantId,
    pub question: String,
    pub timezone: String,
    pub thread_id: ThreadId,
}

/// What the orchestrator does with a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureDisposition {
    Rotate,
    PassThrough,
    Terminal,
}

pub fn classify(error: &AgentError) -> FailureDisposition {
    match error {
        error if error.is_retryable() => FailureDisposition::Rotate,
        AgentError::UserFacing { .. } => FailureDisposition::PassThrough,
        _ => FailureDisposition::Terminal,
    }
}

pub struct CallOrchestrator {
    schemas: TenantSchemaProvider,
    credentials: Arc<CredentialPool>,
    runtime: AgentRuntime,
    toolsets: ToolsetBuilder,
    prompts: PromptRenderer,
    collection: String,
}

impl CallOrchestrator {
    pub fn new(
        schemas: TenantSchemaProvider,
        credentials: Arc<CredentialPool>,
        runtime: AgentRuntime,
        toolsets: ToolsetBuilder,
        prompts: PromptRenderer,
        collection: impl Into<String>,
    ) -> Self {
        Self { schemas, credentials, runtime, toolsets, prompts, collection: collection.into() }
    }

    pub fn credentials(&self) -> &CredentialPool {
        &self.credentials
    }

    /// Collection the agent is told to query.
    pub fn query_collection(&self) -> &str {
        &self.collection
    }

    /// Collections the query backend can reach.
    pub fn reachable_collections(&self) -> Vec<String> {
        self.toolsets.collections()
    }

    pub fn cached_schemas(&self) -> usize {
        self.schemas.cached_tenants()
    }

    pub async fn ask(&self, request: &AskRequest) -> Result<String, AskError> {
        let no_answer = |cause: String| AskError::NoAnswerDerivable { question: request.question.clone(), cause };

        let schema = self.schemas.schema_for(&request.tenant_id).await.map_err(|error| {
            error!(
                event_name = "ask.schema.failed",
                tenant_id = %request.tenant_id,
                error = %error,
                "could not build tenant schema"
            );
            no_answer(error.to_string())
        })?;

        let turn = self.prepare_turn(request, schema).map_err(|error| self.settle(request, error))?;
        let history = self
            .runtime
            .load_history(&request.thread_id)
            .await
            .map_err(|error| self.settle(request, error))?;

        let max_attempts = self.credentials.len();
        let mut credential = self.credentials.current();
        let mut retries = 0;
        loop {
            info!(
                event_name = "ask.invoking",
                tenant_id = %request.tenant_id,
                thread_id = %request.thread_id,
                attempt = retries + 1,
                key = %credential.masked(),
                "invoking agent"
            );
            let outcome = match self.credentials.client_for(&credential) {
                Ok(client) => self.runtime.run(client.as_ref(), &turn, history.clone()).await,
                Err(error) => Err(AgentError::Provider(error)),
            };

            let error = match outcome {
                Ok(answer) => return Ok(answer),
                Err(error) => error,
            };
            if classify(&error) != FailureDisposition::Rotate {
                return Err(self.settle(request, error));
            }

            credential = self.credentials.advance();
            retries += 1;
            if retries >= max_attempts {
                error!(
                    event_name = "ask.credentials.exhausted",
                    tenant_id = %request.tenant_id,
                    attempts = retries,
                    error = %error,
                    "every provider credential failed"
                );
                return Err(AskError::AllCredentialsExhausted { attempts: retries });
            }
            warn!(
                event_name = "ask.retrying",
                tenant_id = %request.tenant_id,
                retries,
                error = %error,
                "provider failure, retrying with next credential"
            );
        }
    }

    fn prepare_turn(
        &self,
        request: &AskRequest,
        schema: Arc<CachedSchema>,
    ) -> Result<AgentTurn, AgentError> {
        let tools = self.toolsets.build(&request.tenant_id, &request.timezone, schema);
        let system_instruction =
            self.prompts.system_instruction(&request.tenant_id, &request.timezone, &self.collection)?;
        let question = self.prompts.user_question(&request.tenant_id, &request.question)?;
        Ok(AgentTurn {
            thread_id: request.thread_id.clone(),
            system_instruction,
            user_message: Message::user(question),
            tools,
        })
    }

    /// Maps a non-retryable attempt failure to the caller-facing error.
    fn settle(&self, request: &AskRequest, error: AgentError) -> AskError {
        match error {
            AgentError::UserFacing { status, message } => AskError::UserFacing { status, message },
            other => {
                error!(
                    event_name = "ask.failed",
                    tenant_id = %request.tenant_id,
                    error = %other,
                    "no answer derivable"
                );
                AskError::NoAnswerDerivable { question: request.question.clone(), cause: other.to_string() }
            }
        }
    }
}
