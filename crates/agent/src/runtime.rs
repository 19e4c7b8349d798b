//! The tool-calling loop behind one answer.
//!
//! Each model invocation sees the trimmed thread; the trimmed window is also
//! what gets persisted. The loop ends when the model replies with text or
//! when the iteration limit is hit.

use std::sync::Arc;

use querent_core::domain::message::Message;
use querent_core::domain::tenant::ThreadId;
use querent_db::ThreadRepository;
use tracing::{debug, info};

use crate::conversation::ConversationTrimmer;
use crate::error::AgentError;
use crate::llm::{ModelClient, ModelReply, ModelRequest};
use crate::tools::ToolRegistry;

/// Everything one request contributes to an agent run.
pub struct AgentTurn {
    pub thread_id: ThreadId,
    pub system_instruction: String,
    pub user_message: Message,
    pub tools: ToolRegistry,
}

pub struct AgentRuntime {
    threads: Arc<dyn ThreadRepository>,
    trimmer: ConversationTrimmer,
    max_model_calls: usize,
}

impl AgentRuntime {
    pub fn new(threads: Arc<dyn ThreadRepository>, history_budget: usize, max_model_calls: usize) -> Self {
        let trimmer = ConversationTrimmer::new(Arc::clone(&threads), history_budget);
        Self { threads, trimmer, max_model_calls }
    }

    pub async fn load_history(&self, thread_id: &ThreadId) -> Result<Vec<Message>, AgentError> {
        Ok(self.threads.load(thread_id).await?)
    }

    /// Runs one attempt starting from `history`, the thread as it was before
    /// this request.
    pub async fn run(
        &self,
        client: &dyn ModelClient,
        turn: &AgentTurn,
        history: Vec<Message>,
    ) -> Result<String, AgentError> {
        let specs = turn.tools.specs();
        let mut messages = history;
        messages.push(turn.user_message.clone());

        for call_index in 0..self.max_model_calls {
            messages = self.trimmer.trim_and_persist(&turn.thread_id, &messages).await?;
            let reply = client
                .generate(ModelRequest {
                    system_instruction: &turn.system_instruction,
                    tools: &specs,
                    messages: &messages,
                })
                .await?;

            match reply {
                ModelReply::Answer(answer) => {
                    messages.push(Message::assistant(answer.clone()));
                    self.trimmer.commit(&turn.thread_id, &messages).await?;
                    info!(
                        event_name = "agent.answer.produced",
                        thread_id = %turn.thread_id,
                        model_calls = call_index + 1,
                        "agent produced an answer"
                    );
                    return Ok(answer);
                }
                ModelReply::ToolCalls(calls) => {
                    debug!(
                        event_name = "agent.tool_calls.requested",
                        thread_id = %turn.thread_id,
                        calls = calls.len(),
                        "model requested tool calls"
                    );
                    messages.push(Message::assistant_tool_calls(calls.clone()));
                    for call in &calls {
                        let output = turn.tools.dispatch(call).await;
                        messages.push(Message::tool(call.id.clone(), call.name.clone(), output));
                    }
                }
            }
        }

        Err(AgentError::IterationLimit { limit: self.max_model_calls })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use querent_core::domain::message::{Message, Role, ToolCall};
    use querent_core::domain::tenant::{TenantId, ThreadId};
    use querent_core::schema::{CachedSchema, Vocabulary};
    use querent_db::{InMemoryThreadRepository, ThreadRepository};
    use serde_json::json;

    use super::{AgentRuntime, AgentTurn};
    use crate::error::AgentError;
    use crate::llm::{ModelClient, ModelReply, ModelRequest, ProviderError};
    use crate::tools::testing::RecordingExecutor;
    use crate::tools::ToolsetBuilder;

    /// Replays scripted replies and records how many messages each call saw.
    struct ScriptedClient {
        replies: Mutex<VecDeque<ModelReply>>,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<ModelReply>) -> Self {
            Self { replies: Mutex::new(replies.into()), seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedClient {
        async fn generate(&self, request: ModelRequest<'_>) -> Result<ModelReply, ProviderError> {
            self.seen.lock().expect("lock").push(request.messages.to_vec());
            self.replies
                .lock()
                .expect("lock")
                .pop_front()
                .ok_or_else(|| ProviderError::Rejected("script exhausted".to_string()))
        }
    }

    fn turn(question: &str) -> AgentTurn {
        let tools = ToolsetBuilder::new(Arc::new(RecordingExecutor::default()))
            .build(&TenantId::from("t"), "UTC", Arc::new(CachedSchema::new(Vocabulary::new())));
        AgentTurn {
            thread_id: ThreadId::from("user-1"),
            system_instruction: "system".to_string(),
            user_message: Message::user(question),
            tools,
        }
    }

    fn list_collections_call() -> ModelReply {
        ModelReply::ToolCalls(vec![ToolCall {
            id: "call_0".to_string(),
            name: "mongodb_list_collections".to_string(),
            arguments: json!({}),
        }])
    }

    #[tokio::test]
    async fn tool_results_are_fed_back_until_an_answer_arrives() {
        let threads = Arc::new(InMemoryThreadRepository::default());
        let runtime = AgentRuntime::new(threads.clone(), 25, 5);
        let client =
            ScriptedClient::new(vec![list_collections_call(), ModelReply::Answer("one collection".to_string())]);

        let answer = runtime.run(&client, &turn("what can I query?"), Vec::new()).await.expect("answer");

        assert_eq!(answer, "one collection");
        let seen = client.seen.lock().expect("lock");
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].len(), 3);
        assert_eq!(seen[1][2].role, Role::Tool);
        assert!(seen[1][2].content.contains("entities_data"));

        let stored = threads.load(&ThreadId::from("user-1")).await.expect("load");
        assert_eq!(stored.len(), 4);
        assert_eq!(stored.last(), Some(&Message::assistant("one collection")));
    }

    #[tokio::test]
    async fn model_calls_see_at_most_the_history_budget() {
        let threads = Arc::new(InMemoryThreadRepository::default());
        let runtime = AgentRuntime::new(threads, 4, 10);
        let client = ScriptedClient::new(vec![
            list_collections_call(),
            list_collections_call(),
            list_collections_call(),
            ModelReply::Answer("done".to_string()),
        ]);
        let history = (0..10)
            .flat_map(|index| [Message::user(format!("q{index}")), Message::assistant(format!("a{index}"))])
            .collect();

        runtime.run(&client, &turn("latest"), history).await.expect("answer");

        let seen = client.seen.lock().expect("lock");
        assert!(seen.iter().all(|messages| messages.len() <= 4));
        assert!(seen.iter().all(|messages| messages.first().is_some_and(Message::is_user)));
    }

    #[tokio::test]
    async fn endless_tool_calls_hit_the_iteration_limit() {
        let threads = Arc::new(InMemoryThreadRepository::default());
        let runtime = AgentRuntime::new(threads, 25, 2);
        let client =
            ScriptedClient::new(vec![list_collections_call(), list_collections_call(), list_collections_call()]);

        let result = runtime.run(&client, &turn("loop"), Vec::new()).await;

        assert!(matches!(result, Err(AgentError::IterationLimit { limit: 2 })));
    }

    #[tokio::test]
    async fn provider_failure_propagates() {
        let threads = Arc::new(InMemoryThreadRepository::default());
        let runtime = AgentRuntime::new(threads, 25, 2);
        let client = ScriptedClient::new(Vec::new());

        let result = runtime.run(&client, &turn("hi"), Vec::new()).await;

        assert!(matches!(result, Err(AgentError::Provider(ProviderError::Rejected(_)))));
    }
}
