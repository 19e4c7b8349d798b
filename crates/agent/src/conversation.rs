//! Bounded conversation windows.
//!
//! Before every model invocation the thread is cut down to its newest
//! messages so that it fits the history budget, then written back over the
//! persisted thread. A window always starts on a user message and ends on a
//! user message or a tool result, so the model never sees a dangling
//! assistant turn or an orphaned tool result at the front.

use std::sync::Arc;

use querent_core::domain::message::{Message, Role};
use querent_core::domain::tenant::ThreadId;
use querent_db::{RepositoryError, ThreadRepository};
use tracing::debug;

pub const DEFAULT_HISTORY_BUDGET: usize = 25;

/// Cost of one message against the budget.
pub type MessageCounter = fn(&Message) -> usize;

/// Every message counts as one unit, whatever its length.
pub fn count_one(_message: &Message) -> usize {
    1
}

#[derive(Clone)]
pub struct ConversationTrimmer {
    threads: Arc<dyn ThreadRepository>,
    budget: usize,
    counter: MessageCounter,
}

impl ConversationTrimmer {
    pub fn new(threads: Arc<dyn ThreadRepository>, budget: usize) -> Self {
        Self { threads, budget, counter: count_one }
    }

    pub fn with_counter(mut self, counter: MessageCounter) -> Self {
        self.counter = counter;
        self
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Newest window of `messages` that fits the budget.
    ///
    /// When no window can both fit and start on a user message, the most
    /// recent user message is kept on its own; without any user message the
    /// window is empty.
    pub fn window(&self, messages: &[Message]) -> Vec<Message> {
        let end = messages
            .iter()
            .rposition(|message| matches!(message.role, Role::User | Role::Tool))
            .map_or(0, |index| index + 1);
        let candidates = &messages[..end];

        let mut start = end;
        let mut used = 0;
        for (index, message) in candidates.iter().enumerate().rev() {
            let cost = (self.counter)(message);
            if used + cost > self.budget {
                break;
            }
            used += cost;
            start = index;
        }

        let kept = &candidates[start..];
        match kept.iter().position(Message::is_user) {
            Some(offset) => kept[offset..].to_vec(),
            None => messages.iter().rev().find(|message| message.is_user()).cloned().into_iter().collect(),
        }
    }

    /// Computes the window and overwrites the persisted thread with it.
    ///
    /// The overwrite happens even when nothing was dropped.
    pub async fn trim_and_persist(
        &self,
        thread_id: &ThreadId,
        messages: &[Message],
    ) -> Result<Vec<Message>, RepositoryError> {
        let window = self.window(messages);
        debug!(
            event_name = "conversation.trimmed",
            thread_id = %thread_id,
            before = messages.len(),
            after = window.len(),
            budget = self.budget,
            "conversation window computed"
        );
        self.threads.overwrite(thread_id, &window).await?;
        Ok(window)
    }

    /// Persists a finished turn: the window the model last saw plus its reply.
    pub async fn commit(
        &self,
        thread_id: &ThreadId,
        messages: &[Message],
    ) -> Result<(), RepositoryError> {
        self.threads.overwrite(thread_id, messages).await
    }
}
