use async_trait::async_trait;
use thiserror::Error;

use querent_core::domain::message::Message;
use querent_core::domain::template::{Entity, Template, TemplateId};
use querent_core::domain::tenant::{TenantId, ThreadId};

pub mod memory;
pub mod schema;
pub mod thread;

pub use memory::{InMemorySchemaRepository, InMemoryThreadRepository};
pub use schema::SqlSchemaRepository;
pub use thread::SqlThreadRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Read-only access to a tenant's entity and template documents.
#[async_trait]
pub trait SchemaRepository: Send + Sync {
    /// `ACTIVE` entities of the tenant, in storage order.
    async fn active_entities(&self, tenant_id: &TenantId) -> Result<Vec<Entity>, RepositoryError>;

    /// `ACTIVE` templates whose id is in `template_ids`.
    async fn active_templates(
        &self,
        template_ids: &[TemplateId],
    ) -> Result<Vec<Template>, RepositoryError>;
}

/// Persisted message history per conversation thread.
#[async_trait]
pub trait ThreadRepository: Send + Sync {
    async fn load(&self, thread_id: &ThreadId) -> Result<Vec<Message>, RepositoryError>;

    /// Replaces the entire stored history of `thread_id` with `messages`.
    async fn overwrite(
        &self,
        thread_id: &ThreadId,
        messages: &[Message],
    ) -> Result<(), RepositoryError>;
}
