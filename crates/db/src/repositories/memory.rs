use std::collections::HashMap;

use tokio::sync::RwLock;

use querent_core::domain::message::Message;
use querent_core::domain::template::{Entity, Template, TemplateId};
use querent_core::domain::tenant::{TenantId, ThreadId};

use super::{RepositoryError, SchemaRepository, ThreadRepository};

#[derive(Default)]
pub struct InMemorySchemaRepository {
    entities: RwLock<HashMap<TenantId, Vec<Entity>>>,
    templates: RwLock<Vec<Template>>,
}

impl InMemorySchemaRepository {
    pub async fn add_entity(&self, tenant_id: &TenantId, entity: Entity) {
        let mut entities = self.entities.write().await;
        entities.entry(tenant_id.clone()).or_default().push(entity);
    }

    pub async fn add_template(&self, template: Template) {
        let mut templates = self.templates.write().await;
        templates.retain(|existing| existing.id != template.id);
        templates.push(template);
    }
}

#[async_trait::async_trait]
impl SchemaRepository for InMemorySchemaRepository {
    async fn active_entities(&self, tenant_id: &TenantId) -> Result<Vec<Entity>, RepositoryError> {
        let entities = self.entities.read().await;
        Ok(entities
            .get(tenant_id)
            .map(|list| list.iter().filter(|entity| entity.status.is_active()).cloned().collect())
            .unwrap_or_default())
    }

    async fn active_templates(
        &self,
        template_ids: &[TemplateId],
    ) -> Result<Vec<Template>, RepositoryError> {
        let templates = self.templates.read().await;
        Ok(templates
            .iter()
            .filter(|template| template.status.is_active() && template_ids.contains(&template.id))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryThreadRepository {
    threads: RwLock<HashMap<ThreadId, Vec<Message>>>,
}

#[async_trait::async_trait]
impl ThreadRepository for InMemoryThreadRepository {
    async fn load(&self, thread_id: &ThreadId) -> Result<Vec<Message>, RepositoryError> {
        let threads = self.threads.read().await;
        Ok(threads.get(thread_id).cloned().unwrap_or_default())
    }

    async fn overwrite(
        &self,
        thread_id: &ThreadId,
        messages: &[Message],
    ) -> Result<(), RepositoryError> {
        let mut threads = self.threads.write().await;
        threads.insert(thread_id.clone(), messages.to_vec());
        Ok(())
    }
}
