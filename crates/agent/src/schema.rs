use std::sync::Arc;

use querent_core::domain::tenant::TenantId;
use querent_core::schema::{CachedSchema, SchemaCache};
use querent_db::{load_vocabulary, RepositoryError, SchemaRepository};

/// Tenant vocabularies, built from the schema store on first use and cached
/// for the life of the process.
pub struct TenantSchemaProvider {
    repository: Arc<dyn SchemaRepository>,
    cache: SchemaCache,
}

impl TenantSchemaProvider {
    pub fn new(repository: Arc<dyn SchemaRepository>) -> Self {
        Self { repository, cache: SchemaCache::new() }
    }

    pub async fn schema_for(&self, tenant_id: &TenantId) -> Result<Arc<CachedSchema>, RepositoryError> {
        self.cache
            .get_or_build(tenant_id, || load_vocabulary(self.repository.as_ref(), tenant_id))
            .await
    }

    pub fn cached_tenants(&self) -> usize {
        self.cache.len()
    }
}
