//! Process-wide memo of tenant vocabularies.
//!
//! Entries are built once per tenant and live until the process exits; there
//! is no eviction. Concurrent first access for the same tenant may run the
//! builder more than once, and the last finished build is what stays cached.
//! Different tenants never contend beyond the short map lock.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::domain::tenant::TenantId;
use crate::schema::vocabulary::Vocabulary;

/// A built tenant vocabulary, shared read-only by every request of the tenant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedSchema {
    pub vocabulary: Vocabulary,
}

impl CachedSchema {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self { vocabulary }
    }
}

#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: RwLock<HashMap<TenantId, Arc<CachedSchema>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: &TenantId) -> Option<Arc<CachedSchema>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(tenant_id).cloned()
    }

    /// Returns the cached schema for `tenant_id`, running `build` on a miss.
    ///
    /// A failed build caches nothing, so the next request retries it.
    pub async fn get_or_build<F, Fut, E>(
        &self,
        tenant_id: &TenantId,
        build: F,
    ) -> Result<Arc<CachedSchema>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vocabulary, E>>,
    {
        if let Some(cached) = self.get(tenant_id) {
            debug!(
                event_name = "schema.cache.hit",
                tenant_id = %tenant_id,
                "serving cached tenant schema"
            );
            return Ok(cached);
        }

        let vocabulary = build().await?;
        let schema = Arc::new(CachedSchema::new(vocabulary));
        info!(
            event_name = "schema.cache.built",
            tenant_id = %tenant_id,
            entities = schema.vocabulary.len(),
            paths = schema.vocabulary.path_count(),
            "tenant schema built and cached"
        );

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(tenant_id.clone(), Arc::clone(&schema));
        Ok(schema)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
