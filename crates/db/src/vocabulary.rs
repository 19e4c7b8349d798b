use querent_core::domain::tenant::TenantId;
use querent_core::schema::{flatten, EntityTemplateIndex, Vocabulary};

use crate::repositories::{RepositoryError, SchemaRepository};

/// Queries the tenant's active entities, then the active templates they
/// reference, and flattens both into the tenant vocabulary.
pub async fn load_vocabulary(
    repository: &dyn SchemaRepository,
    tenant_id: &TenantId,
) -> Result<Vocabulary, RepositoryError> {
    let entities = repository.active_entities(tenant_id).await?;
    let index = EntityTemplateIndex::build(&entities);
    if index.is_empty() {
        return Ok(Vocabulary::new());
    }

    let templates = repository.active_templates(&index.referenced_template_ids()).await?;
    Ok(flatten(&entities, &templates))
}
