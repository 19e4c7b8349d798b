use std::fs;
use std::path::Path;

use anyhow::Context;
use querent_core::domain::template::{Entity, Template};
use querent_core::domain::tenant::TenantId;
use querent_db::SqlSchemaRepository;
use serde::Deserialize;

use crate::commands::{migrated_pool, prepare, CommandResult};

/// Schema documents of one tenant as exported from the document store.
#[derive(Debug, Deserialize)]
pub struct SchemaFixture {
    #[serde(default)]
    pub entities: Vec<EntityDocument>,
    #[serde(default)]
    pub templates: Vec<Template>,
}

#[derive(Debug, Deserialize)]
pub struct EntityDocument {
    pub id: String,
    #[serde(flatten)]
    pub entity: Entity,
}

pub fn read_fixture(path: &Path) -> anyhow::Result<SchemaFixture> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read `{}`", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("`{}` is not a schema fixture", path.display()))
}

pub fn run(tenant: &str, path: &Path) -> CommandResult {
    let tenant = tenant.trim();
    if tenant.is_empty() {
        return CommandResult::failure("import", "invalid_argument", "--tenant must not be empty", 2);
    }

    let fixture = match read_fixture(path) {
        Ok(fixture) => fixture,
        Err(error) => return CommandResult::failure("import", "fixture", format!("{error:#}"), 2),
    };

    let (config, runtime) = match prepare("import") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let tenant_id = TenantId::from(tenant);
    let result = runtime.block_on(async {
        let pool = migrated_pool(&config).await?;
        let repository = SqlSchemaRepository::new(pool.clone());
        let stored = store(&repository, &tenant_id, &fixture)
            .await
            .map_err(|error| ("schema_store", error.to_string(), 6u8));
        pool.close().await;
        stored
    });

    match result {
        Ok(()) => CommandResult::success(
            "import",
            format!(
                "imported {} entities and {} templates for tenant `{tenant_id}`",
                fixture.entities.len(),
                fixture.templates.len()
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("import", error_class, message, exit_code)
        }
    }
}

async fn store(
    repository: &SqlSchemaRepository,
    tenant_id: &TenantId,
    fixture: &SchemaFixture,
) -> Result<(), querent_db::RepositoryError> {
    for template in &fixture.templates {
        repository.upsert_template(tenant_id, template).await?;
    }
    for document in &fixture.entities {
        repository.upsert_entity(tenant_id, &document.id, &document.entity).await?;
    }
    Ok(())
}
