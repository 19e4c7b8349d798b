use querent_core::domain::tenant::TenantId;
use querent_db::{load_vocabulary, SqlSchemaRepository};

use crate::commands::{migrated_pool, prepare, CommandResult};

/// Prints the tenant vocabulary exactly as the `mongodb_schema` tool sees it.
pub fn run(tenant: &str) -> CommandResult {
    let tenant = tenant.trim();
    if tenant.is_empty() {
        return CommandResult::failure("schema", "invalid_argument", "--tenant must not be empty", 2);
    }

    let (config, runtime) = match prepare("schema") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let tenant_id = TenantId::from(tenant);
    let result = runtime.block_on(async {
        let pool = migrated_pool(&config).await?;
        let repository = SqlSchemaRepository::new(pool.clone());
        let vocabulary = load_vocabulary(&repository, &tenant_id)
            .await
            .map_err(|error| ("schema_store", error.to_string(), 6u8));
        pool.close().await;
        vocabulary
    });

    match result {
        Ok(vocabulary) if vocabulary.is_empty() => CommandResult::failure(
            "schema",
            "empty_vocabulary",
            format!("tenant `{tenant_id}` has no active entities with templates"),
            7,
        ),
        Ok(vocabulary) => CommandResult { exit_code: 0, output: vocabulary.to_pretty_json() },
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("schema", error_class, message, exit_code)
        }
    }
}
