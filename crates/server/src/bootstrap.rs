use std::sync::Arc;

use querent_agent::credentials::{ClientFactory, CredentialPool};
use querent_agent::llm::{GeminiClientFactory, GeminiSettings};
use querent_agent::orchestrator::CallOrchestrator;
use querent_agent::prompt::PromptRenderer;
use querent_agent::runtime::AgentRuntime;
use querent_agent::schema::TenantSchemaProvider;
use querent_agent::tools::{DataApiExecutor, PipelineExecutor, ToolsetBuilder};
use querent_agent::AgentError;
use querent_core::config::{AppConfig, ConfigError, LoadOptions};
use querent_core::errors::ApplicationError;
use querent_db::{connect_with_settings, migrations, DbPool, SqlSchemaRepository, SqlThreadRepository};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub orchestrator: Arc<CallOrchestrator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Application(#[from] ApplicationError),
    #[error("agent setup failed: {0}")]
    Agent(#[from] AgentError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let executor: Arc<dyn PipelineExecutor> = Arc::new(DataApiExecutor::from_config(&config.query)?);
    let factory: Arc<dyn ClientFactory> =
        Arc::new(GeminiClientFactory::new(GeminiSettings::from_config(&config.provider)));
    let orchestrator = assemble(&config, db_pool.clone(), executor, factory)?;
    info!(
        event_name = "system.bootstrap.ready",
        credentials = orchestrator.credentials().len(),
        model = %config.provider.model,
        "question answering pipeline assembled"
    );

    Ok(Application { config, db_pool, orchestrator: Arc::new(orchestrator) })
}

/// Wires the orchestrator from its parts; the query backend and model
/// client factory are injectable.
pub fn assemble(
    config: &AppConfig,
    db_pool: DbPool,
    executor: Arc<dyn PipelineExecutor>,
    factory: Arc<dyn ClientFactory>,
) -> Result<CallOrchestrator, BootstrapError> {
    let credentials = Arc::new(CredentialPool::new(config.provider.api_keys.clone(), factory)?);
    let schemas = TenantSchemaProvider::new(Arc::new(SqlSchemaRepository::new(db_pool.clone())));
    let runtime = AgentRuntime::new(
        Arc::new(SqlThreadRepository::new(db_pool)),
        config.agent.history_budget,
        config.agent.max_tool_iterations,
    );

    Ok(CallOrchestrator::new(
        schemas,
        credentials,
        runtime,
        ToolsetBuilder::new(executor),
        PromptRenderer::new()?,
        config.query.collection.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use querent_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn overrides(database_url: &str) -> ConfigOverrides {
        ConfigOverrides {
            database_url: Some(database_url.to_string()),
            provider_api_keys: Some(vec!["key-a".to_string(), "key-b".to_string()]),
            query_endpoint: Some("https://data.example.test/app/v1".to_string()),
            ..ConfigOverrides::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_provider_keys() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                provider_api_keys: Some(Vec::new()),
                ..overrides("sqlite::memory:")
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("provider.api_keys"));
    }

    #[tokio::test]
    async fn bootstrap_requires_a_query_endpoint() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides { query_endpoint: None, ..overrides("sqlite::memory:") },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("query.endpoint"));
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_assembles_the_pipeline() {
        let app = bootstrap(LoadOptions {
            overrides: overrides("sqlite::memory:?cache=shared"),
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('entity', 'template', 'conversation_message')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema tables should exist after bootstrap");
        assert_eq!(table_count, 3);
        assert_eq!(app.orchestrator.credentials().len(), 2);

        app.db_pool.close().await;
    }
}
