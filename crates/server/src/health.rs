//! `GET /health`: whether this instance can answer questions right now.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use querent_agent::orchestrator::CallOrchestrator;
use querent_db::DbPool;
use serde::Serialize;
use tracing::warn;

const READY: &str = "ready";
const DEGRADED: &str = "degraded";

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    orchestrator: Arc<CallOrchestrator>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ComponentCheck {
    pub status: &'static str,
    pub detail: String,
}

impl ComponentCheck {
    fn ready(detail: String) -> Self {
        Self { status: READY, detail }
    }

    fn degraded(detail: String) -> Self {
        Self { status: DEGRADED, detail }
    }

    fn is_ready(&self) -> bool {
        self.status == READY
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub schema_store: ComponentCheck,
    pub query_backend: ComponentCheck,
    pub provider: ComponentCheck,
    pub cached_schemas: usize,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, orchestrator: Arc<CallOrchestrator>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, orchestrator })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let orchestrator = &state.orchestrator;
    let schema_store = schema_store_check(&state.db_pool).await;
    let query_backend =
        query_backend_check(orchestrator.query_collection(), &orchestrator.reachable_collections());
    let credentials = orchestrator.credentials();
    let provider = provider_check(credentials.len(), credentials.current().slot());

    let ready = [&schema_store, &query_backend, &provider].iter().all(|check| check.is_ready());
    let payload = HealthResponse {
        status: if ready { READY } else { DEGRADED },
        schema_store,
        query_backend,
        provider,
        cached_schemas: orchestrator.cached_schemas(),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

/// The schema tables exist and answer; reports how many tenants have active entities.
async fn schema_store_check(pool: &DbPool) -> ComponentCheck {
    let tenants = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(DISTINCT tenant_id) FROM entity WHERE status = 'ACTIVE'",
    )
    .fetch_one(pool)
    .await;
    match tenants {
        Ok(count) => ComponentCheck::ready(format!("{count} tenant(s) with active entities")),
        Err(error) => {
            warn!(
                event_name = "system.health.schema_store_degraded",
                error = %error,
                "schema store check failed"
            );
            ComponentCheck::degraded(format!("schema store query failed: {error}"))
        }
    }
}

fn query_backend_check(collection: &str, reachable: &[String]) -> ComponentCheck {
    if reachable.iter().any(|name| name == collection) {
        ComponentCheck::ready(format!("collection `{collection}` is reachable"))
    } else {
        warn!(
            event_name = "system.health.query_backend_degraded",
            collection,
            reachable = ?reachable,
            "configured collection is not served by the query backend"
        );
        ComponentCheck::degraded(format!("collection `{collection}` is not served by the query backend"))
    }
}

fn provider_check(credentials: usize, current_slot: usize) -> ComponentCheck {
    if credentials == 0 {
        return ComponentCheck::degraded("no provider credentials configured".to_string());
    }
    ComponentCheck::ready(format!("{credentials} credential(s) in rotation, using slot {current_slot}"))
}
