//! Question answering endpoint.
//!
//! - `POST /` with `{connection_id, question, timezone?, user_id}` returns
//!   `{"answer": ...}`; failures return `{"detail": ...}` with the status
//!   code of the failure.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use querent_agent::orchestrator::{AskRequest, CallOrchestrator};
use querent_core::domain::tenant::{TenantId, ThreadId};
use querent_core::errors::AskError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ApiState {
    orchestrator: Arc<CallOrchestrator>,
    default_timezone: Arc<str>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub connection_id: String,
    pub question: String,
    #[serde(default)]
    pub timezone: Option<String>,
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub detail: String,
}

type ApiError = (StatusCode, Json<ErrorDetail>);

pub fn router(orchestrator: Arc<CallOrchestrator>, default_timezone: &str) -> Router {
    Router::new()
        .route("/", post(ask))
        .with_state(ApiState { orchestrator, default_timezone: Arc::from(default_timezone) })
}

pub async fn ask(
    State(state): State<ApiState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let ask = to_ask_request(request, &state.default_timezone)?;
    info!(
        event_name = "api.ask.received",
        request_id = %request_id,
        tenant_id = %ask.tenant_id,
        thread_id = %ask.thread_id,
        timezone = %ask.timezone,
        "question received"
    );

    match state.orchestrator.ask(&ask).await {
        Ok(answer) => {
            info!(event_name = "api.ask.answered", request_id = %request_id, "question answered");
            Ok(Json(AnswerResponse { answer }))
        }
        Err(error) => {
            warn!(
                event_name = "api.ask.failed",
                request_id = %request_id,
                status = error.status_code(),
                error = %error,
                "question could not be answered"
            );
            Err(error_response(&error))
        }
    }
}

fn to_ask_request(request: QueryRequest, default_timezone: &str) -> Result<AskRequest, ApiError> {
    let required = [
        ("connection_id", &request.connection_id),
        ("question", &request.question),
        ("user_id", &request.user_id),
    ];
    if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
        return Err(bad_request(format!("`{field}` must not be empty")));
    }

    let timezone = request
        .timezone
        .filter(|timezone| !timezone.trim().is_empty())
        .unwrap_or_else(|| default_timezone.to_string());
    Ok(AskRequest {
        tenant_id: TenantId(request.connection_id.trim().to_string()),
        question: request.question,
        timezone,
        thread_id: ThreadId(request.user_id.trim().to_string()),
    })
}

pub fn error_response(error: &AskError) -> ApiError {
    let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorDetail { detail: error.user_message() }))
}

fn bad_request(detail: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorDetail { detail }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use querent_core::errors::AskError;

    use super::{error_response, to_ask_request, QueryRequest};

    fn request(timezone: Option<&str>) -> QueryRequest {
        QueryRequest {
            connection_id: "683c317abb9177f8bc5896fe".to_string(),
            question: "how many customers".to_string(),
            timezone: timezone.map(str::to_string),
            user_id: "user-7".to_string(),
        }
    }

    #[test]
    fn missing_timezone_falls_back_to_default() {
        let ask = to_ask_request(request(None), "Asia/Calcutta").expect("ask");

        assert_eq!(ask.timezone, "Asia/Calcutta");
        assert_eq!(ask.thread_id.0, "user-7");
        assert_eq!(ask.tenant_id.0, "683c317abb9177f8bc5896fe");
    }

    #[test]
    fn explicit_timezone_wins() {
        let ask = to_ask_request(request(Some("Europe/Berlin")), "Asia/Calcutta").expect("ask");

        assert_eq!(ask.timezone, "Europe/Berlin");
    }

    #[test]
    fn blank_question_is_a_bad_request() {
        let mut blank = request(None);
        blank.question = "   ".to_string();

        let (status, body) = to_ask_request(blank, "UTC").expect_err("rejected");

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.detail.contains("question"));
    }

    #[test]
    fn ask_errors_keep_their_status_and_hide_causes() {
        let (status, body) = error_response(&AskError::NoAnswerDerivable {
            question: "q".to_string(),
            cause: "sqlx internals".to_string(),
        });
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!body.detail.contains("sqlx"));

        let (status, _) = error_response(&AskError::AllCredentialsExhausted { attempts: 2 });
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, body) =
            error_response(&AskError::UserFacing { status: 422, message: "question is empty".to_string() });
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.detail, "question is empty");
    }
}
