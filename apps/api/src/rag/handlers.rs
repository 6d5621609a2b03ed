use std::time::Instant;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use crate::auth::middleware::CurrentUser;
use crate::state::AppState;

/// Error body the counseling client expects: `{error, response, type}`.
#[derive(Debug)]
pub struct CareerRejection {
    status: StatusCode,
    error: &'static str,
    response: &'static str,
    kind: &'static str,
}

impl CareerRejection {
    fn invalid_request() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: "No question provided",
            response: "Vui lòng cung cấp câu hỏi.",
            kind: "invalid_request",
        }
    }

    fn empty_question() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: "Empty question",
            response: "Câu hỏi không được để trống.",
            kind: "empty_question",
        }
    }

    fn not_ready() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            error: "Career agent not initialized",
            response: "Hệ thống đang khởi động, vui lòng thử lại sau.",
            kind: "system_error",
        }
    }
}

impl IntoResponse for CareerRejection {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.error,
            "response": self.response,
            "type": self.kind,
        });
        (self.status, Json(body)).into_response()
    }
}

/// POST /career/ask
pub async fn handle_ask(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    payload: Option<Json<Value>>,
) -> Result<Json<Value>, CareerRejection> {
    let agent = state.career_agent.clone().ok_or_else(CareerRejection::not_ready)?;

    let question = payload
        .as_ref()
        .and_then(|Json(body)| body.get("question"))
        .and_then(Value::as_str)
        .ok_or_else(CareerRejection::invalid_request)?
        .trim()
        .to_string();
    if question.is_empty() {
        return Err(CareerRejection::empty_question());
    }

    info!("Career question from {}: {}", user.email, question.chars().take(100).collect::<String>());
    let started = Instant::now();
    let answer = agent.answer_question(&question).await;

    let mut body = json!(answer);
    if let Some(object) = body.as_object_mut() {
        object.insert("api_processing_time".into(), json!(started.elapsed().as_secs_f64()));
        object.insert("user_info".into(), json!(user));
    }
    Ok(Json(body))
}

/// GET /career/status
pub async fn handle_status(State(state): State<AppState>) -> Json<Value> {
    let mut status = json!({
        "status": if state.career_agent.is_some() { "healthy" } else { "initializing" },
        "agent_initialized": state.career_agent.is_some(),
        "timestamp": Utc::now().to_rfc3339(),
    });

    if let (Some(agent), Some(object)) = (&state.career_agent, status.as_object_mut()) {
        object.insert("agent_info".into(), agent.agent_info().await);
        object.insert("model".into(), json!(state.config.llm.chat_model));
        object.insert("embedding_model".into(), json!(state.config.llm.embedding_model));
    }
    Json(status)
}

/// GET /career/health
pub async fn handle_health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "career-counseling-rag",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// POST /career/auth-test
pub async fn handle_auth_test(
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    payload: Option<Json<Value>>,
) -> Json<Value> {
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("Missing")
            .to_string()
    };
    let authorization: String = header_value(header::AUTHORIZATION).chars().take(50).collect();

    Json(json!({
        "status": "success",
        "message": "Authentication successful!",
        "user_info": user,
        "headers_received": {
            "authorization": format!("{authorization}..."),
            "content_type": header_value(header::CONTENT_TYPE),
        },
        "data_received": payload.map(|Json(body)| body).unwrap_or_else(|| json!({})),
    }))
}
