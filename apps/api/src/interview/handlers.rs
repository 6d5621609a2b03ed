use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::middleware::CurrentUser;
use crate::auth::rate_limit::RatePolicy;
use crate::errors::AppError;
use crate::interview::catalog::CareerSummary;
use crate::interview::service::{Candidate, InterviewReport, NextStep};
use crate::state::AppState;

const START_POLICY: RatePolicy = RatePolicy::per_hour("interview_start", 5);

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub age: Value,
    #[serde(default)]
    pub job: String,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub session_id: Option<String>,
    pub answer: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FinishRequest {
    pub session_id: Option<String>,
}

fn validate_candidate(req: StartRequest) -> Result<Candidate, AppError> {
    let name = req.name.trim();
    if name.is_empty() || name.chars().count() > 100 {
        return Err(AppError::Validation("Tên không hợp lệ (tối đa 100 ký tự)".to_string()));
    }

    // Only JSON integers count; 20.0 and "20" are rejected.
    let age = req
        .age
        .as_i64()
        .filter(|age| (16..=100).contains(age))
        .ok_or_else(|| AppError::Validation("Tuổi không hợp lệ (16-100)".to_string()))?;

    let job = req.job.trim();
    if job.is_empty() || job.chars().count() > 200 {
        return Err(AppError::Validation(
            "Công việc không hợp lệ (tối đa 200 ký tự)".to_string(),
        ));
    }

    Ok(Candidate {
        name: name.to_string(),
        age,
        job: job.to_string(),
    })
}

/// GET /interview/careers
pub async fn handle_careers(State(state): State<AppState>) -> Json<Vec<CareerSummary>> {
    Json(state.interviews.catalog().summaries())
}

/// POST /interview/start
pub async fn handle_start(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<StartRequest>,
) -> Result<Json<NextStep>, AppError> {
    state
        .rate_limiter
        .enforce(&START_POLICY, Some(&user), peer.map(|ConnectInfo(addr)| addr))
        .await?;

    let candidate = validate_candidate(req)?;
    Ok(Json(state.interviews.start(candidate)?))
}

/// POST /interview/answer
pub async fn handle_answer(
    State(state): State<AppState>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<NextStep>, AppError> {
    let (Some(session_id), Some(answer)) = (req.session_id, req.answer) else {
        return Err(AppError::Validation("Missing required fields".to_string()));
    };
    if session_id.is_empty() || answer.trim().is_empty() {
        return Err(AppError::Validation("Missing required fields".to_string()));
    }

    Ok(Json(state.interviews.answer(&session_id, &answer).await?))
}

/// POST /interview/finish
pub async fn handle_finish(
    State(state): State<AppState>,
    Json(req): Json<FinishRequest>,
) -> Result<Json<InterviewReport>, AppError> {
    let session_id = req
        .session_id
        .ok_or_else(|| AppError::Validation("Invalid session".to_string()))?;
    Ok(Json(state.interviews.finish(&session_id).await?))
}

/// GET /interview/health
pub async fn handle_health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "interview",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "careers": state.interviews.catalog().len(),
        "active_sessions": state.interviews.active_sessions(),
        "llm": state.interviews.llm_available()
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header::AUTHORIZATION, header::CONTENT_TYPE, Request, StatusCode},
        Router,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::auth::identity::testing::StaticVerifier;
    use crate::interview::catalog::{InterviewCatalog, SAMPLE_CATALOG};
    use crate::interview::service::InterviewService;
    use crate::routes::build_router;

    async fn app() -> Router {
        let state = AppState::for_tests()
            .await
            .with_identity(Arc::new(StaticVerifier::default().with("tok", "uid-1", "a@example.com")))
            .with_interviews(InterviewService::new(
                InterviewCatalog::from_json(SAMPLE_CATALOG).unwrap(),
                None,
            ));
        build_router(state)
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(AUTHORIZATION, "Bearer tok")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_validate_candidate() {
        let ok = validate_candidate(StartRequest {
            name: " Lan ".into(),
            age: json!(22),
            job: "Lập trình viên".into(),
        })
        .unwrap();
        assert_eq!(ok.name, "Lan");

        for age in [json!(15), json!(101), json!(20.5), json!("20"), Value::Null] {
            let err = validate_candidate(StartRequest {
                name: "Lan".into(),
                age,
                job: "Dev".into(),
            });
            assert!(err.is_err());
        }

        assert!(validate_candidate(StartRequest {
            name: "x".repeat(101),
            age: json!(20),
            job: "Dev".into(),
        })
        .is_err());
    }

    #[tokio::test]
    async fn test_careers_lists_catalog() {
        let response = app()
            .await
            .oneshot(Request::builder().uri("/interview/careers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["name"], "Lập trình viên");
    }

    #[tokio::test]
    async fn test_start_requires_identity() {
        let response = app()
            .await
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/interview/start")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"name":"Lan","age":22,"job":"Lập trình viên"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_interview_over_http() {
        let app = app().await;
        let start = app
            .clone()
            .oneshot(post("/interview/start", json!({"name": "Lan", "age": 22, "job": "Lập trình viên"})))
            .await
            .unwrap();
        assert_eq!(start.status(), StatusCode::OK);
        let body = json_body(start).await;
        let session_id = body["session_id"].as_str().unwrap().to_string();
        assert_eq!(body["criteria"]["name"], "Kiến thức kỹ thuật");

        for answer in ["a", "b", "c"] {
            let r = app
                .clone()
                .oneshot(post("/interview/answer", json!({"session_id": session_id, "answer": answer})))
                .await
                .unwrap();
            assert_eq!(r.status(), StatusCode::OK);
        }

        let finish = app
            .clone()
            .oneshot(post("/interview/finish", json!({"session_id": session_id})))
            .await
            .unwrap();
        let report = json_body(finish).await;
        assert_eq!(report["max_score"], 8);
        assert_eq!(report["candidate"]["name"], "Lan");

        let missing = app
            .oneshot(post("/interview/answer", json!({"session_id": session_id})))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_start_is_rate_limited() {
        let app = app().await;
        for _ in 0..5 {
            let r = app
                .clone()
                .oneshot(post("/interview/start", json!({"name": "Lan", "age": 22, "job": "Lập trình viên"})))
                .await
                .unwrap();
            assert_eq!(r.status(), StatusCode::OK);
        }
        let limited = app
            .oneshot(post("/interview/start", json!({"name": "Lan", "age": 22, "job": "Lập trình viên"})))
            .await
            .unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
