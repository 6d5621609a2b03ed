use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Multipart, State},
    Extension, Json,
};
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::auth::middleware::CurrentUser;
use crate::auth::rate_limit::RatePolicy;
use crate::auth::users;
use crate::cv::evaluator::{
    CriteriaOption, EvaluationRequest, EvaluationResult, ALLOWED_EXTENSIONS, MAX_FILES_PER_REQUEST,
    MAX_FILE_SIZE,
};
use crate::errors::AppError;
use crate::state::AppState;

const CV_POLICY: RatePolicy = RatePolicy::per_hour("cv_evaluation", 10);

#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    pub results: Vec<EvaluationResult>,
    pub total_processed: usize,
    pub successful: usize,
}

#[derive(Default)]
struct EvaluateForm {
    files: Vec<(String, Bytes)>,
    industry: String,
    criteria_option: Option<String>,
    custom_criteria: String,
    job_description: String,
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::Validation(format!("Invalid multipart body: {e}"))
}

async fn read_form(mut multipart: Multipart) -> Result<EvaluateForm, AppError> {
    let mut form = EvaluateForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "cvs" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                form.files.push((filename, data));
            }
            "industry" => form.industry = field.text().await.map_err(multipart_error)?,
            "criteria_option" => {
                form.criteria_option = Some(field.text().await.map_err(multipart_error)?)
            }
            "custom_criteria" => form.custom_criteria = field.text().await.map_err(multipart_error)?,
            "job_description" => form.job_description = field.text().await.map_err(multipart_error)?,
            other => warn!("Ignoring unexpected form field '{other}'"),
        }
    }

    Ok(form)
}

fn validate_form(form: &EvaluateForm) -> Result<EvaluationRequest, AppError> {
    if form.files.is_empty() {
        return Err(AppError::Validation("Chưa upload file CV nào".to_string()));
    }
    if form.files.len() > MAX_FILES_PER_REQUEST {
        return Err(AppError::Validation(format!(
            "Tối đa {MAX_FILES_PER_REQUEST} file CV mỗi lần"
        )));
    }

    let industry = form.industry.trim();
    if industry.is_empty() || industry.chars().count() > 100 {
        return Err(AppError::Validation(
            "Ngành nghề không hợp lệ (tối đa 100 ký tự)".to_string(),
        ));
    }

    let criteria_option: CriteriaOption = form
        .criteria_option
        .as_deref()
        .unwrap_or("ats")
        .parse()
        .map_err(|_| AppError::Validation("Tùy chọn tiêu chí không hợp lệ".to_string()))?;

    if criteria_option == CriteriaOption::Custom && form.custom_criteria.trim().chars().count() > 5000 {
        return Err(AppError::Validation(
            "Tiêu chí tùy chỉnh quá dài (tối đa 5000 ký tự)".to_string(),
        ));
    }
    if form.job_description.chars().count() > 10_000 {
        return Err(AppError::Validation(
            "Mô tả công việc quá dài (tối đa 10000 ký tự)".to_string(),
        ));
    }

    Ok(EvaluationRequest {
        industry: industry.to_string(),
        criteria_option,
        custom_criteria: form.custom_criteria.clone(),
        job_description: form.job_description.clone(),
    })
}

/// POST /cv/evaluate
///
/// Multipart upload of 1–5 PDF CVs. Per-file failures are reported inside
/// `results`; only malformed requests fail the whole call.
pub async fn handle_evaluate(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    Extension(user): Extension<CurrentUser>,
    multipart: Multipart,
) -> Result<Json<EvaluateResponse>, AppError> {
    state
        .rate_limiter
        .enforce(&CV_POLICY, Some(&user), peer.map(|ConnectInfo(addr)| addr))
        .await?;

    let form = read_form(multipart).await?;
    let request = validate_form(&form)?;
    info!(
        "CV evaluation for {}: {} file(s), criteria {:?}",
        user.user_id,
        form.files.len(),
        request.criteria_option
    );

    let mut results = Vec::with_capacity(form.files.len());
    for (filename, data) in form.files {
        results.push(state.cv.evaluate(&filename, data, &request).await);
    }

    let successful = results.iter().filter(|r| r.errors.is_empty()).count();
    if let Err(e) = users::record_usage(&state.db, &user.user_id, CV_POLICY.feature).await {
        warn!("Failed to record CV usage for {}: {e}", user.user_id);
    }

    Ok(Json(EvaluateResponse {
        total_processed: results.len(),
        successful,
        results,
    }))
}

/// GET /cv/health
pub async fn handle_health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "cv-evaluation",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "llm": state.cv.llm_available(),
            "pdf_processing": true,
            "suspicious_content_check": true
        },
        "limits": {
            "max_file_size_mb": MAX_FILE_SIZE / (1024 * 1024),
            "max_files_per_request": MAX_FILES_PER_REQUEST,
            "allowed_extensions": ALLOWED_EXTENSIONS.iter().map(|e| format!(".{e}")).collect::<Vec<_>>()
        }
    }))
}

/// GET /cv/status
pub async fn handle_status() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "CV Evaluation Service"
    }))
}
