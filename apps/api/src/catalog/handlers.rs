use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::catalog::majors::{major_groups, summarize, with_statistics};
use crate::catalog::universities::ScoreFilter;
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UniversityQuery {
    pub search: Option<String>,
    pub type_filter: Option<String>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Deserialize)]
pub struct MajorRowQuery {
    pub search: Option<String>,
    pub score_filter: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MajorSearchQuery {
    pub query: Option<String>,
    pub major_group: Option<String>,
}

// ─── Universities ────────────────────────────────────────────

/// GET /universities
pub async fn handle_list_universities(
    State(state): State<AppState>,
    Query(params): Query<UniversityQuery>,
) -> Json<Value> {
    if !state.universities.is_loaded().await {
        state.universities.reload().await;
    }

    let (universities, total) = state
        .universities
        .list(
            params.search.as_deref(),
            params.type_filter.as_deref(),
            params.limit,
            params.offset,
        )
        .await;

    Json(json!({
        "universities": universities,
        "total": total,
        "limit": params.limit,
        "offset": params.offset,
        "cache_loaded": state.universities.is_loaded().await,
    }))
}

/// GET /universities/stats
pub async fn handle_university_stats(State(state): State<AppState>) -> Json<Value> {
    let catalog = &state.universities;
    Json(json!({
        "total_universities": catalog.len().await,
        "total_majors": catalog.total_majors().await,
        "cache_loaded": catalog.is_loaded().await,
        "load_time": catalog.loaded_at().await.map(|t| t.to_rfc3339()),
    }))
}

/// GET /universities/:code
pub async fn handle_university_detail(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Value>, AppError> {
    let university = state
        .universities
        .get(&code)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Không tìm thấy trường với mã: {code}")))?;

    let data = &university.data;
    Ok(Json(json!({
        "school_code": university.code,
        "school_name": university.school_name,
        "location": university.location,
        "type": data.get("type"),
        "website": data.get("website"),
        "tables": data.get("tables").cloned().unwrap_or_else(|| json!([])),
        "major_count": university.major_count,
    })))
}

/// GET /universities/:code/majors
pub async fn handle_university_majors(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(params): Query<MajorRowQuery>,
) -> Result<Json<Value>, AppError> {
    let score = match params.score_filter.as_deref() {
        Some(raw) => ScoreFilter::parse(raw).map_err(AppError::Validation)?,
        None => None,
    };

    let (university, majors) = state
        .universities
        .majors(&code, params.search.as_deref(), score)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Không tìm thấy trường với mã: {code}")))?;

    Ok(Json(json!({
        "school_code": university.code,
        "school_name": university.school_name,
        "total_majors": majors.len(),
        "majors": majors,
    })))
}

/// POST /universities/reload
pub async fn handle_reload(State(state): State<AppState>) -> Json<Value> {
    let report = state.universities.reload().await;
    Json(json!({
        "message": "Cache đã được reload thành công",
        "total_universities": report.loaded,
        "load_time": report.load_time.map(|t| t.to_rfc3339()),
    }))
}

// ─── Major groups ────────────────────────────────────────────

/// GET /majors
pub async fn handle_major_groups() -> Json<Value> {
    Json(json!({ "major_groups": major_groups() }))
}

/// GET /majors/:file
pub async fn handle_major_group(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(with_statistics(state.majors.group(&file).await?)))
}

/// GET /majors/:file/list
pub async fn handle_major_list(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<Json<Value>, AppError> {
    let data = state.majors.group(&file).await?;
    Ok(Json(json!({ "majors": summarize(&data) })))
}

/// GET /majors/:file/major/:id
pub async fn handle_major_detail(
    State(state): State<AppState>,
    Path((file, id)): Path<(String, usize)>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.majors.major(&file, id).await?))
}

/// GET /majors/search
pub async fn handle_major_search(
    State(state): State<AppState>,
    Query(params): Query<MajorSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let query = params
        .query
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .ok_or_else(|| AppError::Validation("query is required".to_string()))?;

    let group = params.major_group.as_deref().filter(|g| !g.is_empty());
    let results = state.majors.search(&query, group).await?;
    Ok(Json(json!({
        "total": results.len(),
        "results": results,
    })))
}
