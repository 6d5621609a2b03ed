pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

use crate::auth::middleware::{require_auth, require_identity, require_premium};
use crate::auth::handlers as auth;
use crate::catalog::handlers as catalog;
use crate::cv::evaluator::{MAX_FILES_PER_REQUEST, MAX_FILE_SIZE};
use crate::cv::handlers as cv;
use crate::interview::handlers as interview;
use crate::monitor::handlers as monitor;
use crate::rag::handlers as career;
use crate::state::AppState;

/// Room for a full batch of CVs plus the multipart framing and text fields.
const CV_BODY_LIMIT: usize = (MAX_FILES_PER_REQUEST + 1) * MAX_FILE_SIZE;

pub fn build_router(state: AppState) -> Router {
    let identity = from_fn_with_state(state.clone(), require_identity);

    // Route layers run outermost-last, so identity resolves the user before the premium check.
    let premium_cv = Router::new()
        .route("/cv/evaluate", post(cv::handle_evaluate))
        .route_layer(from_fn_with_state(state.clone(), require_premium))
        .route_layer(identity.clone())
        .layer(DefaultBodyLimit::max(CV_BODY_LIMIT));

    let identified = Router::new()
        .route("/interview/start", post(interview::handle_start))
        .route("/career/ask", post(career::handle_ask))
        .route("/career/auth-test", post(career::handle_auth_test))
        .route_layer(identity);

    let authenticated = Router::new()
        .route("/auth/logout", post(auth::handle_logout))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health::health_handler))
        // Auth
        .route("/auth/register", post(auth::handle_register))
        .route("/auth/login", post(auth::handle_login))
        .route("/auth/refresh", post(auth::handle_refresh))
        // CV evaluation
        .route("/cv/health", get(cv::handle_health))
        .route("/cv/status", get(cv::handle_status))
        // Mock interview
        .route("/interview/careers", get(interview::handle_careers))
        .route("/interview/answer", post(interview::handle_answer))
        .route("/interview/finish", post(interview::handle_finish))
        .route("/interview/health", get(interview::handle_health))
        // University and major lookup
        .route("/universities", get(catalog::handle_list_universities))
        .route("/universities/stats", get(catalog::handle_university_stats))
        .route("/universities/reload", post(catalog::handle_reload))
        .route("/universities/:code", get(catalog::handle_university_detail))
        .route("/universities/:code/majors", get(catalog::handle_university_majors))
        .route("/majors", get(catalog::handle_major_groups))
        .route("/majors/search", get(catalog::handle_major_search))
        .route("/majors/:file", get(catalog::handle_major_group))
        .route("/majors/:file/list", get(catalog::handle_major_list))
        .route("/majors/:file/major/:id", get(catalog::handle_major_detail))
        // Career counseling
        .route("/career/status", get(career::handle_status))
        .route("/career/health", get(career::handle_health))
        // Sibling service monitor
        .route("/monitor/health", get(monitor::handle_health))
        .route("/monitor/services", get(monitor::handle_services))
        .merge(premium_cv)
        .merge(identified)
        .merge(authenticated)
        .with_state(state)
}
