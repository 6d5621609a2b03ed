use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::auth::jwt::REFRESH;
use crate::auth::rate_limit::RatePolicy;
use crate::auth::users::{self, UserRow};
use crate::errors::AppError;
use crate::state::AppState;

const AUTH_POLICY: RatePolicy = RatePolicy::per_hour("auth", 30);

#[derive(Debug, Deserialize)]
pub struct FirebaseTokenRequest {
    #[serde(default)]
    pub firebase_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub role: String,
    pub subscription: String,
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserSummary,
}

#[derive(Debug, Serialize)]
pub struct AccessToken {
    pub access_token: String,
}

fn issue_tokens(state: &AppState, user: UserRow) -> Result<TokenPair, AppError> {
    let access_token = state.jwt.create_access_token(&user)?;
    let refresh_token = state.jwt.create_refresh_token(&user.firebase_uid)?;
    Ok(TokenPair {
        access_token,
        refresh_token,
        user: UserSummary {
            id: user.firebase_uid,
            email: user.email,
            role: user.role,
            subscription: user.subscription,
        },
    })
}

fn required(token: Option<String>, what: &str) -> Result<String, AppError> {
    token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::Validation(format!("{what} required")))
}

async fn verify_identity(
    state: &AppState,
    token: &str,
) -> Result<crate::auth::identity::IdentityClaims, AppError> {
    state
        .identity
        .verify(token)
        .await
        .map_err(|_| AppError::Unauthorized("Invalid Firebase token".to_string()))
}

/// POST /auth/register
pub async fn handle_register(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(req): Json<FirebaseTokenRequest>,
) -> Result<Json<TokenPair>, AppError> {
    state
        .rate_limiter
        .enforce(&AUTH_POLICY, None, peer.map(|ConnectInfo(addr)| addr))
        .await?;

    let token = required(req.firebase_token, "Firebase token")?;
    let identity = verify_identity(&state, &token).await?;

    if users::find_by_uid(&state.db, &identity.uid).await?.is_some() {
        return Err(AppError::Validation("User already exists".to_string()));
    }
    let user = users::create(&state.db, &identity.uid, &identity.email, &identity.name).await?;
    info!("Registered {}", user.firebase_uid);

    Ok(Json(issue_tokens(&state, user)?))
}

/// POST /auth/login
pub async fn handle_login(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(req): Json<FirebaseTokenRequest>,
) -> Result<Json<TokenPair>, AppError> {
    state
        .rate_limiter
        .enforce(&AUTH_POLICY, None, peer.map(|ConnectInfo(addr)| addr))
        .await?;

    let token = required(req.firebase_token, "Firebase token")?;
    let identity = verify_identity(&state, &token).await?;
    let user =
        users::get_or_create(&state.db, &identity.uid, &identity.email, &identity.name).await?;

    Ok(Json(issue_tokens(&state, user)?))
}

/// POST /auth/refresh
pub async fn handle_refresh(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<AccessToken>, AppError> {
    state
        .rate_limiter
        .enforce(&AUTH_POLICY, None, peer.map(|ConnectInfo(addr)| addr))
        .await?;

    let token = required(req.refresh_token, "Refresh token")?;
    let claims = state
        .jwt
        .verify(&token)
        .filter(|c| c.token_type == REFRESH)
        .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".to_string()))?;

    let user = users::find_by_uid(&state.db, &claims.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(AccessToken {
        access_token: state.jwt.create_access_token(&user)?,
    }))
}

/// POST /auth/logout
/// Tokens are stateless; the client discards them.
pub async fn handle_logout() -> Json<Value> {
    Json(json!({ "message": "Logged out successfully" }))
}
