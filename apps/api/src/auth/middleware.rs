//! Request authentication layers.
//!
//! Each layer resolves the bearer token into a `CurrentUser` and stores it in
//! the request extensions, where handlers read it via `Extension<CurrentUser>`.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use tracing::debug;

use crate::auth::identity::IdentityClaims;
use crate::auth::jwt::{Claims, ACCESS};
use crate::auth::users::{self, FREE, PREMIUM};
use crate::errors::AppError;
use crate::state::AppState;

pub const IDENTITY_TOKEN: &str = "firebase";

#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub subscription: String,
    #[serde(rename = "type")]
    pub token_type: String,
}

impl CurrentUser {
    fn from_identity(claims: IdentityClaims) -> Self {
        Self {
            user_id: claims.uid,
            email: claims.email,
            name: claims.name,
            role: FREE.to_string(),
            subscription: FREE.to_string(),
            token_type: IDENTITY_TOKEN.to_string(),
        }
    }

    fn from_claims(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id,
            email: claims.email.unwrap_or_default(),
            name: String::new(),
            role: claims.role.unwrap_or_else(|| FREE.to_string()),
            subscription: claims.subscription.unwrap_or_else(|| FREE.to_string()),
            token_type: claims.token_type,
        }
    }
}

fn bearer_token(req: &Request) -> Result<String, AppError> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(String::from)
        .ok_or_else(|| AppError::Unauthorized("Missing or invalid Authorization header".to_string()))
}

/// Verifies an identity-provider token and overlays the local profile.
async fn identity_user(state: &AppState, token: &str) -> Result<Option<CurrentUser>, AppError> {
    let claims = match state.identity.verify(token).await {
        Ok(claims) => claims,
        Err(e) => {
            debug!("Identity token rejected: {e}");
            return Ok(None);
        }
    };

    let mut user = CurrentUser::from_identity(claims);
    if let Some(row) = users::find_by_uid(&state.db, &user.user_id).await? {
        if !row.name.is_empty() {
            user.name = row.name.clone();
        }
        if users::check_premium(&state.db, &row.firebase_uid).await? {
            user.role = row.subscription.clone();
            user.subscription = row.subscription;
        }
    }
    Ok(Some(user))
}

/// Accepts identity-provider tokens only.
pub async fn require_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req)?;
    let user = identity_user(&state, &token)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid Firebase token".to_string()))?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Accepts an identity-provider token or a locally issued access token.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req)?;

    let user = match identity_user(&state, &token).await? {
        Some(user) => user,
        None => state
            .jwt
            .verify(&token)
            .filter(|claims| claims.token_type == ACCESS)
            .map(CurrentUser::from_claims)
            .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".to_string()))?,
    };

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Must be layered inside `require_identity` or `require_auth`.
pub async fn require_premium(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(user) = req.extensions_mut().get_mut::<CurrentUser>() else {
        return Err(AppError::Unauthorized("Authentication required".to_string()));
    };

    if !users::check_premium(&state.db, &user.user_id).await? {
        return Err(AppError::PremiumRequired);
    }

    if user.subscription == FREE {
        user.role = PREMIUM.to_string();
        user.subscription = PREMIUM.to_string();
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware::from_fn_with_state,
        routing::get,
        Extension, Json, Router,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::auth::identity::testing::StaticVerifier;
    use crate::state::AppState;

    async fn whoami(Extension(user): Extension<CurrentUser>) -> Json<CurrentUser> {
        Json(user)
    }

    async fn state() -> AppState {
        AppState::for_tests()
            .await
            .with_identity(Arc::new(
                StaticVerifier::default().with("good-id-token", "uid-1", "lan@example.com"),
            ))
    }

    fn identity_app(state: AppState) -> Router {
        Router::new()
            .route("/", get(whoami))
            .layer(from_fn_with_state(state.clone(), require_identity))
            .with_state(state)
    }

    fn premium_app(state: AppState) -> Router {
        Router::new()
            .route("/", get(whoami))
            .layer(from_fn_with_state(state.clone(), require_premium))
            .layer(from_fn_with_state(state.clone(), require_auth))
            .with_state(state)
    }

    fn get_with(token: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().uri("/");
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_header_is_unauthorized() {
        let response = identity_app(state().await).oneshot(get_with(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["error"]["message"], "Missing or invalid Authorization header");
    }

    #[tokio::test]
    async fn test_identity_token_populates_user() {
        let response = identity_app(state().await)
            .oneshot(get_with(Some("good-id-token")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["user_id"], "uid-1");
        assert_eq!(body["subscription"], "free");
        assert_eq!(body["type"], "firebase");
    }

    #[tokio::test]
    async fn test_identity_layer_rejects_local_jwt() {
        let state = state().await;
        let row = users::create(&state.db, "uid-1", "lan@example.com", "").await.unwrap();
        let token = state.jwt.create_access_token(&row).unwrap();

        let response = identity_app(state).oneshot(get_with(Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_auth_layer_accepts_access_jwt_but_not_refresh() {
        let state = state().await;
        let row = users::create(&state.db, "uid-1", "lan@example.com", "").await.unwrap();
        users::set_subscription(&state.db, "uid-1", PREMIUM, None).await;
        let access = state.jwt.create_access_token(&row).unwrap();
        let refresh = state.jwt.create_refresh_token("uid-1").unwrap();

        let ok = premium_app(state.clone()).oneshot(get_with(Some(&access))).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        let body = json_body(ok).await;
        assert_eq!(body["subscription"], "premium");

        let rejected = premium_app(state).oneshot(get_with(Some(&refresh))).await.unwrap();
        assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_premium_layer_rejects_free_user() {
        let state = state().await;
        users::create(&state.db, "uid-1", "lan@example.com", "").await.unwrap();

        let response = premium_app(state).oneshot(get_with(Some("good-id-token"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = json_body(response).await;
        assert_eq!(body["subscription_required"], "premium");
    }
}
