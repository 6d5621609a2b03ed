//! Identity-provider token verification.
//!
//! `FirebaseVerifier` checks RS256 ID tokens against Google's published
//! `securetoken` JWK set. Keys are cached for the `max-age` the endpoint
//! advertises and refetched on expiry or when a token names an unknown `kid`,
//! at most once per `UNKNOWN_KID_REFETCH_INTERVAL`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const GOOGLE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
const DEFAULT_KEY_TTL: Duration = Duration::from_secs(3600);
const UNKNOWN_KID_REFETCH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("identity provider is not configured")]
    NotConfigured,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("unknown signing key '{0}'")]
    UnknownKey(String),

    #[error("token rejected: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),

    #[error("failed to fetch signing keys: {0}")]
    KeyFetch(#[from] reqwest::Error),
}

/// The identity asserted by a verified ID token.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityClaims {
    pub uid: String,
    pub email: String,
    pub name: String,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> Result<IdentityClaims, AuthError>;
}

#[derive(Debug, Deserialize)]
struct FirebaseClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
    expires_at: Instant,
}

pub struct FirebaseVerifier {
    project_id: Option<String>,
    http: reqwest::Client,
    jwks_url: String,
    cache: RwLock<Option<CachedKeys>>,
}

impl FirebaseVerifier {
    pub fn new(project_id: Option<String>, http: reqwest::Client) -> Self {
        if project_id.is_none() {
            warn!("FIREBASE_PROJECT_ID not set; identity-provider tokens will be rejected");
        }
        Self {
            project_id,
            http,
            jwks_url: GOOGLE_JWKS_URL.to_string(),
            cache: RwLock::new(None),
        }
    }

    #[cfg(test)]
    fn with_jwks_url(mut self, url: String) -> Self {
        self.jwks_url = url;
        self
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                let now = Instant::now();
                if cached.expires_at > now {
                    if let Some(jwk) = cached.keys.find(kid) {
                        return Ok(DecodingKey::from_jwk(jwk)?);
                    }
                    if now.duration_since(cached.fetched_at) < UNKNOWN_KID_REFETCH_INTERVAL {
                        debug!("Unknown kid '{kid}', keys refreshed recently; not refetching");
                        return Err(AuthError::UnknownKey(kid.to_string()));
                    }
                }
            }
        }

        let refreshed = self.fetch_keys().await?;
        let key = refreshed
            .keys
            .find(kid)
            .map(DecodingKey::from_jwk)
            .transpose()?;
        *self.cache.write().await = Some(refreshed);

        key.ok_or_else(|| AuthError::UnknownKey(kid.to_string()))
    }

    async fn fetch_keys(&self) -> Result<CachedKeys, AuthError> {
        let response = self
            .http
            .get(&self.jwks_url)
            .send()
            .await?
            .error_for_status()?;
        let ttl = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_max_age)
            .unwrap_or(DEFAULT_KEY_TTL);
        let keys: JwkSet = response.json().await?;
        info!("Fetched {} identity signing keys (ttl {}s)", keys.keys.len(), ttl.as_secs());
        let fetched_at = Instant::now();
        Ok(CachedKeys {
            keys,
            fetched_at,
            expires_at: fetched_at + ttl,
        })
    }
}

#[async_trait]
impl IdentityVerifier for FirebaseVerifier {
    async fn verify(&self, id_token: &str) -> Result<IdentityClaims, AuthError> {
        let project_id = self.project_id.as_deref().ok_or(AuthError::NotConfigured)?;

        let header = decode_header(id_token)?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::Malformed(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| AuthError::Malformed("missing kid".to_string()))?;

        let key = self.decoding_key(&kid).await?;
        let validation = firebase_validation(project_id);
        let claims = decode::<FirebaseClaims>(id_token, &key, &validation)?.claims;

        if claims.sub.trim().is_empty() {
            return Err(AuthError::Malformed("empty subject".to_string()));
        }
        debug!("Verified identity token for {}", claims.sub);

        Ok(IdentityClaims {
            uid: claims.sub,
            email: claims.email.unwrap_or_default(),
            name: claims.name.unwrap_or_default(),
        })
    }
}

fn firebase_validation(project_id: &str) -> Validation {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[project_id]);
    validation.set_issuer(&[format!("https://securetoken.google.com/{project_id}")]);
    validation.set_required_spec_claims(&["exp", "iat", "aud", "iss", "sub"]);
    validation
}

/// Reads `max-age=N` out of a Cache-Control header value.
fn parse_max_age(header: &str) -> Option<Duration> {
    header
        .split(',')
        .map(str::trim)
        .find_map(|directive| directive.strip_prefix("max-age="))
        .and_then(|secs| secs.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
pub mod testing {
    use std::collections::HashMap;

    use super::*;

    /// Accepts exactly the tokens it was given.
    #[derive(Default)]
    pub struct StaticVerifier {
        pub tokens: HashMap<String, IdentityClaims>,
    }

    impl StaticVerifier {
        pub fn with(mut self, token: &str, uid: &str, email: &str) -> Self {
            self.tokens.insert(
                token.to_string(),
                IdentityClaims {
                    uid: uid.to_string(),
                    email: email.to_string(),
                    name: String::new(),
                },
            );
            self
        }
    }

    #[async_trait]
    impl IdentityVerifier for StaticVerifier {
        async fn verify(&self, id_token: &str) -> Result<IdentityClaims, AuthError> {
            self.tokens
                .get(id_token)
                .cloned()
                .ok_or_else(|| AuthError::Malformed("unknown test token".to_string()))
        }
    }
}
