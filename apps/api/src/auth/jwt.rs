use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::users::UserRow;

pub const ACCESS: &str = "access";
pub const REFRESH: &str = "refresh";

/// Claims carried by locally issued tokens. Refresh tokens only fill
/// `user_id`, `exp`, `iat` and `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    pub exp: i64,
    pub iat: i64,
    #[serde(rename = "type")]
    pub token_type: String,
}

/// Issues and verifies HS256 tokens signed with the service secret.
#[derive(Clone)]
pub struct JwtManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtManager {
    pub fn new(secret: &str, access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl: Duration::seconds(access_ttl_secs),
            refresh_ttl: Duration::seconds(refresh_ttl_secs),
        }
    }

    pub fn create_access_token(&self, user: &UserRow) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = Claims {
            user_id: user.firebase_uid.clone(),
            email: Some(user.email.clone()),
            role: Some(user.role.clone()),
            subscription: Some(user.subscription.clone()),
            permissions: vec!["basic".to_string()],
            exp: (now + self.access_ttl).timestamp(),
            iat: now.timestamp(),
            token_type: ACCESS.to_string(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    pub fn create_refresh_token(&self, user_id: &str) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = Claims {
            user_id: user_id.to_string(),
            email: None,
            role: None,
            subscription: None,
            permissions: vec![],
            exp: (now + self.refresh_ttl).timestamp(),
            iat: now.timestamp(),
            token_type: REFRESH.to_string(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Returns the claims of a valid, unexpired token; `None` otherwise.
    pub fn verify(&self, token: &str) -> Option<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        match decode::<Claims>(token, &self.decoding, &validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!("Local token rejected: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserRow {
        UserRow {
            id: 1,
            firebase_uid: "uid-123".to_string(),
            email: "lan@example.com".to_string(),
            name: "Lan".to_string(),
            role: "free".to_string(),
            subscription: "free".to_string(),
            subscription_end: None,
        }
    }

    #[test]
    fn test_access_token_round_trip() {
        let jwt = JwtManager::new("secret", 1800, 3600);
        let token = jwt.create_access_token(&user()).unwrap();
        let claims = jwt.verify(&token).unwrap();
        assert_eq!(claims.user_id, "uid-123");
        assert_eq!(claims.email.as_deref(), Some("lan@example.com"));
        assert_eq!(claims.token_type, ACCESS);
        assert_eq!(claims.permissions, vec!["basic".to_string()]);
    }

    #[test]
    fn test_refresh_token_has_refresh_type() {
        let jwt = JwtManager::new("secret", 1800, 3600);
        let token = jwt.create_refresh_token("uid-123").unwrap();
        let claims = jwt.verify(&token).unwrap();
        assert_eq!(claims.token_type, REFRESH);
        assert!(claims.email.is_none());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let issuer = JwtManager::new("secret-a", 1800, 3600);
        let verifier = JwtManager::new("secret-b", 1800, 3600);
        let token = issuer.create_access_token(&user()).unwrap();
        assert!(verifier.verify(&token).is_none());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let jwt = JwtManager::new("secret", -120, 3600);
        let token = jwt.create_access_token(&user()).unwrap();
        assert!(jwt.verify(&token).is_none());
    }

    #[test]
    fn test_garbage_is_rejected() {
        let jwt = JwtManager::new("secret", 1800, 3600);
        assert!(jwt.verify("not.a.token").is_none());
    }
}
