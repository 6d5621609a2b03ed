use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info, warn};

pub const FREE: &str = "free";
pub const PREMIUM: &str = "premium";
pub const ENTERPRISE: &str = "enterprise";

/// A row of the `users` table, keyed by the identity provider's uid.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserRow {
    pub id: i64,
    pub firebase_uid: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub subscription: String,
    /// RFC 3339 timestamp; `None` means the subscription does not expire.
    pub subscription_end: Option<String>,
}

impl UserRow {
    pub fn has_paid_tier(&self) -> bool {
        self.subscription == PREMIUM || self.subscription == ENTERPRISE
    }
}

const USER_COLUMNS: &str = "id, firebase_uid, email, name, role, subscription, subscription_end";

pub async fn find_by_uid(pool: &SqlitePool, uid: &str) -> Result<Option<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE firebase_uid = ?"
    ))
    .bind(uid)
    .fetch_optional(pool)
    .await
}

/// Inserts a free-tier user. Fails with a unique violation if the uid exists.
pub async fn create(
    pool: &SqlitePool,
    uid: &str,
    email: &str,
    name: &str,
) -> Result<UserRow, sqlx::Error> {
    let user = sqlx::query_as::<_, UserRow>(&format!(
        "INSERT INTO users (firebase_uid, email, name, role, subscription) \
         VALUES (?, ?, ?, ?, ?) RETURNING {USER_COLUMNS}"
    ))
    .bind(uid)
    .bind(email)
    .bind(name)
    .bind(FREE)
    .bind(FREE)
    .fetch_one(pool)
    .await?;

    info!("Created user {} ({})", user.firebase_uid, user.email);
    Ok(user)
}

pub async fn get_or_create(
    pool: &SqlitePool,
    uid: &str,
    email: &str,
    name: &str,
) -> Result<UserRow, sqlx::Error> {
    match find_by_uid(pool, uid).await? {
        Some(user) => Ok(user),
        None => create(pool, uid, email, name).await,
    }
}

/// Whether `uid` currently holds a paid subscription.
///
/// An end date in the past downgrades the row to the free tier. A missing
/// user or an unparseable end date counts as not premium.
pub async fn check_premium(pool: &SqlitePool, uid: &str) -> Result<bool, sqlx::Error> {
    let Some(user) = find_by_uid(pool, uid).await? else {
        debug!("Premium check: user {uid} not found");
        return Ok(false);
    };

    if !user.has_paid_tier() {
        return Ok(false);
    }

    let Some(end) = user.subscription_end.as_deref() else {
        return Ok(true);
    };

    match DateTime::parse_from_rfc3339(end) {
        Ok(end) if end.with_timezone(&Utc) > Utc::now() => Ok(true),
        Ok(end) => {
            info!("Subscription for {uid} expired at {end}; downgrading to free");
            sqlx::query(
                "UPDATE users SET subscription = ?, role = ?, updated_at = CURRENT_TIMESTAMP \
                 WHERE firebase_uid = ?",
            )
            .bind(FREE)
            .bind(FREE)
            .bind(uid)
            .execute(pool)
            .await?;
            Ok(false)
        }
        Err(e) => {
            warn!("Unreadable subscription_end '{end}' for {uid}: {e}");
            Ok(false)
        }
    }
}

/// Appends one quota unit for `feature` to the usage log.
pub async fn record_usage(pool: &SqlitePool, user_id: &str, feature: &str) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO usage_logs (user_id, feature, quota_consumed) VALUES (?, ?, 1)")
        .bind(user_id)
        .bind(feature)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
pub async fn set_subscription(
    pool: &SqlitePool,
    uid: &str,
    subscription: &str,
    end: Option<DateTime<Utc>>,
) {
    sqlx::query("UPDATE users SET subscription = ?, role = ?, subscription_end = ? WHERE firebase_uid = ?")
        .bind(subscription)
        .bind(subscription)
        .bind(end.map(|e| e.to_rfc3339()))
        .bind(uid)
        .execute(pool)
        .await
        .unwrap();
}
