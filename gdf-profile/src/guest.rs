//! Guest AI quota
//!
//! Anonymous visitors get a small per-device AI request allowance. The
//! counter is persisted in SQLite and mirrored in memory. It is never merged
//! into an account: signing in abandons the mirror entry and signing out
//! reloads it from storage.

use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::ProfileError;

/// Guest counter snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GuestQuota {
    pub requests_made: i64,
    pub limit: i64,
    pub remaining: i64,
}

impl GuestQuota {
    fn new(requests_made: i64, limit: i64) -> Self {
        Self {
            requests_made,
            limit,
            remaining: (limit - requests_made).max(0),
        }
    }
}

pub struct GuestQuotaCache {
    pool: SqlitePool,
    limit: i64,
    mirror: RwLock<HashMap<String, i64>>,
}

impl GuestQuotaCache {
    pub fn new(pool: SqlitePool, limit: i64) -> Self {
        Self {
            pool,
            limit,
            mirror: RwLock::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    /// Current counter for a device
    pub async fn quota(&self, device_id: &str) -> Result<GuestQuota, ProfileError> {
        if let Some(made) = self.mirror.read().await.get(device_id).copied() {
            return Ok(GuestQuota::new(made, self.limit));
        }

        let made = self.load(device_id).await?;
        self.mirror.write().await.insert(device_id.to_string(), made);
        Ok(GuestQuota::new(made, self.limit))
    }

    /// Count one request, or reject once the limit is reached
    pub async fn try_consume(&self, device_id: &str) -> Result<GuestQuota, ProfileError> {
        // Held across the write so concurrent requests from one device serialize
        let mut mirror = self.mirror.write().await;

        let made = match mirror.get(device_id).copied() {
            Some(made) => made,
            None => self.load(device_id).await?,
        };

        if made >= self.limit {
            mirror.insert(device_id.to_string(), made);
            debug!(device_id, made, limit = self.limit, "Guest AI request rejected");
            return Err(ProfileError::QuotaExceeded {
                made,
                limit: self.limit,
            });
        }

        let next = made + 1;
        self.store(device_id, next).await?;
        mirror.insert(device_id.to_string(), next);

        Ok(GuestQuota::new(next, self.limit))
    }

    /// Account took over; forget the in-memory guest counter
    pub async fn on_sign_in(&self, device_id: &str) {
        if self.mirror.write().await.remove(device_id).is_some() {
            debug!(device_id, "Guest quota mirror abandoned on sign-in");
        }
    }

    /// Back to guest mode; restore the persisted counter
    pub async fn on_sign_out(&self, device_id: &str) -> Result<GuestQuota, ProfileError> {
        let made = self.load(device_id).await?;
        self.mirror.write().await.insert(device_id.to_string(), made);
        info!(device_id, made, "Guest quota restored on sign-out");
        Ok(GuestQuota::new(made, self.limit))
    }

    async fn load(&self, device_id: &str) -> Result<i64, ProfileError> {
        let made: Option<i64> =
            sqlx::query_scalar("SELECT requests_made FROM guest_quota WHERE device_id = ?")
                .bind(device_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(made.unwrap_or(0))
    }

    async fn store(&self, device_id: &str, requests_made: i64) -> Result<(), ProfileError> {
        sqlx::query(
            r#"
            INSERT INTO guest_quota (device_id, requests_made, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(device_id) DO UPDATE SET
                requests_made = excluded.requests_made,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(device_id)
        .bind(requests_made)
        .bind(gdf_common::time::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdf_common::db::init_in_memory_pool;

    #[tokio::test]
    async fn test_consume_until_limit() {
        let cache = GuestQuotaCache::new(init_in_memory_pool().await.unwrap(), 2);

        assert_eq!(cache.try_consume("dev-1").await.unwrap().requests_made, 1);
        assert_eq!(cache.try_consume("dev-1").await.unwrap().remaining, 0);
        assert!(matches!(
            cache.try_consume("dev-1").await,
            Err(ProfileError::QuotaExceeded { made: 2, limit: 2 })
        ));

        // Other devices are independent
        assert_eq!(cache.quota("dev-2").await.unwrap().requests_made, 0);
    }

    #[tokio::test]
    async fn test_sign_out_restores_persisted_counter() {
        let cache = GuestQuotaCache::new(init_in_memory_pool().await.unwrap(), 5);
        cache.try_consume("dev").await.unwrap();
        cache.try_consume("dev").await.unwrap();

        cache.on_sign_in("dev").await;
        let restored = cache.on_sign_out("dev").await.unwrap();

        assert_eq!(restored.requests_made, 2);
        assert_eq!(cache.quota("dev").await.unwrap().requests_made, 2);
    }
}
