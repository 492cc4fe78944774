//! Redis caching for search results, offers and external lookups.
//!
//! Values are stored as JSON with a TTL. Read failures are logged and
//! treated as a miss so a Redis outage degrades to uncached behaviour.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Redis cache client with connection pooling.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    default_ttl: Duration,
}

impl RedisCache {
    pub async fn new(redis_url: &str, default_ttl_seconds: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        tracing::info!("Redis cache connected");

        Ok(Self {
            conn,
            default_ttl: Duration::from_secs(default_ttl_seconds),
        })
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    #[instrument(skip(self), fields(cache_hit))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.conn.clone();

        let hit = match conn.get::<_, Option<String>>(key).await {
            Ok(Some(data)) => match serde_json::from_str(&data) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = key, error = %e, "Failed to deserialize cached value");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                error!(key = key, error = %e, "Redis get error");
                None
            }
        };

        debug!(key = key, hit = hit.is_some(), "Cache lookup");
        tracing::Span::current().record("cache_hit", hit.is_some());
        hit
    }

    /// Set a value with the default TTL.
    #[instrument(skip(self, value))]
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set_with_ttl(key, value, self.default_ttl).await
    }

    #[instrument(skip(self, value))]
    pub async fn set_with_ttl<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        let mut conn = self.conn.clone();

        let data = serde_json::to_string(value).context("Failed to serialize value for cache")?;

        conn.set_ex::<_, _, ()>(key, data, ttl.as_secs())
            .await
            .context("Failed to set cache value")?;

        debug!(key = key, ttl_secs = ttl.as_secs(), "Cached value");
        Ok(())
    }

    /// Cache a value, logging instead of failing the request when Redis is down
    pub async fn set_logged<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        if let Err(e) = self.set_with_ttl(key, value, ttl).await {
            warn!(key = key, error = %e, "Failed to write cache entry");
        }
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();

        let deleted: i32 = conn.del(key).await.context("Failed to delete cache key")?;

        debug!(key = key, deleted = deleted > 0, "Cache delete");
        Ok(deleted > 0)
    }

    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis health check failed")?;
        Ok(())
    }
}

/// Cache key builders for consistent key formats.
pub mod keys {
    use uuid::Uuid;

    /// Compared offers for a normalised search
    pub fn search(query_key: &str) -> String {
        format!("flights:search:{}", query_key)
    }

    /// A single offer handed to a client; bookings may only reference these
    pub fn offer(offer_id: Uuid) -> String {
        format!("flights:offer:{}", offer_id)
    }

    pub fn flight_status(flight_iata: &str) -> String {
        format!("flights:status:{}", flight_iata)
    }

    pub fn airline(iata: &str) -> String {
        format!("ref:airline:{}", iata)
    }

    pub fn airport(iata: &str) -> String {
        format!("ref:airport:{}", iata)
    }

    /// Gateway event ids already applied, so webhook redeliveries are skipped early
    pub fn webhook_event(event_id: &str) -> String {
        format!("webhooks:stripe:{}", event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::keys;
    use uuid::Uuid;

    #[test]
    fn keys_are_namespaced() {
        let id = Uuid::nil();
        assert_eq!(
            keys::offer(id),
            "flights:offer:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(keys::flight_status("BA117"), "flights:status:BA117");
        assert_eq!(keys::airport("LHR"), "ref:airport:LHR");
        assert!(keys::search("LHR-JFK").starts_with("flights:search:"));
    }
}
