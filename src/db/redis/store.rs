use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;

use crate::db::shown::ShownStore;
use crate::error::AppResult;
use crate::models::ShownEntry;

const KEY_PREFIX: &str = "shown:";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    Shown(String),
}

impl Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKey::Shown(customer_id) => write!(f, "{}{}", KEY_PREFIX, customer_id),
        }
    }
}

/// Creates a Redis client for the shown-product store
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Shown-product store keeping one Redis list per customer
///
/// Each list holds JSON-encoded entries in append order. Every append
/// refreshes the key's TTL to the selection window, so a customer who has
/// not been served for a full window drops out of Redis entirely.
#[derive(Clone)]
pub struct RedisShownStore {
    redis_client: Client,
    ttl_secs: i64,
}

impl RedisShownStore {
    pub fn new(redis_client: Client, ttl_secs: i64) -> Self {
        Self {
            redis_client,
            ttl_secs: ttl_secs.max(1),
        }
    }

    fn decode(key: &StoreKey, raw: Vec<String>) -> Vec<ShownEntry> {
        raw.into_iter()
            .filter_map(|json| match serde_json::from_str::<ShownEntry>(&json) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping undecodable shown entry");
                    None
                }
            })
            .collect()
    }

    async fn customer_keys(&self) -> AppResult<Vec<String>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let keys: Vec<String> = conn.keys(format!("{}*", KEY_PREFIX)).await?;
        Ok(keys)
    }
}

#[async_trait]
impl ShownStore for RedisShownStore {
    async fn entries(&self, customer_id: &str) -> AppResult<Vec<ShownEntry>> {
        let key = StoreKey::Shown(customer_id.to_string());
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let raw: Vec<String> = conn.lrange(key.to_string(), 0, -1).await?;
        Ok(Self::decode(&key, raw))
    }

    async fn record(&self, customer_id: &str, entry: ShownEntry) -> AppResult<()> {
        let key = StoreKey::Shown(customer_id.to_string()).to_string();
        let json = serde_json::to_string(&entry)?;

        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = redis::pipe()
            .atomic()
            .rpush(&key, json)
            .ignore()
            .expire(&key, self.ttl_secs)
            .ignore()
            .query_async(&mut conn)
            .await?;

        tracing::debug!(key = %key, ttl = self.ttl_secs, "Recorded shown product");
        Ok(())
    }

    async fn clear_customer(&self, customer_id: &str) -> AppResult<()> {
        let key = StoreKey::Shown(customer_id.to_string());
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(key.to_string()).await?;
        tracing::info!(customer_id = %customer_id, "Cleared shown products");
        Ok(())
    }

    async fn clear_all(&self) -> AppResult<()> {
        let keys = self.customer_keys().await?;
        if !keys.is_empty() {
            let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
            let _: () = conn.del(&keys).await?;
        }
        tracing::info!(customers = keys.len(), "Cleared all shown products");
        Ok(())
    }

    async fn prune(&self, before: DateTime<Utc>) -> AppResult<usize> {
        let mut removed = 0;
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;

        for raw_key in self.customer_keys().await? {
            let customer_id = raw_key.trim_start_matches(KEY_PREFIX).to_string();
            let key = StoreKey::Shown(customer_id);
            let raw: Vec<String> = conn.lrange(&raw_key, 0, -1).await?;
            let total = raw.len();

            let kept: Vec<String> = Self::decode(&key, raw)
                .into_iter()
                .filter(|e| e.is_active(before))
                .map(|e| serde_json::to_string(&e))
                .collect::<Result<_, _>>()?;

            if kept.len() == total {
                continue;
            }
            removed += total - kept.len();

            let mut pipe = redis::pipe();
            pipe.atomic().del(&raw_key).ignore();
            if !kept.is_empty() {
                pipe.rpush(&raw_key, kept).ignore();
                pipe.expire(&raw_key, self.ttl_secs).ignore();
            }
            let _: () = pipe.query_async(&mut conn).await?;
        }

        Ok(removed)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
