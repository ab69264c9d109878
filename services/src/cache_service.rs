use anyhow::Result;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const KEY_PREFIX: &str = "orbit:";

/// Optional Redis cache for read-heavy aggregates. Every call is a no-op when
/// no Redis URL is configured.
pub struct CacheService {
    client: Option<redis::Client>,
}

impl CacheService {
    pub fn new(redis_url: Option<String>) -> Result<Self> {
        let client = match redis_url {
            Some(url) => Some(redis::Client::open(url)?),
            None => None,
        };

        Ok(Self { client })
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    fn key(key: &str) -> String {
        format!("{}{}", KEY_PREFIX, key)
    }

    pub async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        let Some(client) = &self.client else {
            return Ok(None);
        };
        let mut conn = client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(Self::key(key)).await?;

        match value {
            Some(v) => Ok(Some(serde_json::from_str(&v)?)),
            None => Ok(None),
        }
    }

    pub async fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>
    where
        T: Serialize,
    {
        let Some(client) = &self.client else {
            return Ok(());
        };
        let mut conn = client.get_multiplexed_async_connection().await?;
        let serialized = serde_json::to_string(value)?;
        let _: () = conn.set_ex(Self::key(key), serialized, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let Some(client) = &self.client else {
            return Ok(());
        };
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(Self::key(key)).await?;
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }
}
