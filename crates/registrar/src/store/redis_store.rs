//! Redis-backed store, shared by every instance behind the front door.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;

use registrar_common::{Clock, RegistrarError, SystemClock};

use super::{RecordKind, SessionStore, StoredRecord};

#[derive(Clone)]
pub struct RedisStore {
    /// Connection manager (auto-reconnecting)
    redis: ConnectionManager,
    clock: Arc<dyn Clock>,
}

impl RedisStore {
    /// Connect to Redis
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let redis = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self {
            redis,
            clock: Arc::new(SystemClock),
        })
    }

    fn key(kind: RecordKind, key: &str) -> String {
        format!("{}{}", kind.prefix(), key)
    }

    fn decode_live(&self, raw: Option<String>) -> Result<Option<String>, RegistrarError> {
        let Some(raw) = raw else {
            return Ok(None);
        };
        let record: StoredRecord = serde_json::from_str(&raw)
            .map_err(|e| RegistrarError::Store(format!("corrupt record: {}", e)))?;
        Ok(record.is_live(self.clock.now()).then_some(record.payload))
    }
}

fn store_err(e: redis::RedisError) -> RegistrarError {
    RegistrarError::Store(e.to_string())
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn put(
        &self,
        kind: RecordKind,
        key: &str,
        payload: String,
        ttl: Duration,
    ) -> Result<(), RegistrarError> {
        let record = StoredRecord::new(payload, self.clock.now(), ttl);
        let value =
            serde_json::to_string(&record).map_err(|e| RegistrarError::Internal(e.to_string()))?;

        // Redis rejects SETEX 0; records carry their own expiry anyway
        let ttl_secs = ttl.as_secs().max(1);

        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(Self::key(kind, key), value, ttl_secs)
            .await
            .map_err(store_err)
    }

    async fn get(&self, kind: RecordKind, key: &str) -> Result<Option<String>, RegistrarError> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.get(Self::key(kind, key)).await.map_err(store_err)?;
        self.decode_live(raw)
    }

    async fn swap(
        &self,
        kind: RecordKind,
        key: &str,
        payload: String,
        ttl: Duration,
    ) -> Result<Option<String>, RegistrarError> {
        let record = StoredRecord::new(payload, self.clock.now(), ttl);
        let value =
            serde_json::to_string(&record).map_err(|e| RegistrarError::Internal(e.to_string()))?;
        let key = Self::key(kind, key);
        let mut conn = self.redis.clone();

        // MULTI/EXEC so two writers cannot both see the same previous record
        let (raw,): (Option<String>,) = redis::pipe()
            .atomic()
            .get(&key)
            .set_ex(&key, value, ttl.as_secs().max(1))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        self.decode_live(raw)
    }

    async fn take(&self, kind: RecordKind, key: &str) -> Result<Option<String>, RegistrarError> {
        let key = Self::key(kind, key);
        let mut conn = self.redis.clone();

        // MULTI/EXEC so concurrent takers cannot both read the record
        let (raw, _deleted): (Option<String>, i64) = redis::pipe()
            .atomic()
            .get(&key)
            .del(&key)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        self.decode_live(raw)
    }

    async fn delete(&self, kind: RecordKind, key: &str) -> Result<(), RegistrarError> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(Self::key(kind, key))
            .await
            .map_err(store_err)
    }

    async fn ping(&self) -> Result<(), RegistrarError> {
        let mut conn = self.redis.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}
