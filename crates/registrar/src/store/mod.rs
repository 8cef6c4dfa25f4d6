//! Session persistence.
//!
//! Three record kinds share one contract: captcha challenges, authenticated
//! sessions, and per-subject login cooldowns. Every record carries its own
//! expiry, so a read past TTL is a miss on every backend whether or not the
//! record has been purged yet.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;

use registrar_common::RegistrarError;
use registrar_common::constants::redis_keys;

/// Record namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Pending captcha challenge (single use)
    Challenge,
    /// Authenticated portal session
    Session,
    /// Last login attempt per subject
    RateLimit,
}

impl RecordKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Challenge => redis_keys::CAPTCHA_PREFIX,
            Self::Session => redis_keys::SESSION_PREFIX,
            Self::RateLimit => redis_keys::RATELIMIT_PREFIX,
        }
    }
}

/// Envelope persisted by every backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub payload: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn new(payload: String, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            payload,
            expires_at: expiry(now, ttl),
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Keyed record storage with per-record TTL.
///
/// Records are independent; backends only need per-record atomicity.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store `payload` under `(kind, key)`, replacing any previous record
    async fn put(
        &self,
        kind: RecordKind,
        key: &str,
        payload: String,
        ttl: Duration,
    ) -> Result<(), RegistrarError>;

    /// Live payload under `(kind, key)`
    async fn get(&self, kind: RecordKind, key: &str) -> Result<Option<String>, RegistrarError>;

    /// Replace the record and return the live payload it displaced, in one step
    async fn swap(
        &self,
        kind: RecordKind,
        key: &str,
        payload: String,
        ttl: Duration,
    ) -> Result<Option<String>, RegistrarError>;

    /// Read and delete in one step; a second take of the same key misses
    async fn take(&self, kind: RecordKind, key: &str) -> Result<Option<String>, RegistrarError>;

    /// Remove a record; deleting a missing key is not an error
    async fn delete(&self, kind: RecordKind, key: &str) -> Result<(), RegistrarError>;

    /// Backend reachability
    async fn ping(&self) -> Result<(), RegistrarError>;

    /// Drop records past their TTL, returning how many went.
    ///
    /// Backends with native expiry have nothing to do.
    async fn purge_expired(&self) -> Result<usize, RegistrarError> {
        Ok(0)
    }
}

/// Generate an unguessable URL-safe token
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Create a record under a fresh token.
///
/// `build` receives the token so payloads can embed it.
pub async fn issue<T, F>(
    store: &dyn SessionStore,
    kind: RecordKind,
    ttl: Duration,
    build: F,
) -> Result<T, RegistrarError>
where
    T: Serialize,
    F: FnOnce(String) -> T,
{
    let token = generate_token();
    let record = build(token.clone());
    let payload = encode(&record)?;
    store.put(kind, &token, payload, ttl).await?;
    Ok(record)
}

/// Typed `swap`
pub async fn swap_json<T: Serialize + DeserializeOwned>(
    store: &dyn SessionStore,
    kind: RecordKind,
    key: &str,
    record: &T,
    ttl: Duration,
) -> Result<Option<T>, RegistrarError> {
    let payload = encode(record)?;
    store
        .swap(kind, key, payload, ttl)
        .await?
        .map(|raw| decode(&raw))
        .transpose()
}

/// Typed `get`
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn SessionStore,
    kind: RecordKind,
    key: &str,
) -> Result<Option<T>, RegistrarError> {
    store.get(kind, key).await?.map(|raw| decode(&raw)).transpose()
}

/// Typed `take`
pub async fn take_json<T: DeserializeOwned>(
    store: &dyn SessionStore,
    kind: RecordKind,
    key: &str,
) -> Result<Option<T>, RegistrarError> {
    store.take(kind, key).await?.map(|raw| decode(&raw)).transpose()
}

fn encode<T: Serialize>(record: &T) -> Result<String, RegistrarError> {
    serde_json::to_string(record).map_err(|e| RegistrarError::Internal(e.to_string()))
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, RegistrarError> {
    serde_json::from_str(raw).map_err(|e| RegistrarError::Store(format!("corrupt record: {}", e)))
}

pub(crate) fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
