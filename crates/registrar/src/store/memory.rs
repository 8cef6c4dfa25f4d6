//! Process-local store.
//!
//! One coarse lock around a map. Expired records are skipped on read and only
//! removed by `take`, `delete`, or a sweep.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use registrar_common::{Clock, RegistrarError, SystemClock};

use super::{RecordKind, SessionStore, StoredRecord};

pub struct MemoryStore {
    records: RwLock<HashMap<(RecordKind, String), StoredRecord>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Purge expired records, returning how many were removed
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| record.is_live(now));
        before - records.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn put(
        &self,
        kind: RecordKind,
        key: &str,
        payload: String,
        ttl: Duration,
    ) -> Result<(), RegistrarError> {
        let record = StoredRecord::new(payload, self.clock.now(), ttl);
        self.records
            .write()
            .await
            .insert((kind, key.to_string()), record);
        Ok(())
    }

    async fn get(&self, kind: RecordKind, key: &str) -> Result<Option<String>, RegistrarError> {
        let now = self.clock.now();
        let records = self.records.read().await;
        Ok(records
            .get(&(kind, key.to_string()))
            .filter(|record| record.is_live(now))
            .map(|record| record.payload.clone()))
    }

    async fn swap(
        &self,
        kind: RecordKind,
        key: &str,
        payload: String,
        ttl: Duration,
    ) -> Result<Option<String>, RegistrarError> {
        let now = self.clock.now();
        let record = StoredRecord::new(payload, now, ttl);
        let mut records = self.records.write().await;
        Ok(records
            .insert((kind, key.to_string()), record)
            .filter(|previous| previous.is_live(now))
            .map(|previous| previous.payload))
    }

    async fn take(&self, kind: RecordKind, key: &str) -> Result<Option<String>, RegistrarError> {
        let now = self.clock.now();
        let mut records = self.records.write().await;
        Ok(records
            .remove(&(kind, key.to_string()))
            .filter(|record| record.is_live(now))
            .map(|record| record.payload))
    }

    async fn delete(&self, kind: RecordKind, key: &str) -> Result<(), RegistrarError> {
        self.records.write().await.remove(&(kind, key.to_string()));
        Ok(())
    }

    async fn ping(&self) -> Result<(), RegistrarError> {
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, RegistrarError> {
        Ok(self.sweep().await)
    }
}
