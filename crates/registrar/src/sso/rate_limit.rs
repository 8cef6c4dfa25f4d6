//! Per-subject login cooldown.
//!
//! Every login request stamps the subject's last-attempt time, including
//! requests that are turned away, so hammering the endpoint keeps the
//! cooldown running.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use registrar_common::{Clock, RateLimitRecord, RegistrarError};

use crate::store::{RecordKind, SessionStore, swap_json};

pub struct LoginRateLimiter {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
}

impl LoginRateLimiter {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>, cooldown: Duration) -> Self {
        Self {
            store,
            clock,
            cooldown,
        }
    }

    /// Reject with the remaining wait if the subject tried within the
    /// cooldown, then record this attempt either way.
    pub async fn check_and_touch(&self, subject_id: &str) -> Result<(), RegistrarError> {
        if self.cooldown.is_zero() {
            return Ok(());
        }

        let now = self.clock.now();
        let record = RateLimitRecord {
            subject_id: subject_id.to_string(),
            last_attempt: now,
        };
        let previous = swap_json(
            self.store.as_ref(),
            RecordKind::RateLimit,
            subject_id,
            &record,
            self.cooldown,
        )
        .await?;

        let Some(previous) = previous else {
            return Ok(());
        };
        let elapsed = (now - previous.last_attempt).to_std().unwrap_or_default();
        if elapsed >= self.cooldown {
            return Ok(());
        }

        let remaining = self.cooldown - elapsed;
        let wait_secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
        info!(subject = %subject_id, wait_secs, "Login attempt inside cooldown");
        Err(RegistrarError::RateLimited { wait_secs })
    }
}
