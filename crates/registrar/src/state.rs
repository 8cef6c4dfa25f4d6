//! Application state and shared resources.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use registrar_common::{Clock, SystemClock};

use crate::config::{AppConfig, StoreBackend};
use crate::net::{PortalTransport, ReqwestTransport};
use crate::portal::PortalClient;
use crate::sso::{CaptchaSolver, HttpCaptchaSolver, LoginChoreographer};
use crate::store::{MemoryStore, RedisStore, SessionStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Challenges, sessions and login cooldowns
    pub store: Arc<dyn SessionStore>,

    /// Login handshake and session lifecycle
    pub choreographer: Arc<LoginChoreographer>,

    /// Grade, timetable and rank queries
    pub portal: Arc<PortalClient>,

    /// Time source shared with the store and handshake
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Create application state, connecting the configured store backend
    pub async fn new(config: AppConfig) -> Result<Self> {
        let store: Arc<dyn SessionStore> = match config.store {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::Redis => Arc::new(
                RedisStore::connect(&config.redis_url)
                    .await
                    .context("Failed to initialise Redis store")?,
            ),
        };

        let timeout = Duration::from_secs(config.portal.request_timeout_secs);
        let transport = Arc::new(ReqwestTransport::new(timeout)?);

        let solver = match config.captcha.solver_url.as_deref() {
            Some(url) => {
                let solver = HttpCaptchaSolver::new(url, timeout)
                    .context("Failed to build captcha solver client")?;
                Some(Arc::new(solver) as Arc<dyn CaptchaSolver>)
            }
            None => {
                tracing::warn!("No captcha solver configured, every login needs a manual code");
                None
            }
        };

        Ok(Self::from_parts(
            config,
            store,
            transport,
            solver,
            Arc::new(SystemClock),
        ))
    }

    /// Assemble state from explicit collaborators
    pub fn from_parts(
        config: AppConfig,
        store: Arc<dyn SessionStore>,
        transport: Arc<dyn PortalTransport>,
        solver: Option<Arc<dyn CaptchaSolver>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let choreographer = Arc::new(LoginChoreographer::new(
            &config,
            transport.clone(),
            solver,
            store.clone(),
            clock.clone(),
        ));
        let portal = Arc::new(PortalClient::new(&config, transport, clock.clone()));

        Self {
            config,
            store,
            choreographer,
            portal,
            clock,
        }
    }
}
