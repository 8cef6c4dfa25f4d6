//! Common error types for Registrar components.

use thiserror::Error;

/// Errors surfaced by the handshake, the store, and the portal client
#[derive(Debug, Error)]
pub enum RegistrarError {
    /// Remote markup no longer carries a field the handshake needs
    #[error("Login page structure changed: missing {field}")]
    PageStructure { field: String },

    /// Challenge token unknown or past its TTL
    #[error("Captcha challenge expired or unknown")]
    CaptchaExpired,

    /// Salt unusable as cipher key material
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Identity provider rejected the credentials or captcha
    #[error("Login rejected: {message}")]
    AuthRejected { message: String },

    /// Transport error or timeout during an outbound call
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// Session token unknown, expired, or invalidated upstream
    #[error("Session invalid or expired, please log in again")]
    SessionInvalid,

    /// Login cooldown not yet elapsed
    #[error("Too many login attempts, retry in {wait_secs}s")]
    RateLimited { wait_secs: u64 },

    /// Session was created without an application identifier
    #[error("Session has no application identifier, please log in again")]
    ApplicationIdMissing,

    /// Portal answered with a payload of the wrong shape
    #[error("Unexpected upstream response: {0}")]
    UpstreamFormat(String),

    /// Request body missing, malformed, or incomplete
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Requested record does not exist upstream
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store backend failure
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RegistrarError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::PageStructure { .. } => 502,
            Self::CaptchaExpired => 400,
            Self::Encryption(_) => 500,
            Self::AuthRejected { .. } => 401,
            Self::NetworkFailure(_) => 502,
            Self::SessionInvalid => 401,
            Self::RateLimited { .. } => 429,
            Self::ApplicationIdMissing => 403,
            Self::UpstreamFormat(_) => 502,
            Self::BadRequest(_) => 400,
            Self::NotFound(_) => 404,
            Self::Store(_) => 503,
            Self::Config(_) => 500,
            Self::Internal(_) => 500,
        }
    }

    /// Returns true if a fresh handshake attempt may succeed where this one failed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AuthRejected { .. } | Self::NetworkFailure(_))
    }
}
