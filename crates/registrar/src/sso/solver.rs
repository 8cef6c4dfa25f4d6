//! Captcha recognition backends.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use registrar_common::RegistrarError;

/// Turns a captcha image into a guess
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    async fn solve(&self, image: &[u8]) -> Result<String, RegistrarError>;
}

/// Recognition service reached over HTTP.
///
/// The image is POSTed as the raw body. The reply is either plain text or a
/// JSON object with a `result` field.
pub struct HttpCaptchaSolver {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct SolverReply {
    result: String,
}

impl HttpCaptchaSolver {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl CaptchaSolver for HttpCaptchaSolver {
    async fn solve(&self, image: &[u8]) -> Result<String, RegistrarError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| RegistrarError::NetworkFailure(format!("captcha solver: {}", e)))?;

        if !response.status().is_success() {
            return Err(RegistrarError::NetworkFailure(format!(
                "captcha solver returned HTTP {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RegistrarError::NetworkFailure(format!("captcha solver: {}", e)))?;
        let guess = parse_reply(&body);
        debug!(len = guess.len(), "Captcha solver answered");
        Ok(guess)
    }
}

fn parse_reply(body: &str) -> String {
    serde_json::from_str::<SolverReply>(body)
        .map(|reply| reply.result)
        .unwrap_or_else(|_| body.to_string())
        .trim()
        .to_string()
}
