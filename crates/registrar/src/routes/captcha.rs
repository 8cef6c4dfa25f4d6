//! Manual captcha challenge endpoint.

use axum::extract::State;
use serde::Serialize;

use registrar_common::IssuedChallenge;

use super::envelope::{ApiResult, Envelope};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ChallengeData {
    /// Challenge token to send back with the code
    pub token: String,
    /// `data:` URI of the captcha image
    pub image: String,
    pub expires_in_secs: i64,
}

impl ChallengeData {
    pub fn from_issued(challenge: IssuedChallenge, now: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            expires_in_secs: (challenge.expires_at - now).num_seconds().max(0),
            token: challenge.token,
            image: challenge.image,
        }
    }
}

/// Open a login form and return its captcha
pub async fn get_challenge(State(state): State<AppState>) -> ApiResult<ChallengeData> {
    let challenge = state.choreographer.issue_challenge().await?;

    tracing::debug!(
        token = %crate::sso::token_prefix(&challenge.token),
        "Issued captcha challenge"
    );

    Ok(Envelope::ok(ChallengeData::from_issued(
        challenge,
        state.clock.now(),
    )))
}
