//! Login and logout.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::captcha::ChallengeData;
use super::envelope::{ApiError, Envelope, JsonBody};
use crate::sso::{LoginOutcome, LoginRequest, ManualCode};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    username: String,
    password: String,
    /// Challenge token, manual mode only
    #[serde(default)]
    token: Option<String>,
    /// Caller-read captcha code, manual mode only
    #[serde(default)]
    captcha: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginData {
    user_token: String,
    /// No application identifier; timetable calls will be refused
    degraded: bool,
    expires_at: DateTime<Utc>,
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<LoginBody>,
) -> Response {
    let username = body.username.trim().to_string();
    if username.is_empty() || body.password.is_empty() {
        return Envelope::<()>::with_code(400, "username and password are required", None)
            .into_response();
    }

    let token = body.token.filter(|t| !t.trim().is_empty());
    let code = body.captcha.filter(|c| !c.trim().is_empty());
    let manual = match (token, code) {
        (Some(challenge_token), Some(code)) => Some(ManualCode {
            challenge_token,
            code,
        }),
        (None, None) => None,
        _ => {
            return Envelope::<()>::with_code(
                400,
                "captcha token and code must be sent together",
                None,
            )
            .into_response();
        }
    };

    let outcome = state
        .choreographer
        .login(LoginRequest {
            username,
            password: body.password,
            manual,
        })
        .await;

    match outcome {
        Ok(LoginOutcome::Authenticated(session)) => Envelope::ok(LoginData {
            degraded: session.is_degraded(),
            user_token: session.token,
            expires_at: session.expires_at,
        })
        .into_response(),
        Ok(LoginOutcome::Rejected { message, challenge }) => Envelope::with_code(
            202,
            message,
            Some(ChallengeData::from_issued(challenge, state.clock.now())),
        )
        .into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct LogoutBody {
    token: String,
}

pub async fn logout(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<LogoutBody>,
) -> Result<Envelope<()>, ApiError> {
    state.choreographer.invalidate(&body.token).await?;
    Ok(Envelope::with_code(200, "logged out", None))
}
