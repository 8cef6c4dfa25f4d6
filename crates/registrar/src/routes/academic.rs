//! Grade, timetable and rank queries.

use axum::extract::State;
use serde::Deserialize;

use registrar_common::{GradeRecord, RankSummary, RegistrarError, TimetableView};

use super::envelope::{ApiError, ApiResult, Envelope, JsonBody};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TokenBody {
    token: String,
}

#[derive(Debug, Deserialize)]
pub struct TimetableBody {
    token: String,
    #[serde(default, alias = "xnxq")]
    semester: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RankingBody {
    token: String,
    /// Semester code, or `all`
    #[serde(default)]
    semester: Option<String>,
    /// Defaults to the session's own student number
    #[serde(default)]
    student_id: Option<String>,
}

pub async fn grades(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<TokenBody>,
) -> ApiResult<Vec<GradeRecord>> {
    let session = state.choreographer.session(&body.token).await?;
    let result = state.portal.grades(&session).await;
    settle(&state, &body.token, result).await
}

pub async fn timetable(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<TimetableBody>,
) -> ApiResult<TimetableView> {
    let semester = body
        .semester
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| state.config.default_semester.clone());

    let session = state.choreographer.session(&body.token).await?;
    let result = state.portal.timetable(&session, &semester).await;
    settle(&state, &body.token, result).await
}

pub async fn rankings(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RankingBody>,
) -> ApiResult<RankSummary> {
    let semester = body.semester.unwrap_or_else(|| "all".to_string());

    let session = state.choreographer.session(&body.token).await?;
    let result = state
        .portal
        .rankings(&session, &semester, body.student_id.as_deref())
        .await;
    settle(&state, &body.token, result).await
}

/// Wrap a portal result, dropping the session if the portal no longer
/// honours it
async fn settle<T>(
    state: &AppState,
    token: &str,
    result: Result<T, RegistrarError>,
) -> ApiResult<T>
where
    T: serde::Serialize,
{
    if let Err(RegistrarError::SessionInvalid) = &result {
        if let Err(e) = state.choreographer.invalidate(token).await {
            tracing::warn!(error = %e, "Failed to drop invalidated session");
        }
    }
    result.map(Envelope::ok).map_err(ApiError::from)
}
