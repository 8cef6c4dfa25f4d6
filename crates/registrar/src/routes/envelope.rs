//! `{code, msg, data}` response envelope.
//!
//! The HTTP status always equals `code`, so clients may branch on either.

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

use registrar_common::RegistrarError;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: 200,
            msg: None,
            data: Some(data),
        }
    }

    pub fn with_code(code: u16, msg: impl Into<String>, data: Option<T>) -> Self {
        Self {
            code,
            msg: Some(msg.into()),
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Handler error rendered through the envelope
#[derive(Debug)]
pub struct ApiError(pub RegistrarError);

impl From<RegistrarError> for ApiError {
    fn from(e: RegistrarError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(RegistrarError::BadRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.status_code();
        if code >= 500 {
            tracing::error!(code, error = %self.0, "Request failed");
        } else {
            tracing::debug!(code, error = %self.0, "Request refused");
        }

        let data = match self.0 {
            RegistrarError::RateLimited { wait_secs } => Some(json!({ "wait_secs": wait_secs })),
            _ => None,
        };
        Envelope::with_code(code, self.0.to_string(), data).into_response()
    }
}

pub type ApiResult<T> = Result<Envelope<T>, ApiError>;

/// JSON request body whose rejections are answered with an envelope
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}
