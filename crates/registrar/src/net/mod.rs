//! Outbound HTTP plumbing.
//!
//! The transport never follows redirects or keeps cookies on its own: the
//! handshake must see every hop's `Set-Cookie`, so both are handled by
//! [`Browser`] on top of a bare request/response exchange.

mod browser;
mod reqwest_transport;

pub use browser::{Browser, BrowserProfile};
pub use reqwest_transport::ReqwestTransport;

use async_trait::async_trait;
use reqwest::Url;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One outbound request, cookies already attached as a header
#[derive(Debug, Clone)]
pub struct PortalRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    /// URL-encoded form body
    pub form: Option<Vec<(String, String)>>,
}

/// Raw response; header names are lowercase
#[derive(Debug, Clone, Default)]
pub struct PortalResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl PortalResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a repeatable header such as `set-cookie`
    pub fn header_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308) && self.location().is_some()
    }

    pub fn location(&self) -> Option<&str> {
        self.header("location")
    }

    /// An HTML body where structured data was expected means the portal
    /// bounced the request to its login page
    pub fn is_html(&self) -> bool {
        self.header("content-type")
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),
}

/// Single request/response exchange with a remote host
#[async_trait]
pub trait PortalTransport: Send + Sync {
    async fn execute(&self, request: PortalRequest) -> Result<PortalResponse, TransportError>;
}
