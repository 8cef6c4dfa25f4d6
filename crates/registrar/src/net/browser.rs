//! Cookie-carrying request helper.
//!
//! Each call attaches the jar's cookies for the target host, bounds the
//! exchange with the configured timeout, and absorbs every `Set-Cookie` on
//! the way back, including those on intermediate redirect hops.

use reqwest::Url;
use std::time::Duration;
use tracing::debug;

use registrar_common::{CookieJar, RegistrarError};

use super::{Method, PortalRequest, PortalResponse, PortalTransport, TransportError};

/// Headers and limits applied to every outbound request
#[derive(Debug, Clone)]
pub struct BrowserProfile {
    pub user_agent: String,
    pub referer: String,
    pub timeout: Duration,
}

pub struct Browser<'a> {
    transport: &'a dyn PortalTransport,
    profile: &'a BrowserProfile,
    jar: CookieJar,
}

impl<'a> Browser<'a> {
    pub fn new(transport: &'a dyn PortalTransport, profile: &'a BrowserProfile, jar: CookieJar) -> Self {
        Self {
            transport,
            profile,
            jar,
        }
    }

    pub fn jar(&self) -> &CookieJar {
        &self.jar
    }

    pub fn into_jar(self) -> CookieJar {
        self.jar
    }

    pub async fn get(&mut self, url: &str) -> Result<PortalResponse, RegistrarError> {
        let url = parse_url(url)?;
        self.send(Method::Get, url, None).await
    }

    pub async fn post_form(
        &mut self,
        url: &str,
        form: Vec<(String, String)>,
    ) -> Result<PortalResponse, RegistrarError> {
        let url = parse_url(url)?;
        self.send(Method::Post, url, Some(form)).await
    }

    /// GET a page and chase any redirects it answers with
    pub async fn visit(&mut self, url: &str, max_hops: usize) -> Result<PortalResponse, RegistrarError> {
        let base = parse_url(url)?;
        let response = self.send(Method::Get, base.clone(), None).await?;
        self.follow_redirects(base, response, max_hops).await
    }

    /// Follow `Location` headers with GETs until a non-redirect answer.
    ///
    /// `base` is the URL that produced `response`, used to resolve relative
    /// locations.
    pub async fn follow_redirects(
        &mut self,
        base: Url,
        mut response: PortalResponse,
        max_hops: usize,
    ) -> Result<PortalResponse, RegistrarError> {
        let mut current = base;
        let mut hops = 0;

        while let Some(location) = response.is_redirect().then(|| response.location()).flatten() {
            if hops >= max_hops {
                return Err(RegistrarError::NetworkFailure(format!(
                    "too many redirects (more than {})",
                    max_hops
                )));
            }
            let next = current.join(location).map_err(|e| {
                RegistrarError::NetworkFailure(format!("bad redirect target: {}", e))
            })?;
            debug!(hop = hops + 1, host = next.host_str().unwrap_or(""), "Following redirect");

            response = self.send(Method::Get, next.clone(), None).await?;
            current = next;
            hops += 1;
        }

        Ok(response)
    }

    async fn send(
        &mut self,
        method: Method,
        url: Url,
        form: Option<Vec<(String, String)>>,
    ) -> Result<PortalResponse, RegistrarError> {
        let host = url.host_str().unwrap_or_default().to_string();

        let mut headers = vec![
            ("User-Agent".to_string(), self.profile.user_agent.clone()),
            ("Referer".to_string(), self.profile.referer.clone()),
        ];
        if let Some(cookie) = self.jar.header_for(&host) {
            headers.push(("Cookie".to_string(), cookie));
        }

        let request = PortalRequest {
            method,
            url,
            headers,
            form,
        };

        let response = tokio::time::timeout(self.profile.timeout, self.transport.execute(request))
            .await
            .map_err(|_| network(TransportError::Timeout))?
            .map_err(network)?;

        for set_cookie in response.header_all("set-cookie") {
            self.jar.absorb(&host, set_cookie);
        }

        Ok(response)
    }
}

fn parse_url(url: &str) -> Result<Url, RegistrarError> {
    Url::parse(url).map_err(|e| RegistrarError::Internal(format!("invalid portal URL {}: {}", url, e)))
}

fn network(e: TransportError) -> RegistrarError {
    RegistrarError::NetworkFailure(e.to_string())
}
