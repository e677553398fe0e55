//! HTTP collaborator used by the fetch task
//!
//! The client performs exactly one exchange per call and never follows
//! redirects: redirect handling, timeouts and status policy belong to the
//! fetch task.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::cookies::SessionCookies;
use super::encoding::charset_of;
use crate::core::config::NetworkConfig;
use crate::core::error::{Result as ScoutResult, ScoutError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

/// One outgoing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub referer: Option<String>,
    /// Form-encoded payload, present for POST only
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: HttpMethod::Get,
            url,
            referer: None,
            body: None,
        }
    }

    pub fn post(url: Url, body: String) -> Self {
        Self {
            method: HttpMethod::Post,
            url,
            referer: None,
            body: Some(body),
        }
    }

    pub fn with_referer(mut self, referer: Option<String>) -> Self {
        self.referer = referer.filter(|r| !r.is_empty());
        self
    }
}

/// Response to one exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Raw `Location` header, if any
    pub location: Option<String>,
    /// Raw `Content-Type` header, if any
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            location: None,
            content_type: None,
            body: body.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Charset announced by the `Content-Type` header
    pub fn charset(&self) -> Option<String> {
        self.content_type.as_deref().and_then(charset_of)
    }

    pub fn redirect(status: u16, location: impl Into<String>) -> Self {
        Self {
            status,
            location: Some(location.into()),
            content_type: None,
            body: Bytes::new(),
        }
    }

    /// Only 301 and 302 are followed
    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302)
    }

    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("server replied {status}: {reason}")]
    Status { status: u16, reason: String },

    #[error("{0}")]
    Transport(String),

    #[error("operation canceled after {0:?} without a reply")]
    Timeout(Duration),

    #[error("redirect response without a Location header")]
    MissingLocation,

    #[error("invalid redirect target: {0}")]
    BadLocation(String),

    #[error("too many redirects (limit {0})")]
    TooManyRedirects(usize),
}

impl NetworkError {
    /// HTTP status code behind this error, 0 when the exchange produced none
    pub fn status(&self) -> u16 {
        match self {
            NetworkError::Status { status, .. } => *status,
            _ => 0,
        }
    }

    pub fn from_status(status: u16) -> Self {
        let reason = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown status")
            .to_string();
        NetworkError::Status { status, reason }
    }
}

/// Host-provided HTTP client
#[async_trait]
pub trait NetworkClient: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError>;
}

/// [`NetworkClient`] backed by a `reqwest` client
///
/// Cookies set by the sites land in the given [`SessionCookies`], where
/// downstream collaborators can read them back.
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(config: &NetworkConfig, cookies: &SessionCookies) -> ScoutResult<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .cookie_provider(cookies.jar())
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ScoutError::NetworkError(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NetworkClient for ReqwestClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
        debug!(method = %request.method, url = %request.url, "sending request");

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(request.url.clone()),
            HttpMethod::Post => self
                .client
                .post(request.url.clone())
                .header(
                    reqwest::header::CONTENT_TYPE,
                    "application/x-www-form-urlencoded",
                )
                .body(request.body.clone().unwrap_or_default()),
        };
        if let Some(referer) = &request.referer {
            builder = builder.header(reqwest::header::REFERER, referer.as_str());
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| NetworkError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        let location = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp
            .bytes()
            .await
            .map_err(|e| NetworkError::Transport(e.to_string()))?;

        debug!(url = %request.url, status, len = body.len(), "response received");
        Ok(HttpResponse {
            status,
            location,
            content_type,
            body,
        })
    }
}
