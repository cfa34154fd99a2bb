//! HTTP seam towards the vendor cloud.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::{Endpoint, SessionError};

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://appv3.tt-monitor.com/topaze";
/// Per-call network timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const USER_AGENT: &str = "eOne/1.12.1.2 CFNetwork/1333.0.4 Darwin/21.5.0 \
WebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148";
const APP_VERSION: &str = "1.9.1";
const IDENTITY_PROVIDER: &str = "JANRAIN";
const VENDOR: &str = "diagral";
const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

// ---------------------------------------------------------------------------
// Raw response
// ---------------------------------------------------------------------------

/// Status code and body of a remote call, uninterpreted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// HTTP 200. Other 2xx codes are not success for this API.
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    pub fn text(&self) -> &str {
        &self.body
    }
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Sends one request to the vendor API.
///
/// `bearer` is `None` only for [`Endpoint::Login`]. Implementations return
/// `Err` only for failures below HTTP (connection, TLS, timeout); any
/// status code is an `Ok` response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        endpoint: Endpoint,
        bearer: Option<&str>,
        body: Value,
    ) -> Result<RawResponse, SessionError>;
}

// ---------------------------------------------------------------------------
// reqwest implementation
// ---------------------------------------------------------------------------

/// reqwest-backed transport carrying the vendor's fixed header set.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, SessionError> {
        Self::new_with_base_url(DEFAULT_BASE_URL.to_string(), timeout)
    }

    pub fn new_with_base_url(base_url: String, timeout: Duration) -> Result<Self, SessionError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(vendor_headers())
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::Transport(format!("http client build failed: {e}")))?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), endpoint.path())
    }
}

fn vendor_headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
    h.insert(
        HeaderName::from_static("x-app-version"),
        HeaderValue::from_static(APP_VERSION),
    );
    h.insert(
        HeaderName::from_static("x-identity-provider"),
        HeaderValue::from_static(IDENTITY_PROVIDER),
    );
    h.insert(
        HeaderName::from_static("ttmsessionidnotrequired"),
        HeaderValue::from_static("true"),
    );
    h.insert(
        HeaderName::from_static("x-vendor"),
        HeaderValue::from_static(VENDOR),
    );
    h
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        endpoint: Endpoint,
        bearer: Option<&str>,
        body: Value,
    ) -> Result<RawResponse, SessionError> {
        let payload = serde_json::to_vec(&body)
            .map_err(|e| SessionError::Configuration(format!("{endpoint}: encode failed: {e}")))?;

        let mut req = self
            .http
            .post(self.url_for(endpoint))
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(payload);
        if let Some(token) = bearer.filter(|_| !endpoint.is_login()) {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| SessionError::Transport(format!("{endpoint}: {e}")))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| SessionError::Transport(format!("{endpoint}: body read failed: {e}")))?;

        debug!(endpoint = %endpoint, status, "remote call");
        Ok(RawResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_and_path_once() {
        let t = HttpTransport::new_with_base_url(
            "http://127.0.0.1:9/topaze/".to_string(),
            DEFAULT_TIMEOUT,
        )
        .unwrap();
        assert_eq!(
            t.url_for(Endpoint::SystemState),
            "http://127.0.0.1:9/topaze/status/getSystemState"
        );
    }

    #[test]
    fn raw_response_only_200_is_ok() {
        assert!(RawResponse::new(200, "{}").is_ok());
        assert!(!RawResponse::new(204, "").is_ok());
        assert!(!RawResponse::new(500, "").is_ok());
    }
}
