//! Request and response descriptors
//!
//! [`PollRequest`] is the template issued on every tick; [`PollResponse`] is
//! the fully-read answer that travels from the executor through the hooks to
//! exactly one worker.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::ConfigError;

/// The request issued on every tick
#[derive(Debug, Clone)]
pub struct PollRequest {
    /// HTTP method
    pub method: Method,

    /// Target URL, parsed when the ticker starts
    pub url: String,

    /// Request headers
    pub headers: HeaderMap,

    /// Optional request body
    pub body: Option<Vec<u8>>,

    /// Per-request timeout (None = executor default)
    pub timeout: Option<Duration>,
}

impl PollRequest {
    /// Create a request with the given method and URL
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// Create a GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Create a POST request
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Add a header
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the body
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Parse the URL, reporting it as a configuration error on failure
    pub fn parsed_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.url).map_err(|e| ConfigError::InvalidTarget {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }
}

/// A response read to completion by the request executor
#[derive(Debug, Clone)]
pub struct PollResponse {
    /// HTTP status
    pub status: StatusCode,

    /// Response headers
    pub headers: HeaderMap,

    /// Response body
    pub body: Vec<u8>,

    /// Final URL after redirects (None for synthetic responses)
    pub url: Option<Url>,

    /// Tick number that produced this response (1-based, 0 if unassigned)
    pub tick: u64,

    /// When the response was received
    pub received_at: DateTime<Utc>,

    /// Time spent executing the request
    pub elapsed: Duration,
}

impl PollResponse {
    /// Create a response with the given status and an empty body
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
            url: None,
            tick: 0,
            received_at: Utc::now(),
            elapsed: Duration::ZERO,
        }
    }

    /// Set the body
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Add a header
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the final URL
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// Whether the status counts as a server failure (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// Body decoded as UTF-8, lossily
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body decoded as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::CONTENT_TYPE;
    use serde::Deserialize;

    #[test]
    fn test_request_builder() {
        let request = PollRequest::post("http://localhost:8080/updates")
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_body(r#"{"offset":-1}"#)
            .with_timeout(Duration::from_secs(5));

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url, "http://localhost:8080/updates");
        assert_eq!(
            request.headers.get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(request.body.as_deref(), Some(&br#"{"offset":-1}"#[..]));
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_parsed_url_rejects_garbage() {
        let err = PollRequest::get("not a url").parsed_url().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTarget { ref url, .. } if url == "not a url"));

        let url = PollRequest::get("http://example.com/a?b=1")
            .parsed_url()
            .unwrap();
        assert_eq!(url.query(), Some("b=1"));
    }

    #[test]
    fn test_response_body_helpers() {
        #[derive(Deserialize)]
        struct Update {
            offset: i64,
        }

        let response = PollResponse::new(StatusCode::OK).with_body(r#"{"offset":42}"#);
        assert_eq!(response.text(), r#"{"offset":42}"#);
        assert_eq!(response.json::<Update>().unwrap().offset, 42);
        assert!(!response.is_server_error());
        assert!(PollResponse::new(StatusCode::BAD_GATEWAY).is_server_error());
    }
}
