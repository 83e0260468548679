//! Request executors
//!
//! The ticker never talks HTTP directly. Each tick it hands its
//! [`PollRequest`] to a [`RequestExecutor`] and gets back either a fully-read
//! [`PollResponse`] or a [`FetchError`]. [`HttpExecutor`] is the default,
//! backed by `reqwest`.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::trace;

use crate::error::FetchError;
use crate::request::{PollRequest, PollResponse};

/// Capability that turns a request descriptor into a response
///
/// Timeouts are the executor's responsibility; the ticker waits for
/// `execute` to return however long it takes.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    /// Execute the request once
    async fn execute(&self, request: &PollRequest) -> Result<PollResponse, FetchError>;
}

/// Default executor using a `reqwest::Client`
#[derive(Debug, Clone, Default)]
pub struct HttpExecutor {
    client: reqwest::Client,
}

impl HttpExecutor {
    /// Create an executor with a default client
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an executor using the given client (timeouts, proxies, TLS, ...)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// The underlying client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl RequestExecutor for HttpExecutor {
    async fn execute(&self, request: &PollRequest) -> Result<PollResponse, FetchError> {
        let started = Instant::now();

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.as_str())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await.map_err(classify)?.to_vec();

        trace!(%status, bytes = body.len(), "HttpExecutor: response read");

        Ok(PollResponse {
            status,
            headers,
            body,
            url: Some(url),
            tick: 0,
            received_at: Utc::now(),
            elapsed: started.elapsed(),
        })
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(err)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::header::HeaderValue;
    use reqwest::StatusCode;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn test_get_reads_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let executor = HttpExecutor::new();
        let response = executor
            .execute(&PollRequest::get(format!("{}/status", server.uri())))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.text(), "ok");
        assert_eq!(response.url.unwrap().path(), "/status");
    }

    #[tokio::test]
    async fn test_sends_method_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("x-test", "love"))
            .and(body_string("payload"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let request = PollRequest::post(format!("{}/hook", server.uri()))
            .with_header(
                reqwest::header::HeaderName::from_static("x-test"),
                HeaderValue::from_static("love"),
            )
            .with_body("payload");

        let response = HttpExecutor::new().execute(&request).await.unwrap();
        assert_eq!(response.status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_server_error_is_still_a_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        // Classifying 5xx is the ticker's job, not the executor's
        let response = HttpExecutor::new()
            .execute(&PollRequest::get(server.uri()))
            .await
            .unwrap();
        assert!(response.is_server_error());
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let request = PollRequest::get(server.uri()).with_timeout(Duration::from_millis(50));
        let err = HttpExecutor::new().execute(&request).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        let err = HttpExecutor::new()
            .execute(&PollRequest::get(format!("http://{}/", addr)))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }
}
