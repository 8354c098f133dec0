//! Transport seam between the orchestrator and the HTTP stack.
//!
//! The orchestrator only ever talks to a [`Transport`]. [`ReqwestTransport`] is
//! the production implementation; tests substitute scripted transports.

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};

use crate::errors::{is_dns_message, TransportError};

/// Longest response body excerpt carried in a status error.
const ERROR_BODY_EXCERPT: usize = 512;

/// A fully resolved outgoing request.
#[derive(Clone, Debug)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// A response as received, before any decoding.
#[derive(Clone, Debug)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// `Retry-After` header expressed in whole seconds.
    pub fn retry_after(&self) -> Option<Duration> {
        self.headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    /// Turn a non-2xx response into the error the executor sees.
    pub fn into_status_error(self) -> TransportError {
        let retry_after = self.retry_after();
        let mut message = String::from_utf8_lossy(&self.body).into_owned();
        if message.len() > ERROR_BODY_EXCERPT {
            let mut end = ERROR_BODY_EXCERPT;
            while !message.is_char_boundary(end) {
                end -= 1;
            }
            message.truncate(end);
        }
        if message.trim().is_empty() {
            message = self
                .status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string();
        }

        TransportError::Status {
            status: self.status.as_u16(),
            message,
            retry_after,
        }
    }
}

/// Sends one request and reports what came back.
///
/// Implementations report every response, including non-2xx ones, as `Ok`;
/// `Err` is reserved for requests that produced no response at all.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// [`Transport`] backed by a `reqwest` client.
///
/// Timeouts are enforced by the executor, so the client is built without one.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        let client = Client::builder().build().unwrap_or_else(|_| Client::new());
        Self { client }
    }

    /// Use a pre-configured client (proxy, TLS roots, pooling).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(map_reqwest_error)?;
        debug!("Transport received {} ({} bytes)", status, body.len());

        Ok(TransportResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    let message = error_chain(&err);

    if err.is_timeout() {
        TransportError::TransportTimeout(message)
    } else if is_dns_message(&message) {
        TransportError::Dns(message)
    } else if err.is_connect() {
        TransportError::Connect(message)
    } else {
        TransportError::Other(message)
    }
}

/// Join an error with all of its sources, outermost first.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
