//! One-shot HTTP delivery of a response request plus the retry policy
//! around it.
//!
//! A [`Transport`] performs exactly one attempt. [`send_with_retry`] wraps
//! attempts in exponential backoff, and [`send_within`] bounds the whole
//! sending phase by the configured HTTP timeout. Once a byte stream has been
//! handed out nothing is retried.

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::api::ResponseRequest;
use crate::core::config::ClientConfig;
use crate::core::log_sink::LogSink;
use crate::utils::url::construct_api_url;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

const POOL_MAX_IDLE_PER_HOST: usize = 10;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request never got a response: refused, reset, DNS, TLS.
    Connection(String),
    /// The server answered with a 5xx status.
    ServerStatus { status: u16, body: String },
    /// Reading the body failed after the stream started.
    Stream(String),
    /// The sending phase ran past the configured budget.
    Timeout(Duration),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Connection(msg) => write!(f, "connection failed: {msg}"),
            TransportError::ServerStatus { status, body } => {
                write!(f, "server error: status {status}")?;
                if !body.is_empty() {
                    write!(f, ": {body}")?;
                }
                Ok(())
            }
            TransportError::Stream(msg) => write!(f, "stream read failed: {msg}"),
            TransportError::Timeout(after) => {
                write!(f, "request timed out after {}s", after.as_secs_f64())
            }
        }
    }
}

impl std::error::Error for TransportError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The server rejected the request with a non-5xx, non-success status.
    ClientStatus { status: u16, body: String },
    /// A data block was not valid JSON.
    MalformedEvent { event_type: String, message: String },
    /// A stream line was not valid UTF-8.
    InvalidEncoding(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::ClientStatus { status, body } => {
                write!(f, "api error: status {status}")?;
                if !body.is_empty() {
                    write!(f, ": {body}")?;
                }
                Ok(())
            }
            ProtocolError::MalformedEvent {
                event_type,
                message,
            } => {
                if event_type.is_empty() {
                    write!(f, "malformed event: {message}")
                } else {
                    write!(f, "malformed {event_type} event: {message}")
                }
            }
            ProtocolError::InvalidEncoding(msg) => write!(f, "invalid UTF-8 in stream: {msg}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    Transport(TransportError),
    Protocol(ProtocolError),
}

impl StreamError {
    /// Connection failures and 5xx responses may succeed on another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StreamError::Transport(
                TransportError::Connection(_) | TransportError::ServerStatus { .. }
            )
        )
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Transport(err) => err.fmt(f),
            StreamError::Protocol(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StreamError::Transport(err) => Some(err),
            StreamError::Protocol(err) => Some(err),
        }
    }
}

impl From<TransportError> for StreamError {
    fn from(err: TransportError) -> Self {
        StreamError::Transport(err)
    }
}

impl From<ProtocolError> for StreamError {
    fn from(err: ProtocolError) -> Self {
        StreamError::Protocol(err)
    }
}

/// A single attempt at opening a streamed response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, request: &ResponseRequest) -> Result<ByteStream, StreamError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay,
        }
    }

    /// Wait before retry `attempt` (0-based): `base_delay * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Opens a stream, retrying transient failures with exponential backoff.
///
/// `sleep` performs the wait between attempts; production passes
/// `tokio::time::sleep`. When retries run out the last error is returned as
/// is.
pub async fn send_with_retry<T, S, F>(
    transport: &T,
    request: &ResponseRequest,
    policy: &RetryPolicy,
    log: &LogSink,
    mut sleep: S,
) -> Result<ByteStream, StreamError>
where
    T: Transport + ?Sized,
    S: FnMut(Duration) -> F,
    F: Future<Output = ()>,
{
    let mut attempt = 0;
    loop {
        match transport.open(request).await {
            Ok(stream) => return Ok(stream),
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                log.warn(format!(
                    "Request failed ({err}); retrying in {}ms (attempt {}/{})",
                    delay.as_millis(),
                    attempt + 1,
                    policy.max_retries
                ));
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// [`send_with_retry`] with real sleeps, bounded by `budget` overall.
pub async fn send_within<T>(
    transport: &T,
    request: &ResponseRequest,
    policy: &RetryPolicy,
    budget: Duration,
    log: &LogSink,
) -> Result<ByteStream, StreamError>
where
    T: Transport + ?Sized,
{
    match tokio::time::timeout(
        budget,
        send_with_retry(transport, request, policy, log, tokio::time::sleep),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(budget).into()),
    }
}

/// `reqwest` transport for `POST /v1/responses`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let client = build_http_client(config.http_timeout)?;
        Ok(Self::with_client(client, &config.api_url(), config.http_timeout))
    }

    /// `timeout` should match the one `client` was built with; it is only
    /// used to report timeouts.
    pub fn with_client(client: reqwest::Client, api_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            endpoint: construct_api_url(api_url, "responses"),
            timeout,
        }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Pooled client shared by every request of a session.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, TransportError> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .tcp_keepalive(TCP_KEEPALIVE)
        .timeout(timeout)
        .build()
        .map_err(|err| TransportError::Connection(err.to_string()))
}

fn classify_send_error(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else {
        TransportError::Connection(err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &ResponseRequest) -> Result<ByteStream, StreamError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .json(request)
            .send()
            .await
            .map_err(|err| classify_send_error(err, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map(|text| summarize_error_body(&text))
                .unwrap_or_default();
            let status = status.as_u16();
            return Err(if (500..600).contains(&status) {
                TransportError::ServerStatus { status, body }.into()
            } else {
                ProtocolError::ClientStatus { status, body }.into()
            });
        }

        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|err| TransportError::Stream(err.to_string()))
        });
        Ok(Box::pin(stream))
    }
}

/// Reduces an error body to one line, preferring the JSON `error.message`.
pub(crate) fn summarize_error_body(text: &str) -> String {
    let trimmed = text.trim();
    let summary = serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(|v| v.as_str())
                .or_else(|| value.get("error").and_then(|v| v.as_str()))
                .or_else(|| value.get("message").and_then(|v| v.as_str()))
                .map(str::to_owned)
        })
        .unwrap_or_else(|| trimmed.to_string());
    summary.split_whitespace().collect::<Vec<_>>().join(" ")
}
