//! The narrow transport seam the executor is built on.
//!
//! A [`Transport`] performs exactly one HTTP exchange. It knows nothing about
//! credentials, classification or retries; the executor layers those on top.
//! [`ReqwestTransport`] is the production implementation.

use crate::request::OutgoingRequest;
use crate::{Error, Result};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

/// Failure of a single exchange below the HTTP protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection refused, DNS failure, TLS failure and the like.
    #[error("connection failed: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The exchange did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Reading or writing the exchange failed after the connection was up.
    #[error("i/o failure: {0}")]
    Io(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The transport refused to build the request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// A response body handle.
///
/// Reading consumes the handle; dropping it, read or not, releases the
/// underlying connection resource. Ownership therefore guarantees the handle
/// is released exactly once on every path.
pub trait ResponseBody: Send {
    /// Drains the body into a string and releases the handle.
    fn read_to_string(self) -> impl Future<Output = std::result::Result<String, TransportError>> + Send;
}

/// Status line and headers of a completed exchange, plus its unread body.
#[derive(Debug)]
pub struct TransportResponse<B> {
    /// The HTTP status code
    pub status: StatusCode,
    /// The response headers
    pub headers: HeaderMap,
    /// The body handle
    pub body: B,
}

/// Performs one HTTP exchange.
///
/// # Example
///
/// ```ignore
/// use restexec::transport::{Transport, TransportError, TransportResponse};
/// use restexec::OutgoingRequest;
///
/// struct Refusing;
///
/// impl Transport for Refusing {
///     type Body = String;
///
///     async fn send(
///         &self,
///         _request: OutgoingRequest,
///     ) -> Result<TransportResponse<String>, TransportError> {
///         Err(TransportError::Timeout)
///     }
/// }
/// ```
pub trait Transport: Send + Sync {
    /// The body handle type returned with each response.
    type Body: ResponseBody;

    /// Sends the request and returns once the status line and headers arrive.
    fn send(
        &self,
        request: OutgoingRequest,
    ) -> impl Future<Output = std::result::Result<TransportResponse<Self::Body>, TransportError>> + Send;
}

/// Anything the executor builder can turn into a [`Transport`].
///
/// A ready transport converts to itself; [`TransportOptions`] builds a
/// [`ReqwestTransport`].
pub trait IntoTransport {
    /// The transport produced.
    type Transport: Transport;

    /// Performs the conversion.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be constructed.
    fn into_transport(self) -> Result<Self::Transport>;
}

impl<T: Transport> IntoTransport for T {
    type Transport = T;

    fn into_transport(self) -> Result<T> {
        Ok(self)
    }
}

impl IntoTransport for TransportOptions {
    type Transport = ReqwestTransport;

    fn into_transport(self) -> Result<ReqwestTransport> {
        ReqwestTransport::from_options(&self)
    }
}

impl ResponseBody for String {
    async fn read_to_string(self) -> std::result::Result<String, TransportError> {
        Ok(self)
    }
}

/// Product-identifying header stamped on every outgoing request.
///
/// Not part of per-call configuration: it never varies per call and never
/// fails a call.
#[derive(Debug, Clone)]
pub struct ProductTag {
    name: HeaderName,
    value: HeaderValue,
}

impl ProductTag {
    /// Default header name.
    pub const DEFAULT_HEADER: &'static str = "x-restexec-client";

    /// Creates a tag with a custom header name and value.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn new(name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
        Ok(Self { name, value })
    }

    /// Returns the header name.
    pub fn name(&self) -> &HeaderName {
        &self.name
    }

    /// Returns the header value.
    pub fn value(&self) -> &HeaderValue {
        &self.value
    }

    /// Writes the tag into `headers`, replacing any previous value.
    pub fn stamp(&self, headers: &mut HeaderMap) {
        headers.insert(self.name.clone(), self.value.clone());
    }
}

impl Default for ProductTag {
    fn default() -> Self {
        let version = option_env!("CARGO_PKG_VERSION").unwrap_or("unknown");
        let value = HeaderValue::try_from(format!("restexec/{}", version))
            .unwrap_or_else(|_| HeaderValue::from_static("unknown"));
        Self {
            name: HeaderName::from_static(Self::DEFAULT_HEADER),
            value,
        }
    }
}

/// Settings for [`ReqwestTransport`].
///
/// Deserializable so it can sit inside an application's own config file.
///
/// # Examples
///
/// ```
/// use restexec::transport::TransportOptions;
///
/// let opts: TransportOptions = serde_json::from_str(r#"{ "timeout_ms": 5000 }"#).unwrap();
/// assert_eq!(opts.timeout_ms, 5000);
/// assert!(!opts.follow_redirects);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Per-attempt timeout in milliseconds. `0` disables it.
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds. `0` disables it.
    pub connect_timeout_ms: u64,
    /// Whether 3xx responses are followed. When `false` they surface as
    /// [`Error::Unhandled`] carrying the real status code.
    pub follow_redirects: bool,
    /// Redirect hop limit when `follow_redirects` is set.
    pub max_redirects: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            follow_redirects: false,
            max_redirects: 10,
        }
    }
}

/// Production transport using `reqwest`.
///
/// Cloning is cheap and shares the connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    inner: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with [`TransportOptions::default`].
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be built.
    pub fn new() -> Result<Self> {
        Self::from_options(&TransportOptions::default())
    }

    /// Creates a transport from explicit options.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be built.
    pub fn from_options(opts: &TransportOptions) -> Result<Self> {
        let redirect = if opts.follow_redirects {
            reqwest::redirect::Policy::limited(opts.max_redirects)
        } else {
            reqwest::redirect::Policy::none()
        };

        let mut builder = reqwest::Client::builder().redirect(redirect);
        if opts.timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(opts.timeout_ms));
        }
        if opts.connect_timeout_ms > 0 {
            builder = builder.connect_timeout(Duration::from_millis(opts.connect_timeout_ms));
        }

        let inner = builder.build().map_err(|e| {
            Error::Configuration(format!("Failed to build HTTP client: {}", e))
        })?;
        Ok(Self { inner })
    }

    /// Wraps an existing `reqwest::Client`.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { inner: client }
    }
}

/// Body handle backed by an unread `reqwest::Response`.
#[derive(Debug)]
pub struct ReqwestBody(reqwest::Response);

impl ResponseBody for ReqwestBody {
    async fn read_to_string(self) -> std::result::Result<String, TransportError> {
        self.0.text().await.map_err(map_reqwest_error)
    }
}

impl Transport for ReqwestTransport {
    type Body = ReqwestBody;

    async fn send(
        &self,
        request: OutgoingRequest,
    ) -> std::result::Result<TransportResponse<ReqwestBody>, TransportError> {
        let OutgoingRequest {
            method,
            url,
            body,
            headers,
        } = request;

        let mut builder = self.inner.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        Ok(TransportResponse {
            status: response.status(),
            headers: response.headers().clone(),
            body: ReqwestBody(response),
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connection(Box::new(e))
    } else if e.is_builder() {
        TransportError::InvalidRequest(e.to_string())
    } else {
        TransportError::Io(Box::new(e))
    }
}
