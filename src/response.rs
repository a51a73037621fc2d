//! Successful responses and the consumers that turn them into results.
//!
//! The executor drains the body before a consumer runs, so a consumer sees a
//! fully buffered [`Response`] and the connection has already been released
//! whether the consumer succeeds or fails.

use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::time::Duration;

/// A successful (2xx) response as seen by a [`ResponseConsumer`].
#[derive(Debug, Clone)]
pub struct Response {
    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// The raw response body.
    pub raw_body: String,

    /// Time from the first attempt until this response was read, including
    /// any rate-limit waits.
    pub latency: Duration,

    /// The number of network attempts it took, `1` if none were rate-limited.
    pub attempts: u32,
}

impl Response {
    /// Deserializes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns a [`ConsumeError`] carrying the serde message if the body does
    /// not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ConsumeError> {
        Ok(serde_json::from_str(&self.raw_body)?)
    }

    /// Returns a header value by name, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Returns `true` if the call needed more than one attempt.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }
}

/// A consumer rejected the response content.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ConsumeError {
    message: String,
}

impl ConsumeError {
    /// Creates an error with a human-readable reason.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The reason the content was rejected.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for ConsumeError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Turns a successful response into a caller-owned value.
///
/// Implemented for closures taking `&Response`, for [`Json`], and for
/// [`Empty`].
///
/// # Examples
///
/// ```
/// use restexec::{ConsumeError, Response, ResponseConsumer};
///
/// fn etag(response: &Response) -> Result<String, ConsumeError> {
///     response
///         .header("etag")
///         .map(str::to_owned)
///         .ok_or_else(|| ConsumeError::new("missing etag"))
/// }
///
/// fn assert_consumer<C: ResponseConsumer<String>>(_: C) {}
/// assert_consumer(etag);
/// ```
pub trait ResponseConsumer<T> {
    /// Consumes the response.
    ///
    /// # Errors
    ///
    /// Returns a [`ConsumeError`] if the content is malformed.
    fn consume(self, response: &Response) -> Result<T, ConsumeError>;
}

impl<T, F> ResponseConsumer<T> for F
where
    F: FnOnce(&Response) -> Result<T, ConsumeError>,
{
    fn consume(self, response: &Response) -> Result<T, ConsumeError> {
        self(response)
    }
}

/// Deserializes the body as JSON into `T`.
pub struct Json<T>(PhantomData<fn() -> T>);

impl<T> Json<T> {
    /// Creates the consumer.
    pub fn new() -> Self {
        Json(PhantomData)
    }
}

impl<T> Default for Json<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> ResponseConsumer<T> for Json<T> {
    fn consume(self, response: &Response) -> Result<T, ConsumeError> {
        response.json()
    }
}

/// Ignores the body; the call only reports success or failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct Empty;

impl ResponseConsumer<()> for Empty {
    fn consume(self, _response: &Response) -> Result<(), ConsumeError> {
        Ok(())
    }
}
