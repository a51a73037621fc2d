//! The outgoing request built for each attempt.

use crate::{Error, Result};
use http::{header, HeaderMap, HeaderValue, Method};
use url::Url;

/// An HTTP request about to be handed to a [`Transport`](crate::transport::Transport).
///
/// Built fresh for every attempt of a call. Method, URL and body never differ
/// between attempts of the same call; headers are re-applied from scratch.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    /// The HTTP method.
    pub method: Method,

    /// The absolute target URL.
    pub url: Url,

    /// JSON-encoded request body, sent verbatim.
    pub body: Option<String>,

    /// Request headers.
    pub headers: HeaderMap,
}

impl OutgoingRequest {
    /// Creates a request with no body and no headers.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            body: None,
            headers: HeaderMap::new(),
        }
    }

    /// Sets a JSON body along with a JSON content type.
    pub fn with_json_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self
    }

    /// Returns the `Authorization` header, if one has been applied.
    pub fn authorization(&self) -> Option<&HeaderValue> {
        self.headers.get(header::AUTHORIZATION)
    }
}

/// Parses a caller-supplied URL, which must be absolute.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] if the string does not parse, and
/// [`Error::Configuration`] if it parses but has no host to talk to.
pub(crate) fn parse_absolute_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url)?;
    if parsed.cannot_be_a_base() || parsed.host_str().is_none() {
        return Err(Error::Configuration(format!(
            "URL must be absolute with a host: {}",
            url
        )));
    }
    Ok(parsed)
}
