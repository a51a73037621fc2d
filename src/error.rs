//! Error types for REST calls.
//!
//! Every failed call surfaces exactly one [`Error`]. Variants produced from a
//! completed HTTP exchange carry the status code and the raw response body so
//! callers can debug failures without re-issuing the request.

use crate::config::ConfigKind;
use crate::transport::TransportError;
use http::StatusCode;
use std::time::Duration;

/// The main error type for REST calls.
///
/// # Examples
///
/// ```no_run
/// use restexec::{Empty, Error, Executor};
///
/// # async fn example() -> Result<(), Error> {
/// let executor = Executor::builder().build()?;
///
/// match executor.get("https://api.example.com/repos/1", Empty, &[]).await {
///     Ok(()) => println!("exists"),
///     Err(Error::NotFound { .. }) => println!("gone"),
///     Err(Error::RateLimited { retry_after, .. }) => {
///         eprintln!("slow down for {:?}", retry_after);
///     }
///     Err(e) => eprintln!("other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The remote rejected the supplied credentials (401 or 403).
    #[error("Authorization failed (status {status}): {raw_response}")]
    Authorization {
        /// The HTTP status code
        status: StatusCode,
        /// The raw response body
        raw_response: String,
    },

    /// The requested resource does not exist (404).
    #[error("Not found (status {status}): {raw_response}")]
    NotFound {
        /// The HTTP status code
        status: StatusCode,
        /// The raw response body
        raw_response: String,
    },

    /// Any other 4xx response.
    #[error("Bad request (status {status}): {raw_response}")]
    BadRequest {
        /// The HTTP status code
        status: StatusCode,
        /// The raw response body
        raw_response: String,
    },

    /// The remote failed to handle the request (5xx).
    #[error("Server error (status {status}): {raw_response}")]
    Server {
        /// The HTTP status code
        status: StatusCode,
        /// The raw response body
        raw_response: String,
    },

    /// The remote asked us to slow down (429).
    ///
    /// `retry_after` is resolved from the `Retry-After` header, falling back to
    /// [`crate::classify::DEFAULT_RETRY_AFTER`].
    #[error("Rate limited (status {status}), retry after {retry_after:?}: {raw_response}")]
    RateLimited {
        /// The HTTP status code
        status: StatusCode,
        /// The raw response body
        raw_response: String,
        /// How long the remote asked us to wait
        retry_after: Duration,
    },

    /// The connection could not be established or timed out.
    #[error("Connection failure: {0}")]
    ConnectionFailure(#[source] TransportError),

    /// Any other I/O failure during the exchange, such as a broken body stream.
    #[error("Client error: {0}")]
    GenericClient(#[source] TransportError),

    /// A status code or internal condition not covered by the other variants.
    ///
    /// `code` is the real status code for unmapped responses (e.g. a 3xx when
    /// redirects are not followed), or one of the negative sentinels
    /// [`Error::WAIT_CANCELLED`] / [`Error::WAIT_DEADLINE_EXCEEDED`].
    #[error("Unhandled response (code {code})")]
    Unhandled {
        /// Status code or internal sentinel
        code: i32,
        /// The raw response body, when there was a response
        raw_response: Option<String>,
    },

    /// The call succeeded but the response consumer rejected the content.
    #[error("Invalid response content (status {status}): {message}")]
    InvalidResponse {
        /// The HTTP status code
        status: StatusCode,
        /// The raw response body that was rejected
        raw_response: String,
        /// Why the consumer rejected it
        message: String,
    },

    /// Two configuration objects of the same kind were supplied to one call.
    ///
    /// This is raised before any network I/O.
    #[error("Duplicate {0} configuration supplied to a single call")]
    DuplicateConfiguration(ConfigKind),

    /// The target URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Invalid configuration was provided, such as an unusable header value.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Discriminant of [`Error`], handy for matching and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Authorization,
    NotFound,
    BadRequest,
    Server,
    RateLimited,
    ConnectionFailure,
    GenericClient,
    Unhandled,
    InvalidResponse,
    DuplicateConfiguration,
    InvalidUrl,
    Configuration,
}

impl Error {
    /// Sentinel code for a rate-limit wait interrupted by cancellation.
    pub const WAIT_CANCELLED: i32 = -1;

    /// Sentinel code for a rate-limit wait cut short by the call deadline.
    pub const WAIT_DEADLINE_EXCEEDED: i32 = -2;

    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Authorization { .. } => ErrorKind::Authorization,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::BadRequest { .. } => ErrorKind::BadRequest,
            Error::Server { .. } => ErrorKind::Server,
            Error::RateLimited { .. } => ErrorKind::RateLimited,
            Error::ConnectionFailure(_) => ErrorKind::ConnectionFailure,
            Error::GenericClient(_) => ErrorKind::GenericClient,
            Error::Unhandled { .. } => ErrorKind::Unhandled,
            Error::InvalidResponse { .. } => ErrorKind::InvalidResponse,
            Error::DuplicateConfiguration(_) => ErrorKind::DuplicateConfiguration,
            Error::InvalidUrl(_) => ErrorKind::InvalidUrl,
            Error::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Returns the HTTP status code if this error came from a response.
    ///
    /// `Unhandled` errors carrying a negative sentinel return `None`.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Authorization { status, .. }
            | Error::NotFound { status, .. }
            | Error::BadRequest { status, .. }
            | Error::Server { status, .. }
            | Error::RateLimited { status, .. }
            | Error::InvalidResponse { status, .. } => Some(*status),
            Error::Unhandled { code, .. } => u16::try_from(*code)
                .ok()
                .and_then(|c| StatusCode::from_u16(c).ok()),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::Authorization { raw_response, .. }
            | Error::NotFound { raw_response, .. }
            | Error::BadRequest { raw_response, .. }
            | Error::Server { raw_response, .. }
            | Error::RateLimited { raw_response, .. }
            | Error::InvalidResponse { raw_response, .. } => Some(raw_response),
            Error::Unhandled { raw_response, .. } => raw_response.as_deref(),
            _ => None,
        }
    }

    /// Returns the server-directed wait for `RateLimited` errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Returns `true` for errors caused by how the call was set up rather than
    /// by the remote or the network. These are raised before any I/O.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::DuplicateConfiguration(_) | Error::InvalidUrl(_) | Error::Configuration(_)
        )
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Connection(_) | TransportError::Timeout => {
                Error::ConnectionFailure(err)
            }
            TransportError::Io(_) | TransportError::InvalidRequest(_) => Error::GenericClient(err),
        }
    }
}

/// A specialized `Result` type for REST calls.
pub type Result<T> = std::result::Result<T, Error>;
