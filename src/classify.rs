//! Maps unsuccessful HTTP exchanges to typed errors.
//!
//! [`classify`] is pure: the same status, body and headers always produce the
//! same [`Error`]. Checks run in a fixed order and the first match wins, so the
//! specific 4xx codes are matched before the generic 4xx fallback.

use crate::Error;
use http::{header, HeaderMap, StatusCode};
use std::time::Duration;

/// Wait used when a 429 carries no usable `Retry-After` header.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_millis(5000);

/// Classifies a non-2xx response.
///
/// # Examples
///
/// ```
/// use restexec::classify::classify;
/// use restexec::ErrorKind;
/// use http::{HeaderMap, StatusCode};
///
/// let err = classify(StatusCode::FORBIDDEN, "denied".to_string(), &HeaderMap::new());
/// assert_eq!(err.kind(), ErrorKind::Authorization);
///
/// let err = classify(StatusCode::CONFLICT, String::new(), &HeaderMap::new());
/// assert_eq!(err.kind(), ErrorKind::BadRequest);
/// ```
pub fn classify(status: StatusCode, raw_response: String, headers: &HeaderMap) -> Error {
    match status.as_u16() {
        401 | 403 => Error::Authorization {
            status,
            raw_response,
        },
        404 => Error::NotFound {
            status,
            raw_response,
        },
        429 => Error::RateLimited {
            status,
            raw_response,
            retry_after: retry_after(headers),
        },
        400..=499 => Error::BadRequest {
            status,
            raw_response,
        },
        500..=599 => Error::Server {
            status,
            raw_response,
        },
        code => Error::Unhandled {
            code: i32::from(code),
            raw_response: Some(raw_response),
        },
    }
}

/// Resolves the wait requested by a `Retry-After` header given in whole seconds.
///
/// Anything missing or not an integer falls back to [`DEFAULT_RETRY_AFTER`].
pub fn retry_after(headers: &HeaderMap) -> Duration {
    parse_retry_after(headers).unwrap_or(DEFAULT_RETRY_AFTER)
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = headers.get(header::RETRY_AFTER)?.to_str().ok()?;
    let seconds = header.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(seconds))
}
