//! Per-call configuration applied to outgoing requests.
//!
//! A call takes any number of [`CallConfig`] values. They are folded into a
//! [`CallContext`] before any I/O; supplying two configurations of the same
//! [`ConfigKind`] is a programming error and fails the call up front with
//! [`Error::DuplicateConfiguration`].

use crate::request::OutgoingRequest;
use crate::{Error, Result};
use http::{header, HeaderValue};
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Something that mutates an outgoing request before it is sent.
///
/// Implementations must commute: applying them in any order yields the same
/// request.
pub trait ApplyToRequest {
    /// Applies this configuration to `request`.
    fn apply(&self, request: &mut OutgoingRequest);
}

/// Authentication capability stamped onto each attempt.
///
/// Resolving secret material is the caller's business; this only carries the
/// finished `Authorization` header value.
///
/// # Examples
///
/// ```
/// use restexec::Credential;
///
/// let anonymous = Credential::Anonymous;
/// let token = Credential::bearer("ghp_example").unwrap();
///
/// assert!(anonymous.header_value().is_none());
/// assert_eq!(token.header_value().unwrap(), "Bearer ghp_example");
/// ```
#[derive(Clone, Default)]
pub enum Credential {
    /// No authorization header is sent.
    #[default]
    Anonymous,

    /// Sends the contained value as the `Authorization` header.
    Token(HeaderValue),
}

impl Credential {
    /// Creates a bearer credential, adding the `Bearer ` prefix if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the token contains bytes not allowed in a header.
    pub fn bearer(token: impl AsRef<str>) -> Result<Self> {
        let trimmed = token.as_ref().trim();
        let has_prefix = trimmed
            .get(..7)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("bearer "));
        if has_prefix {
            Self::raw(trimmed)
        } else {
            Self::raw(format!("Bearer {}", trimmed))
        }
    }

    /// Creates a credential from a complete `Authorization` header value,
    /// e.g. `"token abc"` or `"Basic ..."`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value contains bytes not allowed in a header.
    pub fn raw(value: impl AsRef<str>) -> Result<Self> {
        let mut value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid authorization value: {}", e)))?;
        value.set_sensitive(true);
        Ok(Credential::Token(value))
    }

    /// Returns the header value this credential sends, if any.
    pub fn header_value(&self) -> Option<&HeaderValue> {
        match self {
            Credential::Anonymous => None,
            Credential::Token(value) => Some(value),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Anonymous => f.write_str("Anonymous"),
            Credential::Token(_) => f.debug_tuple("Token").field(&"<redacted>").finish(),
        }
    }
}

impl ApplyToRequest for Credential {
    fn apply(&self, request: &mut OutgoingRequest) {
        if let Credential::Token(value) = self {
            request.headers.insert(header::AUTHORIZATION, value.clone());
        }
    }
}

/// Retry policy for calls the remote rate-limits with a 429.
///
/// With `max_attempts = N` a call makes at most `N + 1` network attempts. The
/// wait between attempts is whatever each 429 response asks for.
///
/// # Examples
///
/// ```
/// use restexec::RetryOnRateLimit;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// let shutdown = CancellationToken::new();
/// let policy = RetryOnRateLimit::new(3)
///     .with_max_wait(Duration::from_secs(60))
///     .with_deadline(Duration::from_secs(300))
///     .with_cancellation(shutdown.child_token());
///
/// assert_eq!(policy.max_attempts(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct RetryOnRateLimit {
    max_attempts: u32,
    max_wait: Option<Duration>,
    deadline: Option<Duration>,
    cancellation: Option<CancellationToken>,
}

impl RetryOnRateLimit {
    /// Creates a policy allowing up to `max_attempts` retries.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            max_wait: None,
            deadline: None,
            cancellation: None,
        }
    }

    /// Caps any single server-directed wait.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    /// Bounds the whole call, measured from its start. A wait still pending at
    /// the deadline ends the call with [`Error::WAIT_DEADLINE_EXCEEDED`].
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Cancelling `token` during a wait ends the call with
    /// [`Error::WAIT_CANCELLED`].
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// The inclusive retry ceiling.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The cap on a single wait, if any.
    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait
    }

    /// The whole-call deadline, if any.
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// The cancellation token, if any.
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }
}

impl ApplyToRequest for RetryOnRateLimit {
    // The policy travels in the call context, not on the request.
    fn apply(&self, _request: &mut OutgoingRequest) {}
}

/// Identity used for duplicate detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKind {
    /// A [`Credential`].
    Credential,
    /// A [`RetryOnRateLimit`] policy.
    RetryOnRateLimit,
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigKind::Credential => f.write_str("credential"),
            ConfigKind::RetryOnRateLimit => f.write_str("retry-on-rate-limit"),
        }
    }
}

/// One configuration object supplied to a call.
#[derive(Debug, Clone)]
pub enum CallConfig {
    /// Authentication.
    Credential(Credential),
    /// Rate-limit retry policy.
    RetryOnRateLimit(RetryOnRateLimit),
}

impl CallConfig {
    /// Returns the identity of this configuration.
    pub fn kind(&self) -> ConfigKind {
        match self {
            CallConfig::Credential(_) => ConfigKind::Credential,
            CallConfig::RetryOnRateLimit(_) => ConfigKind::RetryOnRateLimit,
        }
    }
}

impl ApplyToRequest for CallConfig {
    fn apply(&self, request: &mut OutgoingRequest) {
        match self {
            CallConfig::Credential(credential) => credential.apply(request),
            CallConfig::RetryOnRateLimit(policy) => policy.apply(request),
        }
    }
}

impl From<Credential> for CallConfig {
    fn from(credential: Credential) -> Self {
        CallConfig::Credential(credential)
    }
}

impl From<RetryOnRateLimit> for CallConfig {
    fn from(policy: RetryOnRateLimit) -> Self {
        CallConfig::RetryOnRateLimit(policy)
    }
}

/// The validated configuration of one call, at most one of each kind.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Credential to stamp on each attempt.
    pub credential: Option<Credential>,
    /// Retry policy consulted when an attempt is rate-limited.
    pub retry: Option<RetryOnRateLimit>,
}

impl CallContext {
    /// Folds `configs` into a context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateConfiguration`] if two configurations share a
    /// [`ConfigKind`].
    pub fn from_configs(configs: &[CallConfig]) -> Result<Self> {
        let mut context = CallContext::default();
        for config in configs {
            match config {
                CallConfig::Credential(credential) => {
                    fill_once(&mut context.credential, credential, config.kind())?
                }
                CallConfig::RetryOnRateLimit(policy) => {
                    fill_once(&mut context.retry, policy, config.kind())?
                }
            }
        }
        Ok(context)
    }
}

impl ApplyToRequest for CallContext {
    fn apply(&self, request: &mut OutgoingRequest) {
        if let Some(credential) = &self.credential {
            credential.apply(request);
        }
        if let Some(policy) = &self.retry {
            policy.apply(request);
        }
    }
}

fn fill_once<T: Clone>(slot: &mut Option<T>, value: &T, kind: ConfigKind) -> Result<()> {
    if slot.is_some() {
        return Err(Error::DuplicateConfiguration(kind));
    }
    *slot = Some(value.clone());
    Ok(())
}
