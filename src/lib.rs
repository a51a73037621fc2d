//! # restexec - REST call execution with typed failures
//!
//! restexec issues HTTP requests to a remote REST service, applies per-call
//! configuration (credentials, a rate-limit retry policy), maps every failure
//! to a typed [`Error`], and transparently waits out `429 Too Many Requests`
//! responses when the call asks it to.
//!
//! ## Quick Start
//!
//! ```no_run
//! use restexec::{Credential, Executor, Json, RetryOnRateLimit};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct PullRequest {
//!     id: u64,
//!     title: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), restexec::Error> {
//!     let executor = Executor::builder().build()?;
//!     let credential = Credential::bearer("my-token")?;
//!
//!     let pr: PullRequest = executor
//!         .get(
//!             "https://api.example.com/repositories/acme/core/pullrequests/7",
//!             Json::new(),
//!             &[credential.clone().into(), RetryOnRateLimit::new(3).into()],
//!         )
//!         .await?;
//!     println!("#{}: {}", pr.id, pr.title);
//!
//!     let body = serde_json::json!({ "state": "SUCCESSFUL", "key": "build-1" }).to_string();
//!     executor
//!         .post(
//!             "https://api.example.com/repositories/acme/core/commit/abc/statuses/build",
//!             body,
//!             restexec::Empty,
//!             &[credential.into()],
//!         )
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Each call returns either the consumer's result or exactly one error:
//!
//! ```no_run
//! use restexec::{Error, Executor, Json};
//!
//! # async fn example() -> Result<(), Error> {
//! # let executor = Executor::builder().build()?;
//! match executor.get::<serde_json::Value, _>("https://api.example.com/x", Json::new(), &[]).await {
//!     Ok(value) => println!("Success: {:?}", value),
//!     Err(Error::Authorization { status, .. }) => eprintln!("credentials rejected ({})", status),
//!     Err(Error::RateLimited { retry_after, .. }) => eprintln!("retry in {:?}", retry_after),
//!     Err(Error::InvalidResponse { raw_response, message, .. }) => {
//!         eprintln!("bad payload: {} ({})", message, raw_response);
//!     }
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Rate Limiting
//!
//! A call carrying [`RetryOnRateLimit`] with `max_attempts = N` makes at most
//! `N + 1` attempts, waiting between them for as long as each 429's
//! `Retry-After` header asks (5 s when absent or malformed). Without the policy
//! a 429 is returned immediately as [`Error::RateLimited`]. Waits can be cut
//! short with a `tokio_util` cancellation token or a whole-call deadline.

pub mod classify;
pub mod config;
mod error;
mod executor;
mod request;
mod response;
pub mod retry;
pub mod transport;

pub use config::{ApplyToRequest, CallConfig, CallContext, ConfigKind, Credential, RetryOnRateLimit};
pub use error::{Error, ErrorKind, Result};
pub use executor::{Executor, ExecutorBuilder};
pub use request::OutgoingRequest;
pub use response::{ConsumeError, Empty, Json, Response, ResponseConsumer};
pub use transport::{ReqwestTransport, Transport};
