//! The request executor.
//!
//! [`Executor`] issues one logical call per method invocation: it validates
//! the call's configuration, builds and sends the request, classifies any
//! failure, and, when a [`RetryOnRateLimit`](crate::RetryOnRateLimit) policy
//! is attached, waits out 429 responses and tries again.

use crate::{
    classify::classify,
    config::{ApplyToRequest, CallConfig, CallContext},
    request::{parse_absolute_url, OutgoingRequest},
    response::{Empty, Response, ResponseConsumer},
    retry::{RetryController, WaitOutcome},
    transport::{
        IntoTransport, ProductTag, ReqwestTransport, ResponseBody, Transport, TransportOptions,
        TransportResponse,
    },
    Error, Result,
};
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use std::sync::Arc;
use tokio::time::Instant;
use url::Url;

/// Executes REST calls against absolute URLs.
///
/// The executor is cheap to clone and holds no per-call state, so calls from
/// different tasks run fully independently.
///
/// # Examples
///
/// ```no_run
/// use restexec::{Credential, Executor, Json, RetryOnRateLimit};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Repository {
///     slug: String,
/// }
///
/// # async fn example() -> Result<(), restexec::Error> {
/// let executor = Executor::builder().build()?;
/// let credential = Credential::bearer("s3cr3t")?;
///
/// let repo: Repository = executor
///     .get(
///         "https://api.example.com/repositories/acme/core",
///         Json::new(),
///         &[credential.clone().into(), RetryOnRateLimit::new(3).into()],
///     )
///     .await?;
/// println!("fetched {}", repo.slug);
///
/// executor
///     .delete(
///         "https://api.example.com/repositories/acme/old",
///         &[credential.into()],
///     )
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Executor<T = ReqwestTransport> {
    inner: Arc<ExecutorInner<T>>,
}

struct ExecutorInner<T> {
    transport: T,
    product_tag: ProductTag,
    default_headers: HeaderMap,
}

impl<T> Clone for Executor<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Executor {
    /// Creates an `ExecutorBuilder` using a default [`ReqwestTransport`].
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::new()
    }
}

impl<T: Transport> Executor<T> {
    /// Creates an executor over `transport` with default settings.
    pub fn new(transport: T) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                transport,
                product_tag: ProductTag::default(),
                default_headers: HeaderMap::new(),
            }),
        }
    }

    /// Returns the underlying transport.
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Makes a GET request.
    pub async fn get<R, C>(&self, url: &str, consumer: C, configs: &[CallConfig]) -> Result<R>
    where
        C: ResponseConsumer<R>,
    {
        self.execute(Method::GET, url, None, consumer, configs).await
    }

    /// Makes a POST request with a JSON-encoded body.
    pub async fn post<R, C>(
        &self,
        url: &str,
        body_json: impl Into<String>,
        consumer: C,
        configs: &[CallConfig],
    ) -> Result<R>
    where
        C: ResponseConsumer<R>,
    {
        self.execute(Method::POST, url, Some(body_json.into()), consumer, configs)
            .await
    }

    /// Makes a PUT request with a JSON-encoded body.
    pub async fn put<R, C>(
        &self,
        url: &str,
        body_json: impl Into<String>,
        consumer: C,
        configs: &[CallConfig],
    ) -> Result<R>
    where
        C: ResponseConsumer<R>,
    {
        self.execute(Method::PUT, url, Some(body_json.into()), consumer, configs)
            .await
    }

    /// Makes a DELETE request, caring only about success or failure.
    pub async fn delete(&self, url: &str, configs: &[CallConfig]) -> Result<()> {
        self.execute(Method::DELETE, url, None, Empty, configs).await
    }

    /// Executes one logical call.
    ///
    /// Configuration is validated before any I/O. Each attempt rebuilds the
    /// request from the same method, URL and body. A 429 is retried only when
    /// a [`RetryOnRateLimit`](crate::RetryOnRateLimit) policy is attached and
    /// its budget allows; every other failure is returned as classified.
    ///
    /// # Errors
    ///
    /// Returns exactly one [`Error`] describing why the call failed.
    pub async fn execute<R, C>(
        &self,
        method: Method,
        url: &str,
        body: Option<String>,
        consumer: C,
        configs: &[CallConfig],
    ) -> Result<R>
    where
        C: ResponseConsumer<R>,
    {
        let context = CallContext::from_configs(configs)?;
        let url = parse_absolute_url(url)?;

        let started = Instant::now();
        let mut retry = context
            .retry
            .as_ref()
            .map(|policy| RetryController::new(policy, started));
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            let request = self.build_request(&method, &url, body.as_deref(), &context);

            let error = match self.attempt(request, attempt).await {
                Ok((status, headers, raw_body)) => {
                    let response = Response {
                        status,
                        headers,
                        raw_body,
                        latency: started.elapsed(),
                        attempts: attempt,
                    };
                    return match consumer.consume(&response) {
                        Ok(value) => Ok(value),
                        Err(e) => {
                            tracing::error!(
                                error = %e,
                                status = response.status.as_u16(),
                                "Response consumer rejected content"
                            );
                            Err(Error::InvalidResponse {
                                status: response.status,
                                raw_response: response.raw_body,
                                message: e.to_string(),
                            })
                        }
                    };
                }
                Err(e) => e,
            };

            tracing::warn!(
                error = %error,
                attempt = attempt,
                method = %method,
                url = %url,
                "Request failed"
            );

            let Some(retry_after) = error.retry_after() else {
                return Err(error);
            };
            let Some(controller) = retry.as_mut() else {
                return Err(error);
            };
            let Some(delay) = controller.next_delay(retry_after) else {
                tracing::warn!(
                    attempts = attempt,
                    max_attempts = controller.state().max_attempts(),
                    "Rate limit retries exhausted"
                );
                return Err(error);
            };

            tracing::info!(
                retry_after_ms = delay.as_millis(),
                attempt = attempt,
                max_attempts = controller.state().max_attempts(),
                "Rate limited - waiting before retry"
            );

            match controller.wait(delay).await {
                WaitOutcome::Elapsed => {}
                WaitOutcome::Cancelled => {
                    tracing::warn!(attempt = attempt, "Rate limit wait cancelled");
                    return Err(Error::Unhandled {
                        code: Error::WAIT_CANCELLED,
                        raw_response: None,
                    });
                }
                WaitOutcome::DeadlineExceeded => {
                    tracing::warn!(
                        attempt = attempt,
                        delay_ms = delay.as_millis(),
                        "Rate limit wait would exceed call deadline"
                    );
                    return Err(Error::Unhandled {
                        code: Error::WAIT_DEADLINE_EXCEEDED,
                        raw_response: None,
                    });
                }
            }
        }
    }

    /// Builds the request for one attempt.
    fn build_request(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&str>,
        context: &CallContext,
    ) -> OutgoingRequest {
        let mut request = OutgoingRequest::new(method.clone(), url.clone());
        if let Some(body) = body {
            request = request.with_json_body(body);
        }

        for (name, value) in &self.inner.default_headers {
            request.headers.append(name.clone(), value.clone());
        }

        context.apply(&mut request);
        self.inner.product_tag.stamp(&mut request.headers);
        request
    }

    /// Performs a single exchange and drains its body.
    ///
    /// The body handle is consumed on every path, so it is released exactly
    /// once whether the exchange succeeded or not.
    async fn attempt(
        &self,
        request: OutgoingRequest,
        attempt: u32,
    ) -> Result<(StatusCode, HeaderMap, String)> {
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            attempt = attempt,
            "Executing HTTP request"
        );

        let sent = Instant::now();
        let TransportResponse {
            status,
            headers,
            body,
        } = self.inner.transport.send(request).await?;

        tracing::info!(
            status = status.as_u16(),
            latency_ms = sent.elapsed().as_millis(),
            attempt = attempt,
            "Received HTTP response"
        );

        if status.is_success() {
            let raw_body = body.read_to_string().await?;
            return Ok((status, headers, raw_body));
        }

        let raw_response = body.read_to_string().await.unwrap_or_default();

        if status.is_client_error() {
            tracing::error!(
                status = status.as_u16(),
                response = %raw_response,
                "Client error (4xx)"
            );
        } else if status.is_server_error() {
            tracing::warn!(
                status = status.as_u16(),
                response = %raw_response,
                "Server error (5xx)"
            );
        }

        Err(classify(status, raw_response, &headers))
    }
}

/// Builder for configuring and creating an [`Executor`].
///
/// # Examples
///
/// ```no_run
/// use restexec::transport::{ProductTag, TransportOptions};
/// use restexec::ExecutorBuilder;
///
/// # fn example() -> Result<(), restexec::Error> {
/// let executor = ExecutorBuilder::new()
///     .transport_options(TransportOptions {
///         timeout_ms: 10_000,
///         ..TransportOptions::default()
///     })
///     .product_tag(ProductTag::new("x-client", "acme-ci/4.2")?)
///     .default_header("accept", "application/json")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ExecutorBuilder<S = TransportOptions> {
    transport: S,
    product_tag: ProductTag,
    default_headers: HeaderMap,
}

impl ExecutorBuilder {
    /// Creates a builder that will construct a [`ReqwestTransport`] from
    /// default [`TransportOptions`].
    pub fn new() -> Self {
        Self {
            transport: TransportOptions::default(),
            product_tag: ProductTag::default(),
            default_headers: HeaderMap::new(),
        }
    }
}

impl Default for ExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> ExecutorBuilder<S> {
    /// Uses a ready-made transport.
    pub fn transport<T: Transport>(self, transport: T) -> ExecutorBuilder<T> {
        ExecutorBuilder {
            transport,
            product_tag: self.product_tag,
            default_headers: self.default_headers,
        }
    }

    /// Builds a [`ReqwestTransport`] from `options`.
    pub fn transport_options(self, options: TransportOptions) -> ExecutorBuilder<TransportOptions> {
        ExecutorBuilder {
            transport: options,
            product_tag: self.product_tag,
            default_headers: self.default_headers,
        }
    }

    /// Replaces the product-identifying header.
    pub fn product_tag(mut self, tag: ProductTag) -> Self {
        self.product_tag = tag;
        self
    }

    /// Adds a header sent with every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid, or if the
    /// header is `Authorization`, which only credentials may set.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
        if name == header::AUTHORIZATION {
            return Err(Error::Configuration(
                "Authorization must be supplied as a Credential".to_string(),
            ));
        }
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }
}

impl<S: IntoTransport> ExecutorBuilder<S> {
    /// Builds the configured `Executor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be constructed.
    pub fn build(self) -> Result<Executor<S::Transport>> {
        let transport = self.transport.into_transport()?;
        Ok(Executor {
            inner: Arc::new(ExecutorInner {
                transport,
                product_tag: self.product_tag,
                default_headers: self.default_headers,
            }),
        })
    }
}
