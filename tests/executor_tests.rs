//! Executor behaviour against an in-memory transport.
//!
//! Time is paused so rate-limit waits elapse instantly while still being
//! observable through `tokio::time::Instant`.

mod common;

use common::{executor, Reply, URL};
use restexec::transport::ProductTag;
use restexec::{
    CallConfig, ConfigKind, ConsumeError, Credential, Empty, Error, ErrorKind, Json, Response,
    RetryOnRateLimit,
};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Deserialize, PartialEq)]
struct Repo {
    slug: String,
}

fn body_text(response: &Response) -> Result<String, ConsumeError> {
    Ok(response.raw_body.clone())
}

/// Asserts the paused clock moved by `expected`, within timer granularity.
fn assert_waited(start: Instant, expected: Duration) {
    let elapsed = start.elapsed();
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(10),
        "expected {:?}, waited {:?}",
        expected,
        elapsed
    );
}

#[tokio::test(start_paused = true)]
async fn test_auth_failures_are_never_retried() {
    for code in [401u16, 403] {
        let executor = executor(vec![Reply::status(code).body("denied")]);
        let err = executor
            .get(URL, Empty, &[RetryOnRateLimit::new(5).into()])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Authorization, "status {}", code);
        assert_eq!(err.raw_response(), Some("denied"));
        assert_eq!(executor.transport().calls(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_not_found() {
    let executor = executor(vec![Reply::status(404)]);
    let err = executor.get(URL, Empty, &[]).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.status().map(|s| s.as_u16()), Some(404));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_without_policy_fails_after_one_attempt() {
    let executor = executor(vec![Reply::rate_limited(Some("7")), Reply::ok("{}")]);
    let start = Instant::now();

    let err = executor.get(URL, Empty, &[]).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    assert_eq!(executor.transport().calls(), 1);
    assert_waited(start, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_exhausts_after_n_plus_one_attempts() {
    let executor = executor(vec![Reply::rate_limited(Some("2"))]);
    let start = Instant::now();

    let err = executor
        .get(URL, Empty, &[RetryOnRateLimit::new(3).into()])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(executor.transport().calls(), 4);
    // Three waits of two seconds between four attempts.
    assert_waited(start, Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_zero_max_attempts_means_single_attempt() {
    let executor = executor(vec![Reply::rate_limited(Some("1"))]);

    let err = executor
        .get(URL, Empty, &[RetryOnRateLimit::new(0).into()])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(executor.transport().calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_then_success() {
    let executor = executor(vec![
        Reply::rate_limited(Some("1")).body("first"),
        Reply::ok("second"),
    ]);
    let invocations = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&invocations);

    let (body, attempts) = executor
        .get(
            URL,
            move |r: &Response| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ConsumeError>((r.raw_body.clone(), r.attempts))
            },
            &[RetryOnRateLimit::new(1).into()],
        )
        .await
        .unwrap();

    assert_eq!(body, "second");
    assert_eq!(attempts, 2);
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(executor.transport().calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_each_wait_follows_its_own_retry_after() {
    let executor = executor(vec![
        Reply::rate_limited(Some("1")),
        Reply::rate_limited(Some("3")),
        Reply::ok("done"),
    ]);
    let start = Instant::now();

    let body = executor
        .get(URL, body_text, &[RetryOnRateLimit::new(5).into()])
        .await
        .unwrap();

    assert_eq!(body, "done");
    assert_waited(start, Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_missing_or_malformed_retry_after_waits_default() {
    for header in [None, Some("later")] {
        let executor = executor(vec![Reply::rate_limited(header), Reply::ok("ok")]);
        let start = Instant::now();

        executor
            .get(URL, Empty, &[RetryOnRateLimit::new(1).into()])
            .await
            .unwrap();

        assert_waited(start, Duration::from_millis(5000));
    }
}

#[tokio::test(start_paused = true)]
async fn test_max_wait_caps_server_delay() {
    let executor = executor(vec![Reply::rate_limited(Some("600")), Reply::ok("ok")]);
    let start = Instant::now();
    let policy = RetryOnRateLimit::new(1).with_max_wait(Duration::from_secs(1));

    executor.get(URL, Empty, &[policy.into()]).await.unwrap();

    assert_waited(start, Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_generic_client_errors() {
    for code in 400..=499u16 {
        if matches!(code, 401 | 403 | 404 | 429) {
            continue;
        }
        let executor = executor(vec![Reply::status(code)]);
        let err = executor
            .get(URL, Empty, &[RetryOnRateLimit::new(2).into()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest, "status {}", code);
        assert_eq!(executor.transport().calls(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_server_errors_are_not_retried() {
    for code in 500..=599u16 {
        let executor = executor(vec![Reply::status(code)]);
        let err = executor
            .get(URL, Empty, &[RetryOnRateLimit::new(2).into()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server, "status {}", code);
        assert_eq!(executor.transport().calls(), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_redirect_is_unhandled_with_real_code() {
    let executor = executor(vec![Reply::status(302).header("location", "https://elsewhere/")]);
    let err = executor.get(URL, Empty, &[]).await.unwrap_err();

    match err {
        Error::Unhandled { code, .. } => assert_eq!(code, 302),
        other => panic!("Expected Unhandled, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_anonymous_credential_sends_no_authorization() {
    let executor = executor(vec![Reply::ok("{}")]);
    executor
        .get(URL, Empty, &[Credential::Anonymous.into()])
        .await
        .unwrap();

    let requests = executor.transport().requests();
    assert!(requests[0].authorization().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_token_credential_sets_exact_header_on_every_attempt() {
    let executor = executor(vec![Reply::rate_limited(Some("0")), Reply::ok("{}")]);
    let configs: [CallConfig; 2] = [
        Credential::raw("token abc123").unwrap().into(),
        RetryOnRateLimit::new(1).into(),
    ];

    executor.get(URL, Empty, &configs).await.unwrap();

    let requests = executor.transport().requests();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        assert_eq!(request.authorization().unwrap(), "token abc123");
    }
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_configuration_fails_before_io() {
    let executor = executor(vec![Reply::ok("{}")]);
    let configs: [CallConfig; 2] = [
        Credential::bearer("a").unwrap().into(),
        Credential::bearer("b").unwrap().into(),
    ];

    let err = executor.get(URL, Empty, &configs).await.unwrap_err();

    assert!(matches!(
        err,
        Error::DuplicateConfiguration(ConfigKind::Credential)
    ));
    assert!(err.is_caller_error());
    assert_eq!(executor.transport().calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_relative_url_fails_before_io() {
    let executor = executor(vec![Reply::ok("{}")]);
    let err = executor
        .get("/2.0/repositories", Empty, &[])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidUrl);
    assert_eq!(executor.transport().calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_bodies_released_once_on_every_path() {
    // Success.
    let ok = executor(vec![Reply::ok(r#"{"slug":"core"}"#)]);
    let repo: Repo = ok.get(URL, Json::new(), &[]).await.unwrap();
    assert_eq!(repo.slug, "core");

    // Consumer failure.
    let malformed = executor(vec![Reply::ok("<html>")]);
    let err = malformed
        .get::<Repo, _>(URL, Json::new(), &[])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidResponse);
    assert_eq!(err.raw_response(), Some("<html>"));

    // Classified failure, after retries.
    let limited = executor(vec![
        Reply::rate_limited(Some("0")),
        Reply::rate_limited(Some("0")),
        Reply::status(500),
    ]);
    let err = limited
        .get(URL, Empty, &[RetryOnRateLimit::new(4).into()])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Server);

    // Body stream failure on a success status.
    let broken = executor(vec![Reply::ok("partial").broken_body()]);
    let err = broken.get(URL, Empty, &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GenericClient);

    for (name, transport) in [
        ("ok", ok.transport()),
        ("malformed", malformed.transport()),
        ("limited", limited.transport()),
        ("broken", broken.transport()),
    ] {
        assert_eq!(transport.opened(), transport.calls(), "{}", name);
        assert_eq!(transport.released(), transport.opened(), "{}", name);
    }
}

#[tokio::test(start_paused = true)]
async fn test_broken_body_on_error_status_still_classifies() {
    let executor = executor(vec![Reply::status(503).broken_body()]);
    let err = executor.get(URL, Empty, &[]).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(err.raw_response(), Some(""));
    assert_eq!(executor.transport().released(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transport_failures() {
    let refused = executor(vec![Reply::Refused]);
    let err = refused.get(URL, Empty, &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionFailure);

    let timeout = executor(vec![Reply::Timeout]);
    let err = timeout.get(URL, Empty, &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionFailure);

    let io = executor(vec![Reply::Io]);
    let err = io
        .get(URL, Empty, &[RetryOnRateLimit::new(3).into()])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GenericClient);
    assert_eq!(io.transport().calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_wait() {
    let executor = executor(vec![Reply::rate_limited(Some("60")), Reply::ok("{}")]);
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });
    let start = Instant::now();

    let policy = RetryOnRateLimit::new(3).with_cancellation(token);
    let err = executor.get(URL, Empty, &[policy.into()]).await.unwrap_err();

    match err {
        Error::Unhandled { code, raw_response } => {
            assert_eq!(code, Error::WAIT_CANCELLED);
            assert!(raw_response.is_none());
        }
        other => panic!("Expected Unhandled, got {:?}", other),
    }
    assert_eq!(executor.transport().calls(), 1);
    assert_waited(start, Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_stops_retry_loop() {
    let executor = executor(vec![Reply::rate_limited(Some("4"))]);
    let start = Instant::now();

    let policy = RetryOnRateLimit::new(10).with_deadline(Duration::from_secs(10));
    let err = executor.get(URL, Empty, &[policy.into()]).await.unwrap_err();

    assert_eq!(
        err.status(),
        None,
        "sentinel codes carry no status: {:?}",
        err
    );
    match err {
        Error::Unhandled { code, .. } => assert_eq!(code, Error::WAIT_DEADLINE_EXCEEDED),
        other => panic!("Expected Unhandled, got {:?}", other),
    }
    // Waits at 0s and 4s fit; the one starting at 8s would end past 10s.
    assert_eq!(executor.transport().calls(), 3);
    assert_waited(start, Duration::from_secs(8));
}

#[tokio::test(start_paused = true)]
async fn test_huge_retry_after_hits_deadline_instead_of_panicking() {
    let executor = executor(vec![
        Reply::rate_limited(Some("18446744073709551615")),
        Reply::ok("{}"),
    ]);
    let start = Instant::now();

    let policy = RetryOnRateLimit::new(1).with_deadline(Duration::from_secs(10));
    let err = executor.get(URL, Empty, &[policy.into()]).await.unwrap_err();

    match err {
        Error::Unhandled { code, .. } => assert_eq!(code, Error::WAIT_DEADLINE_EXCEEDED),
        other => panic!("Expected Unhandled, got {:?}", other),
    }
    assert_eq!(executor.transport().calls(), 1);
    assert_waited(start, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_deadline_behaves_like_none() {
    let executor = executor(vec![Reply::rate_limited(Some("2")), Reply::ok("done")]);
    let start = Instant::now();

    let policy = RetryOnRateLimit::new(1).with_deadline(Duration::MAX);
    let body = executor.get(URL, body_text, &[policy.into()]).await.unwrap();

    assert_eq!(body, "done");
    assert_eq!(executor.transport().calls(), 2);
    assert_waited(start, Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_attempts_are_identical_and_tagged() {
    let executor = executor(vec![
        Reply::rate_limited(Some("0")),
        Reply::rate_limited(Some("0")),
        Reply::status(201).body(r#"{"slug":"new"}"#),
    ]);

    let repo: Repo = executor
        .post(
            URL,
            r#"{"name":"new"}"#,
            Json::new(),
            &[RetryOnRateLimit::new(2).into()],
        )
        .await
        .unwrap();
    assert_eq!(repo.slug, "new");

    let requests = executor.transport().requests();
    assert_eq!(requests.len(), 3);
    let tag = ProductTag::default();
    for request in &requests {
        assert_eq!(request.method, http::Method::POST);
        assert_eq!(request.url.as_str(), URL);
        assert_eq!(request.body.as_deref(), Some(r#"{"name":"new"}"#));
        assert_eq!(request.headers.get("content-type").unwrap(), "application/json");
        assert_eq!(request.headers.get(tag.name()), Some(tag.value()));
    }
}

#[tokio::test(start_paused = true)]
async fn test_put_and_delete() {
    let executor = executor(vec![Reply::ok("updated"), Reply::status(204)]);

    let body = executor
        .put(URL, "{}", body_text, &[])
        .await
        .unwrap();
    assert_eq!(body, "updated");

    executor.delete(URL, &[]).await.unwrap();

    let requests = executor.transport().requests();
    assert_eq!(requests[0].method, http::Method::PUT);
    assert_eq!(requests[1].method, http::Method::DELETE);
    assert!(requests[1].body.is_none());
    assert!(requests[1].headers.get("content-type").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_independent_concurrent_calls() {
    let executor = executor(vec![Reply::ok("shared")]);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let executor = executor.clone();
        handles.push(tokio::spawn(async move {
            executor.get(URL, body_text, &[]).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "shared");
    }

    assert_eq!(executor.transport().calls(), 4);
    assert_eq!(executor.transport().released(), 4);
}
