//! # Dispatcher
//!
//! Executes a `RequestDescriptor` through a `Transport` under the process-wide concurrency limit,
//! a per-attempt timeout, an overall command deadline (which includes time spent queueing for a
//! permit) and the retry state machine. Every path resolves to a `DispatchResult`; a cancelled or
//! timed-out dispatch drops the in-flight call and its permit immediately.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};

use crate::application::invocations::CancelSignal;
use crate::application::limiter::ConcurrencyLimiter;
use crate::application::redact::{redact_secrets, secrets_of};
use crate::application::retry::{RetryEvent, RetryPolicy, RetryState};
use crate::domain::errors::TransportError;
use crate::domain::traits::Transport;
use crate::domain::types::{
    DispatchFailure, DispatchResult, FailureKind, HttpResponse, RequestDescriptor, ResponseSummary,
};

#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    pub request_timeout: Duration,
    pub command_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    limiter: ConcurrencyLimiter,
    policy: DispatchPolicy,
}

/// How the retry loop ended, before secrets and timing are attached.
enum LoopOutcome {
    Response(HttpResponse, u32),
    Failed(FailureKind, String, u32),
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        limiter: ConcurrencyLimiter,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            transport,
            limiter,
            policy,
        }
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    pub async fn dispatch(&self, descriptor: RequestDescriptor, mut cancel: CancelSignal) -> DispatchResult {
        let started = Instant::now();
        let deadline = started + self.policy.command_timeout;
        let secrets = secrets_of(&descriptor);

        tracing::info!(
            method = %descriptor.method(),
            host = %descriptor.host(),
            "Dispatching request"
        );

        // Survives the work future being dropped by the other arms.
        let attempts = AtomicU32::new(0);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => LoopOutcome::Failed(
                FailureKind::Cancelled,
                "the command was cancelled".to_string(),
                attempts.load(Ordering::Relaxed),
            ),
            _ = tokio::time::sleep_until(deadline) => LoopOutcome::Failed(
                FailureKind::Timeout,
                format!("no response within {}s", self.policy.command_timeout.as_secs_f32()),
                attempts.load(Ordering::Relaxed),
            ),
            outcome = self.run(&descriptor, &attempts) => outcome,
        };

        let elapsed = started.elapsed();
        match outcome {
            LoopOutcome::Response(response, attempts) => {
                tracing::info!(
                    status = response.status,
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Request completed"
                );
                DispatchResult::Success(ResponseSummary {
                    status: response.status,
                    headers: response.headers,
                    body: response.body,
                    body_truncated: response.truncated,
                    elapsed,
                    attempts,
                    options: descriptor.options(),
                    secrets,
                })
            }
            LoopOutcome::Failed(kind, detail, attempts) => {
                match kind {
                    FailureKind::Cancelled => tracing::info!(host = %descriptor.host(), "Request cancelled"),
                    _ => tracing::warn!(
                        host = %descriptor.host(),
                        kind = %kind,
                        attempts,
                        "Request failed: {}",
                        redact_secrets(&detail, &secrets)
                    ),
                }
                DispatchResult::Failure(DispatchFailure {
                    kind,
                    detail: redact_secrets(&detail, &secrets),
                    attempts,
                    secrets,
                })
            }
        }
    }

    /// Queue for a permit, then drive the retry machine. Dropping this future releases the permit.
    async fn run(&self, descriptor: &RequestDescriptor, attempts: &AtomicU32) -> LoopOutcome {
        let Some(_permit) = self.limiter.acquire().await else {
            return LoopOutcome::Failed(FailureKind::Network, "dispatcher is shutting down".to_string(), 0);
        };

        let retry = &self.policy.retry;
        let method = descriptor.method();
        let mut state = RetryState::Attempting(0);
        let mut last_error = String::new();
        let mut response = None;

        while !state.is_terminal() {
            state = match state {
                RetryState::Attempting(n) => {
                    attempts.fetch_add(1, Ordering::Relaxed);
                    match timeout(self.policy.request_timeout, self.transport.execute(descriptor)).await {
                        Ok(Ok(received)) => {
                            response = Some(received);
                            retry.transition(state, RetryEvent::AttemptSucceeded, method)
                        }
                        // A timed-out attempt is never retried.
                        Ok(Err(TransportError::Timeout)) | Err(_) => {
                            return LoopOutcome::Failed(
                                FailureKind::Timeout,
                                format!(
                                    "no response within {}s",
                                    self.policy.request_timeout.as_secs_f32()
                                ),
                                attempts.load(Ordering::Relaxed),
                            );
                        }
                        Ok(Err(error)) => {
                            let retryable = error.is_retryable();
                            last_error = error.to_string();
                            let next = retry.transition(state, RetryEvent::AttemptFailed { retryable }, method);
                            if let RetryState::Backoff(_) = next {
                                tracing::debug!(
                                    attempt = n + 1,
                                    max_retries = retry.max_retries(),
                                    "Retrying after connection failure: {}",
                                    last_error
                                );
                            }
                            next
                        }
                    }
                }
                RetryState::Backoff(n) => {
                    sleep(retry.delay_for(n)).await;
                    retry.transition(state, RetryEvent::BackoffElapsed, method)
                }
                terminal => terminal,
            };
        }

        let attempts = attempts.load(Ordering::Relaxed);
        match response {
            Some(response) => LoopOutcome::Response(response, attempts),
            None => LoopOutcome::Failed(FailureKind::Network, last_error, attempts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::builder::{BuilderLimits, build};
    use crate::application::invocations::cancel_pair;
    use crate::application::tokenizer::tokenize;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Responder = dyn Fn(usize) -> Result<HttpResponse, TransportError> + Send + Sync;

    /// Counts calls and the peak number of simultaneous calls.
    struct FakeTransport {
        delay: Duration,
        responder: Box<Responder>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeTransport {
        fn new(
            delay: Duration,
            responder: impl Fn(usize) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                delay,
                responder: Box::new(responder),
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn execute(&self, _request: &RequestDescriptor) -> Result<HttpResponse, TransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            (self.responder)(call)
        }
    }

    fn ok(status: u16) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Bytes::from_static(b"{}"),
            truncated: false,
        })
    }

    fn descriptor(line: &str) -> RequestDescriptor {
        build(tokenize(line).unwrap(), &BuilderLimits::default()).unwrap()
    }

    fn policy() -> DispatchPolicy {
        DispatchPolicy {
            request_timeout: Duration::from_millis(200),
            command_timeout: Duration::from_secs(2),
            retry: RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(4)),
        }
    }

    fn dispatcher(transport: Arc<FakeTransport>, permits: usize, policy: DispatchPolicy) -> Dispatcher {
        Dispatcher::new(transport, ConcurrencyLimiter::new(permits), policy)
    }

    #[tokio::test]
    async fn test_error_status_is_a_success() {
        let transport = FakeTransport::new(Duration::ZERO, |_| ok(404));
        let d = dispatcher(transport.clone(), 2, policy());
        match d.dispatch(descriptor("get https://api.example.com/missing"), CancelSignal::never()).await {
            DispatchResult::Success(summary) => {
                assert_eq!(summary.status, 404);
                assert_eq!(summary.attempts, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_idempotent_request_recovers_after_connection_failures() {
        let transport = FakeTransport::new(Duration::ZERO, |call| {
            if call < 2 {
                Err(TransportError::Connect("connection reset".to_string()))
            } else {
                ok(200)
            }
        });
        let d = dispatcher(transport.clone(), 2, policy());
        let result = d.dispatch(descriptor("put https://api.example.com/doc"), CancelSignal::never()).await;
        assert!(matches!(result, DispatchResult::Success(ResponseSummary { attempts: 3, .. })));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let transport = FakeTransport::new(Duration::ZERO, |_| {
            Err(TransportError::Connect("dns error".to_string()))
        });
        let d = dispatcher(transport.clone(), 2, policy());
        match d.dispatch(descriptor("get https://api.example.com"), CancelSignal::never()).await {
            DispatchResult::Failure(failure) => {
                assert_eq!(failure.kind, FailureKind::Network);
                assert_eq!(failure.attempts, 3);
                assert!(failure.detail.contains("dns error"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_post_is_not_retried() {
        let transport = FakeTransport::new(Duration::ZERO, |_| {
            Err(TransportError::Connect("connection refused".to_string()))
        });
        let d = dispatcher(transport.clone(), 2, policy());
        let result = d.dispatch(descriptor("post https://api.example.com/items"), CancelSignal::never()).await;
        assert!(matches!(
            result,
            DispatchResult::Failure(DispatchFailure { kind: FailureKind::Network, attempts: 1, .. })
        ));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_non_connection_failures_are_not_retried() {
        let transport = FakeTransport::new(Duration::ZERO, |_| {
            Err(TransportError::Blocked("10.0.0.1".to_string()))
        });
        let d = dispatcher(transport.clone(), 2, policy());
        let result = d.dispatch(descriptor("get https://api.example.com"), CancelSignal::never()).await;
        assert!(matches!(result, DispatchResult::Failure(_)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_not_retried_and_releases_permit() {
        let transport = FakeTransport::new(Duration::from_secs(5), |_| ok(200));
        let policy = DispatchPolicy {
            request_timeout: Duration::from_millis(50),
            ..policy()
        };
        let d = dispatcher(transport.clone(), 1, policy);

        let started = std::time::Instant::now();
        let result = d.dispatch(descriptor("get https://api.example.com/slow"), CancelSignal::never()).await;
        let elapsed = started.elapsed();

        assert!(matches!(
            result,
            DispatchResult::Failure(DispatchFailure { kind: FailureKind::Timeout, .. })
        ));
        assert_eq!(transport.calls(), 1);
        assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");
        assert_eq!(d.limiter().available(), 1);
    }

    #[tokio::test]
    async fn test_command_deadline_includes_queueing() {
        let transport = FakeTransport::new(Duration::ZERO, |_| ok(200));
        let policy = DispatchPolicy {
            command_timeout: Duration::from_millis(50),
            ..policy()
        };
        let d = dispatcher(transport.clone(), 1, policy);
        let held = d.limiter().acquire().await.unwrap();

        let result = d.dispatch(descriptor("get https://api.example.com"), CancelSignal::never()).await;
        assert!(matches!(
            result,
            DispatchResult::Failure(DispatchFailure { kind: FailureKind::Timeout, .. })
        ));
        assert_eq!(transport.calls(), 0);

        drop(held);
        assert_eq!(d.limiter().available(), 1);
    }

    /// Fails the first call with a connection error, then hangs.
    struct StallAfterFirst {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for StallAfterFirst {
        async fn execute(&self, _request: &RequestDescriptor) -> Result<HttpResponse, TransportError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(TransportError::Connect("connection reset".to_string()));
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
            ok(200)
        }
    }

    #[tokio::test]
    async fn test_deadline_reports_attempts_made() {
        let transport = Arc::new(StallAfterFirst { calls: AtomicUsize::new(0) });
        let policy = DispatchPolicy {
            request_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_millis(100),
            ..policy()
        };
        let d = Dispatcher::new(transport.clone(), ConcurrencyLimiter::new(1), policy);

        let result = d.dispatch(descriptor("get https://api.example.com/flaky"), CancelSignal::never()).await;
        let DispatchResult::Failure(failure) = result else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(failure.attempts, 2);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert_eq!(d.limiter().available(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_reports_attempts_made() {
        let transport = Arc::new(StallAfterFirst { calls: AtomicUsize::new(0) });
        let d = Dispatcher::new(transport, ConcurrencyLimiter::new(1), policy());
        let (tx, signal) = cancel_pair();

        let task = {
            let d = d.clone();
            tokio::spawn(async move { d.dispatch(descriptor("get https://api.example.com/flaky"), signal).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(matches!(
            result,
            DispatchResult::Failure(DispatchFailure { kind: FailureKind::Cancelled, attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_call_and_releases_permit() {
        let transport = FakeTransport::new(Duration::from_secs(5), |_| ok(200));
        let d = dispatcher(transport.clone(), 1, policy());
        let (tx, signal) = cancel_pair();

        let task = {
            let d = d.clone();
            tokio::spawn(async move { d.dispatch(descriptor("get https://api.example.com"), signal).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(d.limiter().available(), 0);

        tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(matches!(
            result,
            DispatchResult::Failure(DispatchFailure { kind: FailureKind::Cancelled, .. })
        ));
        assert_eq!(d.limiter().available(), 1);
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_permits() {
        let transport = FakeTransport::new(Duration::from_millis(20), |_| ok(200));
        let d = dispatcher(transport.clone(), 3, policy());

        let tasks: Vec<_> = (0..12)
            .map(|i| {
                let d = d.clone();
                tokio::spawn(async move {
                    d.dispatch(descriptor(&format!("get https://api.example.com/{i}")), CancelSignal::never())
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert!(matches!(task.await.unwrap(), DispatchResult::Success(_)));
        }
        assert_eq!(transport.calls(), 12);
        assert!(transport.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(d.limiter().available(), 3);
    }

    #[tokio::test]
    async fn test_failure_detail_is_redacted() {
        let transport = FakeTransport::new(Duration::ZERO, |_| {
            Err(TransportError::Request("proxy rejected Bearer s3cr3t-token".to_string()))
        });
        let d = dispatcher(transport, 1, policy());
        let result = d
            .dispatch(descriptor(r#"get https://api.example.com "auth:s3cr3t-token""#), CancelSignal::never())
            .await;
        let DispatchResult::Failure(failure) = result else {
            panic!("expected failure");
        };
        assert!(!failure.detail.contains("s3cr3t-token"));
        assert_eq!(failure.secrets, vec!["Bearer s3cr3t-token", "s3cr3t-token"]);
    }
}
