//! # Postman Service
//!
//! The request pipeline behind `!postman`: raw text → tokens → descriptor → dispatch → rendered
//! output. Always yields output. Bad input never reaches the network, and a panic inside dispatch
//! is contained here so one broken invocation cannot take the bot down.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use crate::application::builder::{BuilderLimits, build};
use crate::application::dispatcher::{DispatchPolicy, Dispatcher};
use crate::application::invocations::CancelSignal;
use crate::application::limiter::ConcurrencyLimiter;
use crate::application::renderer::{RenderedOutput, Renderer};
use crate::application::retry::RetryPolicy;
use crate::application::tokenizer::tokenize;
use crate::domain::config::PostmanConfig;
use crate::domain::errors::PostmanError;
use crate::domain::traits::Transport;
use crate::domain::types::RequestDescriptor;
use crate::strings::messages;

#[derive(Clone)]
pub struct PostmanService {
    limits: BuilderLimits,
    dispatcher: Dispatcher,
    renderer: Renderer,
}

impl PostmanService {
    pub fn new(limits: BuilderLimits, dispatcher: Dispatcher, renderer: Renderer) -> Self {
        Self {
            limits,
            dispatcher,
            renderer,
        }
    }

    /// Wires the engine from configuration. `limiter` is the process-wide one.
    pub fn from_config(
        config: &PostmanConfig,
        transport: Arc<dyn Transport>,
        limiter: ConcurrencyLimiter,
    ) -> Self {
        let limits = BuilderLimits {
            max_parameters: config.max_parameters,
            max_value_len: config.max_value_len,
            allow_private_targets: config.allow_private_targets,
        };
        let policy = DispatchPolicy {
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
            retry: RetryPolicy::new(
                config.max_retries,
                Duration::from_millis(config.backoff_base_ms),
                Duration::from_millis(config.backoff_max_ms),
            ),
        };
        Self::new(
            limits,
            Dispatcher::new(transport, limiter, policy),
            Renderer::new(config.body_preview_bytes),
        )
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        self.dispatcher.limiter()
    }

    /// Parses and validates a command line without touching the network.
    pub fn prepare(&self, line: &str) -> Result<RequestDescriptor, PostmanError> {
        let tokens = tokenize(line)?;
        Ok(build(tokens, &self.limits)?)
    }

    pub async fn execute(&self, line: &str, cancel: CancelSignal) -> RenderedOutput {
        let descriptor = match self.prepare(line) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                tracing::debug!("Rejected command: {}", e);
                return self.renderer.render_error(&e);
            }
        };

        match AssertUnwindSafe(self.dispatcher.dispatch(descriptor, cancel))
            .catch_unwind()
            .await
        {
            Ok(result) => self.renderer.render(&result),
            Err(_) => {
                tracing::error!("Dispatch panicked; reporting a generic failure");
                RenderedOutput::new(messages::GENERIC_FAILURE)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::TransportError;
    use crate::domain::types::HttpResponse;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Echoes the request's headers back as a JSON body, or panics on demand.
    #[derive(Default)]
    struct EchoTransport {
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
        panic: bool,
    }

    #[async_trait]
    impl Transport for EchoTransport {
        async fn execute(&self, request: &RequestDescriptor) -> Result<HttpResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.request_url().to_string());
            if self.panic {
                panic!("transport exploded");
            }
            let body = serde_json::json!({ "headers": request.headers() });
            Ok(HttpResponse {
                status: 200,
                headers: vec![("content-type".to_string(), "application/json".to_string())],
                body: Bytes::from(body.to_string()),
                truncated: false,
            })
        }
    }

    fn service(transport: Arc<EchoTransport>) -> PostmanService {
        PostmanService::from_config(&PostmanConfig::default(), transport, ConcurrencyLimiter::new(2))
    }

    #[tokio::test]
    async fn test_invalid_input_makes_no_network_call() {
        let transport = Arc::new(EchoTransport::default());
        let service = service(transport.clone());

        for line in [
            "",
            "get",
            "get notaurl",
            "patch https://api.example.com",
            "get http://127.0.0.1/admin",
            "get https://api.example.com \"unterminated",
            "get https://api.example.com novalue",
        ] {
            let output = service.execute(line, CancelSignal::never()).await;
            assert!(output.text().contains(messages::USAGE), "no guidance for {line:?}");
        }
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_query_parameters_reach_transport() {
        let transport = Arc::new(EchoTransport::default());
        let service = service(transport.clone());

        let output = service
            .execute(r#"get https://api.example.com/data "key:value""#, CancelSignal::never())
            .await;
        assert!(output.text().starts_with("✅ **API Response** · `200 OK`"));
        assert_eq!(
            transport.seen.lock().unwrap().as_slice(),
            ["https://api.example.com/data?key=value".to_string()]
        );
    }

    #[tokio::test]
    async fn test_echoed_token_is_redacted() {
        let transport = Arc::new(EchoTransport::default());
        let service = service(transport);

        let output = service
            .execute(r#"post https://api.example.com/data "auth:bearer-token""#, CancelSignal::never())
            .await;
        assert!(output.text().contains("Authorization"));
        assert!(!output.text().contains("bearer-token"));
    }

    #[tokio::test]
    async fn test_dispatch_panic_is_contained() {
        let transport = Arc::new(EchoTransport {
            panic: true,
            ..Default::default()
        });
        let service = service(transport);

        let output = service
            .execute("get https://api.example.com", CancelSignal::never())
            .await;
        assert_eq!(output.text(), messages::GENERIC_FAILURE);
        assert_eq!(service.limiter().available(), 2);
    }
}
