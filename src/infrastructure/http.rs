//! # HTTP Transport
//!
//! `Transport` implementation over `reqwest`. One attempt per call; the dispatcher owns retries,
//! timeouts and permits.
//!
//! - TLS certificates are always verified (rustls).
//! - Unless private targets are allowed, DNS answers pointing at loopback, private, link-local
//!   or otherwise non-global addresses are discarded, and redirects to such hosts are not followed.
//! - Response bodies are streamed and cut at `max_response_bytes`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::{Attempt, Policy};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::application::target::{is_non_global, is_private_or_local_host};
use crate::domain::config::PostmanConfig;
use crate::domain::errors::TransportError;
use crate::domain::traits::Transport;
use crate::domain::types::{HttpResponse, Method, RequestBody, RequestDescriptor};

const MAX_REDIRECTS: usize = 5;
const RAW_BODY_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

pub struct ReqwestTransport {
    client: reqwest::Client,
    max_response_bytes: usize,
}

impl ReqwestTransport {
    pub fn from_config(config: &PostmanConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(Duration::from_secs(config.request_timeout_secs))
            .redirect(redirect_policy(config.allow_private_targets));

        if !config.allow_private_targets {
            builder = builder.dns_resolver(Arc::new(PublicOnlyResolver));
        }

        let client = builder.build().context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            max_response_bytes: config.max_response_bytes,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: &RequestDescriptor) -> Result<HttpResponse, TransportError> {
        let method = match request.method() {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, request.request_url());
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match request.body() {
            // `json` keeps a caller-supplied Content-Type.
            Some(RequestBody::Fields(fields)) => builder.json(fields),
            Some(RequestBody::Raw(raw)) => {
                let typed = request
                    .headers()
                    .keys()
                    .any(|name| name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()));
                if !typed {
                    builder = builder.header(CONTENT_TYPE, RAW_BODY_CONTENT_TYPE);
                }
                builder.body(raw.clone())
            }
            None => builder,
        };

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let (body, truncated) = read_capped(response, self.max_response_bytes).await?;
        if truncated {
            tracing::debug!(cap = self.max_response_bytes, "Response body cut at download limit");
        }

        Ok(HttpResponse {
            status,
            headers,
            body,
            truncated,
        })
    }
}

/// Reads at most `cap` bytes; the flag reports whether anything was left unread.
async fn read_capped(response: reqwest::Response, cap: usize) -> Result<(Bytes, bool), TransportError> {
    let mut stream = response.bytes_stream();
    let mut buf = BytesMut::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(classify)?;
        let room = cap - buf.len();
        if chunk.len() > room {
            buf.extend_from_slice(&chunk[..room]);
            return Ok((buf.freeze(), true));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok((buf.freeze(), false))
}

fn redirect_policy(allow_private: bool) -> Policy {
    if allow_private {
        return Policy::limited(MAX_REDIRECTS);
    }
    Policy::custom(|attempt: Attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else if redirect_allowed(attempt.url()) {
            attempt.follow()
        } else {
            tracing::warn!("Refusing redirect to a private or non-http target");
            attempt.stop()
        }
    })
}

/// A stopped redirect is returned to the user as the 3xx response itself.
fn redirect_allowed(url: &reqwest::Url) -> bool {
    matches!(url.scheme(), "http" | "https")
        && url
            .host_str()
            .is_some_and(|host| !is_private_or_local_host(host))
}

#[derive(Debug, Error)]
#[error("{0} resolves only to private or local addresses")]
struct BlockedAddress(String);

/// Resolves through the system resolver and keeps only globally routable addresses.
struct PublicOnlyResolver;

impl Resolve for PublicOnlyResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let host = name.as_str().to_string();
        Box::pin(async move {
            let resolved = tokio::net::lookup_host((host.as_str(), 0)).await?;
            let public: Vec<SocketAddr> = resolved.filter(|addr| !is_non_global(addr.ip())).collect();
            if public.is_empty() {
                return Err(Box::new(BlockedAddress(host)) as Box<dyn std::error::Error + Send + Sync>);
            }
            let addrs: Addrs = Box::new(public.into_iter());
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(addrs)
        })
    }
}

/// Maps a reqwest failure onto the dispatcher's vocabulary. URLs are stripped so query strings
/// never reach the chat or the logs.
fn classify(error: reqwest::Error) -> TransportError {
    let error = error.without_url();
    let detail = describe(&error);

    if error.is_timeout() {
        TransportError::Timeout
    } else if let Some(blocked) = find_source::<BlockedAddress>(&error) {
        TransportError::Blocked(blocked.0.clone())
    } else if error.is_connect() || is_connection_io_error(&error) {
        TransportError::Connect(detail)
    } else if error.is_body() || error.is_decode() {
        TransportError::Body(detail)
    } else {
        TransportError::Request(detail)
    }
}

fn is_connection_io_error(error: &reqwest::Error) -> bool {
    find_source::<std::io::Error>(error).is_some_and(|io| {
        matches!(
            io.kind(),
            ErrorKind::ConnectionReset
                | ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::UnexpectedEof
        )
    })
}

fn find_source<'a, T: std::error::Error + 'static>(
    error: &'a (dyn std::error::Error + 'static),
) -> Option<&'a T> {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(found) = err.downcast_ref::<T>() {
            return Some(found);
        }
        current = err.source();
    }
    None
}

/// Top-level message plus the innermost cause, which is usually the useful part.
fn describe(error: &reqwest::Error) -> String {
    let mut root: &dyn std::error::Error = error;
    while let Some(source) = root.source() {
        root = source;
    }
    let top = error.to_string();
    let cause = root.to_string();
    if cause == top { top } else { format!("{top}: {cause}") }
}
