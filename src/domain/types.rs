//! # Domain Types
//!
//! Value objects that flow through the command pipeline:
//! tokens, the validated request descriptor, raw responses and dispatch results.
//! None of these outlive a single command invocation.

use bytes::Bytes;
use indexmap::IndexMap;
use reqwest::Url;
use std::fmt;
use std::time::Duration;

/// Supported request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub const ALL: [Method; 4] = [Method::Get, Method::Post, Method::Put, Method::Delete];

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(raw))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    /// Safe to repeat after a connection-level failure.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, Method::Post)
    }

    /// Unclassified parameters become body fields instead of query pairs.
    pub fn carries_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `key:value` token split at its first colon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub key: String,
    pub value: String,
}

/// One lexical token of a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Method(String),
    Url(String),
    Parameter(Parameter),
    Flag(String),
}

/// Tokenizer output. The method and URL are guaranteed present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSequence {
    pub method: String,
    pub url: String,
    pub parameters: Vec<Parameter>,
    pub flags: Vec<String>,
}

/// Presentation switches requested with `--` flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Show the body exactly as received instead of pretty-printing it.
    pub raw: bool,
    /// Show every response header instead of the curated subset.
    pub all_headers: bool,
}

impl RenderOptions {
    pub fn flags(&self) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if self.raw {
            flags.push("--raw");
        }
        if self.all_headers {
            flags.push("--headers");
        }
        flags
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Typed fields, sent as a JSON object in insertion order.
    Fields(IndexMap<String, serde_json::Value>),
    /// Sent verbatim.
    Raw(String),
}

/// A validated, immutable outbound request.
///
/// Only the request builder constructs these; nothing downstream re-validates.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    method: Method,
    url: Url,
    query: IndexMap<String, String>,
    headers: IndexMap<String, String>,
    body: Option<RequestBody>,
    options: RenderOptions,
}

impl RequestDescriptor {
    pub(crate) fn new(
        method: Method,
        url: Url,
        query: IndexMap<String, String>,
        headers: IndexMap<String, String>,
        body: Option<RequestBody>,
        options: RenderOptions,
    ) -> Self {
        Self {
            method,
            url,
            query,
            headers,
            body,
            options,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn query(&self) -> &IndexMap<String, String> {
        &self.query
    }

    pub fn headers(&self) -> &IndexMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    pub fn options(&self) -> RenderOptions {
        self.options
    }

    /// The URL actually requested: the base URL with the query pairs appended.
    pub fn request_url(&self) -> Url {
        let mut url = self.url.clone();
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        url
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Re-serializes the descriptor into a command line accepted by the tokenizer.
    pub fn to_command_line(&self) -> String {
        let mut parts = vec![self.method.as_str().to_lowercase(), self.url.to_string()];

        for (key, value) in &self.query {
            parts.push(quote(&format!("{key}:{value}")));
        }
        for (name, value) in &self.headers {
            parts.push(quote(&format!("h:{name}:{value}")));
        }
        match &self.body {
            Some(RequestBody::Raw(raw)) => parts.push(quote(&format!("body:{raw}"))),
            Some(RequestBody::Fields(fields)) => {
                for (key, value) in fields {
                    parts.push(quote(&format!("{key}:{}", literal(value))));
                }
            }
            None => {}
        }
        parts.extend(self.options.flags().into_iter().map(String::from));

        parts.join(" ")
    }
}

fn quote(token: &str) -> String {
    let escaped = token.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Inverse of the builder's value typing: strings that would parse as JSON are re-quoted.
fn literal(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) if serde_json::from_str::<serde_json::Value>(s).is_ok() => {
            serde_json::Value::String(s.clone()).to_string()
        }
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A response as received by a transport, before rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// The body was cut at the transport's hard size cap.
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Network,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Timeout => "Timeout",
            FailureKind::Network => "Network",
            FailureKind::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

/// Any received HTTP response, regardless of status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSummary {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub body_truncated: bool,
    pub elapsed: Duration,
    pub attempts: u32,
    pub options: RenderOptions,
    pub secrets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFailure {
    pub kind: FailureKind,
    pub detail: String,
    pub attempts: u32,
    pub secrets: Vec<String>,
}

/// Outcome of executing one descriptor; consumed once by the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    Success(ResponseSummary),
    Failure(DispatchFailure),
}
