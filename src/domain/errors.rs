//! # Error Taxonomy
//!
//! Typed errors for each stage of the command pipeline.
//! Parse and validation errors are the user's responsibility and are rendered as guidance;
//! transport errors are classified by the dispatcher; render errors are internal defects.

use thiserror::Error;

/// The command line could not be split into tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing request method")]
    MissingMethod,

    #[error("missing endpoint URL")]
    MissingUrl,

    #[error("parameter `{0}` is not a key:value pair")]
    MalformedParameter(String),

    #[error("unterminated quote")]
    UnterminatedQuote,
}

/// The tokens parsed but do not describe a request we are willing to send.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unsupported request method `{0}`")]
    UnsupportedMethod(String),

    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("requests to `{host}` are not allowed")]
    ForbiddenTarget { host: String },

    #[error("too many parameters ({count}, maximum is {max})")]
    TooManyParameters { count: usize, max: usize },

    #[error("value of `{key}` is too long ({len} bytes, maximum is {max})")]
    ValueTooLong { key: String, len: usize, max: usize },

    #[error("invalid header `{0}`")]
    InvalidHeader(String),

    #[error("{0} requests cannot carry a body")]
    BodyNotAllowed(String),

    #[error("a raw `body` cannot be combined with body fields")]
    ConflictingBody,

    #[error("unknown flag `{0}`")]
    UnknownFlag(String),
}

/// Anything that stops a command before it reaches the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PostmanError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Failure reported by a `Transport` for a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// DNS failure, refused or reset connection. Safe to retry for idempotent methods.
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    /// The target resolved to an address we refuse to contact.
    #[error("target address is not allowed: {0}")]
    Blocked(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to read response body: {0}")]
    Body(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Connect(_))
    }
}

/// Rendering is total over every dispatch result; seeing one of these is a bug.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to format response body: {0}")]
    Format(#[from] serde_json::Error),
}
