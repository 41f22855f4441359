//! # Response Renderer
//!
//! Turns a `DispatchResult` (or a pre-dispatch `PostmanError`) into bounded Markdown for the chat.
//! Rendering is pure: the same input always yields the same text. Credentials are masked in shown
//! headers and scrubbed from bodies and failure details.

use reqwest::StatusCode;
use serde_json::Value;

use crate::application::redact::{redact_header, redact_secrets};
use crate::domain::errors::{ParseError, PostmanError, RenderError};
use crate::domain::types::{DispatchFailure, DispatchResult, FailureKind, ResponseSummary};
use crate::strings::messages;

const FENCE: &str = "```";
const CLOSE_FENCE: &str = "\n```";
/// Chunks smaller than this could not hold a re-opened fence, a marker line and a closing fence.
const MIN_CHUNK_LEN: usize = 256;
const MAX_DETAIL_LEN: usize = 300;

/// Response headers shown without `--headers`.
const SELECTED_HEADERS: &[&str] = &[
    "content-type",
    "content-length",
    "location",
    "retry-after",
    "x-request-id",
];

#[derive(Debug, Clone)]
pub struct Renderer {
    body_preview_bytes: usize,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(2000)
    }
}

/// Final text for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedOutput {
    text: String,
}

impl Renderer {
    pub fn new(body_preview_bytes: usize) -> Self {
        Self { body_preview_bytes }
    }

    /// Total over every result. A formatting defect is logged and replaced by a generic message.
    pub fn render(&self, result: &DispatchResult) -> RenderedOutput {
        let text = match result {
            DispatchResult::Success(summary) => match self.render_success(summary) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Failed to render response: {}", e);
                    messages::GENERIC_FAILURE.to_string()
                }
            },
            DispatchResult::Failure(failure) => render_failure(failure),
        };
        RenderedOutput::new(text)
    }

    /// Guidance for a command that never reached the network.
    pub fn render_error(&self, error: &PostmanError) -> RenderedOutput {
        let text = match error {
            PostmanError::Parse(ParseError::MissingMethod | ParseError::MissingUrl) => {
                messages::missing_arguments()
            }
            other => messages::invalid_command(&other.to_string()),
        };
        RenderedOutput::new(text)
    }

    fn render_success(&self, summary: &ResponseSummary) -> Result<String, RenderError> {
        let reason = StatusCode::from_u16(summary.status)
            .ok()
            .and_then(|code| code.canonical_reason());
        let mut sections = vec![messages::status_line(
            summary.status < 400,
            summary.status,
            reason,
            summary.elapsed.as_millis(),
            summary.attempts,
        )];

        let headers = self.render_headers(summary);
        if !headers.is_empty() {
            sections.push(headers);
        }
        sections.push(self.render_body(summary)?);
        Ok(sections.join("\n\n"))
    }

    fn render_headers(&self, summary: &ResponseSummary) -> String {
        let lines: Vec<String> = summary
            .headers
            .iter()
            .filter(|(name, _)| summary.options.all_headers || is_selected_header(name))
            .map(|(name, value)| {
                let value = redact_secrets(&redact_header(name, value), &summary.secrets);
                format!("- `{name}`: {}", escape_fences(&value))
            })
            .collect();

        if lines.is_empty() {
            return String::new();
        }
        format!("{}\n{}", messages::HEADERS_HEADING, lines.join("\n"))
    }

    fn render_body(&self, summary: &ResponseSummary) -> Result<String, RenderError> {
        if summary.body.is_empty() {
            return Ok(messages::EMPTY_BODY.to_string());
        }

        let content_type = header_value(&summary.headers, "content-type");
        let json_typed = content_type.is_some_and(is_json_type);

        let (language, formatted) = match std::str::from_utf8(&summary.body) {
            Ok(text) => {
                // Untyped bodies that parse as JSON are treated as JSON.
                let parsed = if json_typed || content_type.is_none() {
                    serde_json::from_str::<Value>(text).ok()
                } else {
                    None
                };
                match parsed {
                    Some(value) if !summary.options.raw => ("json", serde_json::to_string_pretty(&value)?),
                    Some(_) => ("json", text.to_string()),
                    None if json_typed => ("json", text.to_string()),
                    None => ("", text.to_string()),
                }
            }
            Err(_) if content_type.is_some_and(is_text_type) => {
                ("", String::from_utf8_lossy(&summary.body).into_owned())
            }
            Err(_) => return Ok(messages::binary_body(summary.body.len(), content_type)),
        };

        let cleaned = escape_fences(&redact_secrets(&formatted, &summary.secrets));
        let (preview, cut) = truncate_at_char_boundary(&cleaned, self.body_preview_bytes);

        let mut out = format!("{FENCE}{language}\n{preview}\n{FENCE}");
        if cut {
            out.push('\n');
            out.push_str(&messages::preview_truncated(preview.len(), cleaned.len()));
        }
        if summary.body_truncated {
            out.push('\n');
            out.push_str(&messages::download_truncated(summary.body.len()));
        }
        Ok(out)
    }
}

fn render_failure(failure: &DispatchFailure) -> String {
    let detail = redact_secrets(&failure.detail, &failure.secrets);
    let (detail, _) = truncate_at_char_boundary(&detail, MAX_DETAIL_LEN);
    let detail = escape_fences(detail);
    match failure.kind {
        FailureKind::Timeout => messages::request_timed_out(&detail),
        FailureKind::Network => messages::network_failure(&detail, failure.attempts),
        FailureKind::Cancelled => messages::REQUEST_CANCELLED.to_string(),
    }
}

fn is_selected_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SELECTED_HEADERS.contains(&lower.as_str()) || lower.starts_with("x-ratelimit-")
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

fn is_json_type(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json") || essence == "text/json"
}

fn is_text_type(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    lower.starts_with("text/")
        || lower.contains("json")
        || lower.contains("xml")
        || lower.contains("javascript")
        || lower.contains("x-www-form-urlencoded")
}

/// Keeps remote text from closing our code fence: no two backticks stay adjacent.
fn escape_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev = None;
    for c in text.chars() {
        if c == '`' && prev == Some('`') {
            out.push('\u{200b}');
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

fn truncate_at_char_boundary(text: &str, max: usize) -> (&str, bool) {
    if text.len() <= max {
        return (text, false);
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    (&text[..end], true)
}

impl RenderedOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Splits the text into messages of at most `max_len` bytes (at least 256).
    ///
    /// Splits between lines where possible. A line is only cut when it alone exceeds the budget,
    /// and then on a char boundary. A chunk that ends inside a code fence gets a closing fence and
    /// the next chunk re-opens it with the same language.
    pub fn chunks(&self, max_len: usize) -> Vec<String> {
        let max_len = max_len.max(MIN_CHUNK_LEN);
        if self.text.len() <= max_len {
            return vec![self.text.clone()];
        }

        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut open_fence: Option<String> = None;

        for line in self.text.split('\n') {
            let is_fence = line.trim_start().starts_with(FENCE);
            let fence_after = match (&open_fence, is_fence) {
                (None, true) => Some(line.trim().to_string()),
                (Some(_), true) => None,
                (open, false) => open.clone(),
            };
            let reserve = if fence_after.is_some() { CLOSE_FENCE.len() } else { 0 };
            let opener_len = open_fence.as_ref().map_or(0, |o| o.len() + 1);
            let budget = max_len - CLOSE_FENCE.len() - opener_len.max(FENCE.len() + 1);

            for piece in split_long_line(line, budget) {
                let needed = if current.is_empty() { piece.len() } else { current.len() + 1 + piece.len() };
                if !current.is_empty() && needed + reserve > max_len {
                    if open_fence.is_some() {
                        current.push_str(CLOSE_FENCE);
                    }
                    chunks.push(std::mem::take(&mut current));
                    if let Some(opener) = &open_fence {
                        current.push_str(opener);
                    }
                }
                if !current.is_empty() {
                    current.push('\n');
                }
                current.push_str(piece);
            }
            open_fence = fence_after;
        }

        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

impl std::fmt::Display for RenderedOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

fn split_long_line(line: &str, budget: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = line;
    while rest.len() > budget {
        let (head, _) = truncate_at_char_boundary(rest, budget);
        pieces.push(head);
        rest = &rest[head.len()..];
    }
    pieces.push(rest);
    pieces
}
