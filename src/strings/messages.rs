//! # Messages
//!
//! Contains constant strings and format functions for user-facing messages.
//! Includes the usage line, response titles, failure messages, and truncation markers.

pub const USAGE: &str = concat!(
    "Usage: `!postman <request_type> <endpoint> <param:param_value> (<auth:bearer-token> optional)`\n",
    "Accepted request types: put, post, get, delete. ",
    "Quote parameters that contain spaces. Flags: `--raw`, `--headers`."
);

pub const MISSING_ARGUMENTS: &str = "Please provide the request type and endpoint.";

pub const RESPONSE_TITLE: &str = "API Response";
pub const FAILED_TITLE: &str = "API Request Failed";

pub const GENERIC_FAILURE: &str =
    "❌ **Internal error**: the response could not be displayed. Please try again.";

pub const EMPTY_BODY: &str = "_Empty response body._";
pub const HEADERS_HEADING: &str = "**Headers**";

pub fn invalid_command(err: &str) -> String {
    format!("⚠️ **Invalid command**: {err}\n\n{USAGE}")
}

pub fn missing_arguments() -> String {
    format!("⚠️ {MISSING_ARGUMENTS}\n\n{USAGE}")
}

pub fn status_line(success: bool, status: u16, reason: Option<&str>, elapsed_ms: u128, attempts: u32) -> String {
    let (marker, title) = if success {
        ("✅", RESPONSE_TITLE)
    } else {
        ("⚠️", FAILED_TITLE)
    };
    let code = match reason {
        Some(reason) => format!("{status} {reason}"),
        None => status.to_string(),
    };
    let mut line = format!("{marker} **{title}** · `{code}` · {elapsed_ms} ms");
    if attempts > 1 {
        line.push_str(&format!(" · {attempts} attempts"));
    }
    line
}

pub fn binary_body(len: usize, content_type: Option<&str>) -> String {
    format!(
        "_Binary body: {len} bytes of `{}`._",
        content_type.unwrap_or("unknown type")
    )
}

pub fn preview_truncated(shown: usize, total: usize) -> String {
    format!("_… truncated: showing {shown} of {total} bytes_")
}

pub fn download_truncated(read: usize) -> String {
    format!("_… response exceeded the download limit; only the first {read} bytes were read_")
}

pub fn request_timed_out(detail: &str) -> String {
    format!("⏱️ **{FAILED_TITLE}**: the request timed out ({detail}).")
}

pub fn network_failure(detail: &str, attempts: u32) -> String {
    if attempts > 1 {
        format!("🔌 **{FAILED_TITLE}**: network error after {attempts} attempts ({detail}).")
    } else {
        format!("🔌 **{FAILED_TITLE}**: network error ({detail}).")
    }
}

pub const REQUEST_CANCELLED: &str = "🛑 **Request cancelled.**";

pub fn status_report(capacity: usize, available: usize, in_flight: usize) -> String {
    format!(
        "**📮 Postman Status**\n* Request slots: {available} free of {capacity}\n* Commands in flight: {in_flight}"
    )
}
