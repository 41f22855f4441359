//! # Request Builder
//!
//! Turns a token sequence into a validated, immutable `RequestDescriptor`.
//! Every parameter goes through one explicit rule table (`classify`) that decides whether it
//! becomes a header, the raw body, a body field or a query pair.

use crate::application::target::is_private_or_local_host;
use crate::domain::errors::ValidationError;
use crate::domain::types::{
    Method, Parameter, RenderOptions, RequestBody, RequestDescriptor, TokenSequence,
};
use indexmap::IndexMap;
use regex::Regex;
use reqwest::Url;
use reqwest::header::{HeaderName, HeaderValue};
use std::sync::LazyLock;

/// Header names recognised without an explicit `h:` prefix.
static KNOWN_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(x-[a-z0-9-]+|accept(-[a-z]+)?|authorization|proxy-authorization|content-type|content-language|cache-control|cookie|user-agent|origin|referer|prefer|api-key|apikey|if-(match|none-match|modified-since|unmodified-since))$",
    )
    .expect("known header pattern is valid")
});

/// Schemes kept as-is when given through `auth:`; anything else is treated as a bearer token.
const AUTH_SCHEMES: [&str; 4] = ["bearer", "basic", "token", "digest"];

/// Size bounds on a single descriptor.
#[derive(Debug, Clone)]
pub struct BuilderLimits {
    pub max_parameters: usize,
    pub max_value_len: usize,
    pub allow_private_targets: bool,
}

impl Default for BuilderLimits {
    fn default() -> Self {
        Self {
            max_parameters: 32,
            max_value_len: 1024,
            allow_private_targets: false,
        }
    }
}

/// Where a parameter ends up. First matching rule wins, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamRule {
    /// `auth:<token>` becomes `Authorization: Bearer <token>`.
    Authorization,
    /// `header:Name:value` or `h:Name:value`.
    ExplicitHeader,
    /// `body:<text>` is sent verbatim.
    RawBody,
    /// A key that is itself a well-known header name.
    KnownHeader,
    Query,
    BodyField,
}

pub fn classify(key: &str, method: Method) -> ParamRule {
    let lower = key.to_ascii_lowercase();
    match lower.as_str() {
        "auth" => ParamRule::Authorization,
        "header" | "h" => ParamRule::ExplicitHeader,
        "body" => ParamRule::RawBody,
        _ if KNOWN_HEADER.is_match(key) => ParamRule::KnownHeader,
        _ if method.carries_body() => ParamRule::BodyField,
        _ => ParamRule::Query,
    }
}

pub fn build(tokens: TokenSequence, limits: &BuilderLimits) -> Result<RequestDescriptor, ValidationError> {
    let method = Method::parse(&tokens.method)
        .ok_or_else(|| ValidationError::UnsupportedMethod(tokens.method.clone()))?;
    let url = validate_url(&tokens.url, limits.allow_private_targets)?;
    let options = parse_flags(&tokens.flags)?;

    if tokens.parameters.len() > limits.max_parameters {
        return Err(ValidationError::TooManyParameters {
            count: tokens.parameters.len(),
            max: limits.max_parameters,
        });
    }

    let mut query = IndexMap::new();
    let mut headers = IndexMap::new();
    let mut fields = IndexMap::new();
    let mut raw_body = None;

    for Parameter { key, value } in tokens.parameters {
        if value.len() > limits.max_value_len {
            return Err(ValidationError::ValueTooLong {
                len: value.len(),
                max: limits.max_value_len,
                key,
            });
        }

        match classify(&key, method) {
            ParamRule::Authorization => {
                if value.trim().is_empty() {
                    return Err(ValidationError::InvalidHeader("Authorization".to_string()));
                }
                insert_header(&mut headers, "Authorization", authorization_value(&value))?;
            }
            ParamRule::ExplicitHeader => {
                let (name, header_value) = value
                    .split_once(':')
                    .ok_or_else(|| ValidationError::InvalidHeader(value.trim().to_string()))?;
                insert_header(&mut headers, name.trim(), header_value.trim().to_string())?;
            }
            ParamRule::KnownHeader => {
                insert_header(&mut headers, &key, value.trim().to_string())?;
            }
            ParamRule::RawBody => {
                if !method.carries_body() {
                    return Err(ValidationError::BodyNotAllowed(method.to_string()));
                }
                raw_body = Some(value);
            }
            ParamRule::Query => {
                query.insert(key, value);
            }
            ParamRule::BodyField => {
                fields.insert(key, typed_value(&value));
            }
        }
    }

    let body = match (raw_body, method.carries_body()) {
        (Some(_), _) if !fields.is_empty() => return Err(ValidationError::ConflictingBody),
        (Some(raw), _) => Some(RequestBody::Raw(raw)),
        (None, true) => Some(RequestBody::Fields(fields)),
        (None, false) => None,
    };

    Ok(RequestDescriptor::new(method, url, query, headers, body, options))
}

fn validate_url(raw: &str, allow_private: bool) -> Result<Url, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("only http:// and https:// URLs are supported".to_string()));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(invalid("credentials in the URL are not allowed, use auth:<token>".to_string()));
    }

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| invalid("URL must include a host".to_string()))?;

    if !allow_private && is_private_or_local_host(host) {
        return Err(ValidationError::ForbiddenTarget {
            host: host.to_string(),
        });
    }

    Ok(url)
}

fn parse_flags(flags: &[String]) -> Result<RenderOptions, ValidationError> {
    let mut options = RenderOptions::default();
    for flag in flags {
        match flag.as_str() {
            "--raw" => options.raw = true,
            "--headers" => options.all_headers = true,
            other => return Err(ValidationError::UnknownFlag(other.to_string())),
        }
    }
    Ok(options)
}

fn authorization_value(value: &str) -> String {
    let value = value.trim();
    let has_scheme = value
        .split_once(' ')
        .is_some_and(|(scheme, _)| AUTH_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()));
    if has_scheme {
        value.to_string()
    } else {
        format!("Bearer {value}")
    }
}

/// Header names compare case-insensitively; the first spelling is kept, the last value wins.
fn insert_header(
    headers: &mut IndexMap<String, String>,
    name: &str,
    value: String,
) -> Result<(), ValidationError> {
    if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_str(&value).is_err() {
        return Err(ValidationError::InvalidHeader(name.to_string()));
    }

    let existing = headers
        .keys()
        .find(|k| k.eq_ignore_ascii_case(name))
        .cloned();
    headers.insert(existing.unwrap_or_else(|| name.to_string()), value);
    Ok(())
}

/// Body values are typed: `null`, booleans, numbers and any JSON literal keep their type.
fn typed_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}
