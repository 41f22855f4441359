//! # Redaction
//!
//! Keeps credentials out of chat output. Sensitive header values are masked wherever headers are
//! shown, and the secret values a request carried are scrubbed from anything the remote end echoes.

use crate::domain::types::RequestDescriptor;

pub const REDACTED: &str = "***REDACTED***";

/// Secrets shorter than this are not scrubbed from free text; they would mangle ordinary words.
const MIN_SECRET_LEN: usize = 4;

pub fn is_sensitive_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.contains("authorization")
        || lower.contains("cookie")
        || lower.contains("api-key")
        || lower.contains("apikey")
        || lower.contains("token")
        || lower.contains("secret")
}

/// Header values of `descriptor` that must never be echoed back to the chat.
pub fn secrets_of(descriptor: &RequestDescriptor) -> Vec<String> {
    let mut secrets: Vec<String> = descriptor
        .headers()
        .iter()
        .filter(|(name, _)| is_sensitive_header(name))
        .flat_map(|(_, value)| {
            let mut values = vec![value.trim().to_string()];
            // The bare credential too, in case the server echoes it without its scheme.
            if let Some((_, credential)) = value.trim().split_once(' ') {
                values.push(credential.trim().to_string());
            }
            values
        })
        .filter(|v| v.len() >= MIN_SECRET_LEN)
        .collect();

    // Longest first so a full `Bearer x` is replaced before its bare credential.
    secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    secrets.dedup();
    secrets
}

pub fn redact_secrets(text: &str, secrets: &[String]) -> String {
    secrets
        .iter()
        .filter(|s| s.len() >= MIN_SECRET_LEN)
        .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), REDACTED))
}

/// Masks sensitive header values for display.
pub fn redact_header(name: &str, value: &str) -> String {
    if is_sensitive_header(name) {
        REDACTED.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::builder::{BuilderLimits, build};
    use crate::application::tokenizer::tokenize;

    #[test]
    fn test_sensitive_header_names() {
        assert!(is_sensitive_header("Authorization"));
        assert!(is_sensitive_header("proxy-authorization"));
        assert!(is_sensitive_header("Set-Cookie"));
        assert!(is_sensitive_header("X-Api-Key"));
        assert!(is_sensitive_header("X-Auth-Token"));
        assert!(!is_sensitive_header("Content-Type"));
        assert!(!is_sensitive_header("X-Request-Id"));
    }

    #[test]
    fn test_secrets_include_bare_credential() {
        let tokens = tokenize(r#"get https://api.example.com "auth:abc123" "accept:json""#).unwrap();
        let descriptor = build(tokens, &BuilderLimits::default()).unwrap();
        assert_eq!(secrets_of(&descriptor), vec!["Bearer abc123", "abc123"]);
    }

    #[test]
    fn test_redact_secrets_scrubs_echoes() {
        let secrets = vec!["Bearer abc123".to_string(), "abc123".to_string()];
        let text = r#"{"headers":{"Authorization":"Bearer abc123"},"token":"abc123"}"#;
        let redacted = redact_secrets(text, &secrets);
        assert!(!redacted.contains("abc123"));
        assert_eq!(redacted.matches(REDACTED).count(), 2);
    }

    #[test]
    fn test_short_secrets_are_ignored() {
        let redacted = redact_secrets("a b c", &["a".to_string()]);
        assert_eq!(redacted, "a b c");
    }
}
