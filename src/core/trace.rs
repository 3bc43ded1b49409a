//! Scrubbing and truncation for LLM trace rows.
//!
//! Prompts are user text and provider responses echo them back, so anything
//! that lands in the `trace` table goes through [`redact_string`] first and is
//! then cut down with [`truncate_preview`].

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Maximum number of characters kept for a request or response preview.
pub const PREVIEW_CHARS: usize = 200;

struct RedactionRule {
    pattern: Regex,
    replacement: &'static str,
}

fn rule(pattern: &str, replacement: &'static str) -> RedactionRule {
    RedactionRule {
        pattern: Regex::new(pattern).expect("redaction pattern compiles"),
        replacement,
    }
}

static RULES: LazyLock<Vec<RedactionRule>> = LazyLock::new(|| {
    vec![
        rule(
            r"-----BEGIN (?:RSA |DSA |EC |OPENSSH )?PRIVATE KEY-----[\s\S]*?(?:-----END (?:RSA |DSA |EC |OPENSSH )?PRIVATE KEY-----|$)",
            "[PEM_KEY_REDACTED]",
        ),
        // Provider keys: sk-..., sk-ant-..., sk-proj-...
        rule(r"\bsk-(?:ant-|proj-)?[A-Za-z0-9_\-]{20,}", "[PROVIDER_KEY_REDACTED]"),
        rule(
            r"(A3T[A-Z0-9]|AKIA|AGPA|AIDA|AROA|AIPA|ANPA|ANVA|ASIA)[0-9A-Z]{16}",
            "[AWS_KEY_REDACTED]",
        ),
        rule(r"(ghp|gho|ghu|ghs|ghr)_[a-zA-Z0-9_]{36,255}", "[GITHUB_TOKEN_REDACTED]"),
        rule(r"(?i)bearer\s+[a-zA-Z0-9_\-\.]{20,}", "[BEARER_REDACTED]"),
        rule(
            r#"(?i)(postgres|mysql|mongodb|redis)://[^\s'"]+:[^\s'"]+@[^\s'"]+"#,
            "[CONNECTION_STRING_REDACTED]",
        ),
        rule(
            r#"(?i)(api[_-]?key|apikey|secret[_-]?key)['"]?\s*[:=]\s*['"]?[a-zA-Z0-9_\-]{16,}['"]?"#,
            "[API_KEY_REDACTED]",
        ),
        rule(
            r#"(?i)(password|passwd|pwd)['"]?\s*[:=]\s*['"]?[^\s'"]{8,}['"]?"#,
            "[PASSWORD_REDACTED]",
        ),
    ]
});

/// Redact secrets from a plain string value.
pub fn redact_string(input: &str) -> String {
    let mut result = input.to_string();
    for rule in RULES.iter() {
        result = rule
            .pattern
            .replace_all(&result, rule.replacement)
            .to_string();
    }
    result
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    ["token", "secret", "password", "api_key", "authorization"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Recursively redact a JSON value: sensitive keys are blanked wholesale,
/// string leaves are scanned with [`redact_string`].
pub fn redact(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, val) in map {
                if is_sensitive_key(&key) {
                    out.insert(key, Value::String("[REDACTED]".to_string()));
                } else {
                    out.insert(key, redact(val));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(redact).collect()),
        Value::String(s) => Value::String(redact_string(&s)),
        other => other,
    }
}

/// Cut `input` to at most [`PREVIEW_CHARS`] characters, marking the cut with `…`.
pub fn truncate_preview(input: &str) -> String {
    if input.chars().count() <= PREVIEW_CHARS {
        return input.to_string();
    }
    let mut out: String = input.chars().take(PREVIEW_CHARS - 1).collect();
    out.push('…');
    out
}

/// Redact, then truncate. This is what the trace table stores.
pub fn scrub_for_trace(input: &str) -> String {
    truncate_preview(&redact_string(input))
}

/// Rough token estimate: ~4 chars per token.
pub fn estimate_tokens(text: &str) -> i64 {
    (text.len() as i64 + 3) / 4
}
