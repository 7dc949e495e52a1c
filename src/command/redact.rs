//! Masking of credentials in command lines and JSON payloads before they
//! reach logs or the process table.

use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::LazyLock;

pub const MASK: &str = "***";

const SENSITIVE: &str = r"(?:password|passwd|token|secret|private_key|api_key|access_key)";

static JSON_PAIR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r#"(?i)("[^"]*{SENSITIVE}[^"]*"\s*:\s*)(?:"(?:[^"\\]|\\.)*"|-?[0-9][0-9.eE+-]*|true|false)"#
    ))
    .expect("Invalid regex pattern")
});

/// Single-quoted payload of `echo -e '<json>'`, with `'\''` escapes.
static ECHO_PAYLOAD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(echo -e ')((?:[^']|'\\'')*)'"#).expect("Invalid regex pattern")
});

static ASSIGNMENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r#"(?i)([\w.-]*{SENSITIVE}[\w.-]*=)[^\s"']*"#))
        .expect("Invalid regex pattern")
});

static SENSITIVE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("(?i){SENSITIVE}")).expect("Invalid regex pattern"));

pub fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEY.is_match(key)
}

/// Mask credentials in a command line or free text.
///
/// An `echo -e '<json>'` payload that parses is rewritten with
/// [`redact_json`], so arrays and objects under sensitive keys go too. Other
/// `"secret_key": value` pairs and `SECRET=value` assignments are masked
/// textually.
pub fn redact_command(command: &str) -> String {
    let payloads = ECHO_PAYLOAD_PATTERN.replace_all(command, |caps: &Captures<'_>| {
        let quoted = &caps[2];
        match serde_json::from_str::<Value>(&quoted.replace(r"'\''", "'")) {
            Ok(json) => format!(
                "{}{}'",
                &caps[1],
                redact_json(&json).to_string().replace('\'', r"'\''")
            ),
            Err(_) => caps[0].to_string(),
        }
    });
    let masked = JSON_PAIR_PATTERN.replace_all(&payloads, format!(r#"${{1}}"{MASK}""#));
    ASSIGNMENT_PATTERN
        .replace_all(&masked, format!("${{1}}{MASK}"))
        .into_owned()
}

/// Copy of `value` with every non-null value under a sensitive key replaced
/// by the mask.
pub fn redact_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, inner)| {
                    let redacted = if is_sensitive_key(key) && !inner.is_null() {
                        Value::String(MASK.to_string())
                    } else {
                        redact_json(inner)
                    };
                    (key.clone(), redacted)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_json).collect()),
        other => other.clone(),
    }
}
