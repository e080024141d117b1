//! Secret redaction for outbound payloads

use regex::Regex;
use serde_json::Value;

const SECRET_PATTERNS: &[(&str, &str)] = &[
    (r"sk-lf-[a-zA-Z0-9-]{20,}", "sk-lf-[REDACTED]"),
    (r"sk-[a-zA-Z0-9]{20,}", "sk-[REDACTED]"),
    (r"Bearer [a-zA-Z0-9._-]{20,}", "Bearer [REDACTED]"),
    (
        r#"token["']?\s*[:=]\s*["']?[a-zA-Z0-9._-]{20,}"#,
        "token: [REDACTED]",
    ),
    (
        r#"password["']?\s*[:=]\s*["']?[^\s"']{8,}"#,
        "password: [REDACTED]",
    ),
    (
        r#"api[_-]?key["']?\s*[:=]\s*["']?[a-zA-Z0-9._-]{16,}"#,
        "api_key: [REDACTED]",
    ),
];

/// Conservative pattern-based scrubber for keys, tokens and passwords
#[derive(Debug, Clone)]
pub struct Redactor {
    patterns: Vec<(Regex, &'static str)>,
}

impl Redactor {
    pub fn new() -> Self {
        let patterns = SECRET_PATTERNS
            .iter()
            .filter_map(|(pattern, replacement)| {
                Regex::new(&format!("(?i){}", pattern))
                    .ok()
                    .map(|re| (re, *replacement))
            })
            .collect();
        Self { patterns }
    }

    /// A redactor that passes everything through
    pub fn disabled() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.patterns.is_empty()
    }

    pub fn redact_text(&self, text: &str) -> String {
        let mut result = text.to_string();
        for (re, replacement) in &self.patterns {
            if re.is_match(&result) {
                result = re.replace_all(&result, *replacement).into_owned();
            }
        }
        result
    }

    /// Redact every string inside a JSON value
    pub fn redact_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.redact_text(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact_value(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.redact_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new()
    }
}
