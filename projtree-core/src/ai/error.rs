use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AiError {
    /// The backend reported an HTTP-like status in a structured field.
    #[error("Request failed with status {code}: {message}")]
    Status { code: u16, message: String },

    /// Anything else. The status, if any, has to be recovered from the
    /// message text.
    #[error("{0}")]
    Other(anyhow::Error),
}

impl AiError {
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    pub fn other(message: impl std::fmt::Display) -> Self {
        Self::Other(anyhow::anyhow!("{message}"))
    }

    /// The status code carried by this error: the structured field first,
    /// then a nested `code` in a JSON message, then a `[nnn]` marker in the
    /// message text.
    pub fn status_code(&self) -> Option<u16> {
        let message = match self {
            AiError::Status { code, .. } => return Some(*code),
            AiError::Other(source) => source.to_string(),
        };

        if let Ok(value) = serde_json::from_str::<Value>(&message) {
            if let Some(code) = find_nested_code(&value) {
                return Some(code);
            }
        }

        bracketed_status(&message)
    }
}

impl From<serde_json::Error> for AiError {
    fn from(source: serde_json::Error) -> Self {
        Self::Other(anyhow::anyhow!(source))
    }
}

impl From<anyhow::Error> for AiError {
    fn from(source: anyhow::Error) -> Self {
        Self::Other(source)
    }
}

fn as_status(value: &Value) -> Option<u16> {
    let code = value.as_u64()?;
    (100..=599).contains(&code).then_some(code as u16)
}

/// Looks for `code` on the object itself, then inside `error`, so both
/// `{"code": 503}` and `{"error": {"code": 503, ...}}` are recognised.
fn find_nested_code(value: &Value) -> Option<u16> {
    if let Some(code) = value.get("code").and_then(as_status) {
        return Some(code);
    }
    value.get("error").and_then(find_nested_code)
}

fn bracketed_status(message: &str) -> Option<u16> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"\[(\d{3})\]").expect("valid regex"));
    pattern
        .captures(message)
        .and_then(|captures| captures.get(1))
        .and_then(|code| code.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_status() {
        assert_eq!(AiError::status(500, "boom").status_code(), Some(500));
    }

    #[test]
    fn test_json_message_status() {
        let error = AiError::other(r#"{"error":{"code":503,"message":"overloaded"}}"#);
        assert_eq!(error.status_code(), Some(503));

        let error = AiError::other(r#"{"code":429}"#);
        assert_eq!(error.status_code(), Some(429));
    }

    #[test]
    fn test_bracketed_status() {
        let error = AiError::other("got status: [503] Service Unavailable");
        assert_eq!(error.status_code(), Some(503));
    }

    #[test]
    fn test_json_without_code_falls_back_to_brackets() {
        let error = AiError::other(r#"{"error":{"message":"[429] slow down"}}"#);
        assert_eq!(error.status_code(), Some(429));
    }

    #[test]
    fn test_no_status() {
        assert_eq!(AiError::other("connection reset").status_code(), None);
        assert_eq!(AiError::other("[12] not a status").status_code(), None);
    }
}
