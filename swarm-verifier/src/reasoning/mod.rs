//! Reasoning-service contract
//!
//! Every judgment the pipeline delegates (timeframe extraction, filter
//! validation, verdict generation) goes through [`ReasoningService`]. The
//! stages build a [`ReasoningRequest`], the service returns raw content plus
//! any citations, and the stage parses the content into its own result type.
//! Tests substitute a fake service; production uses [`OpenRouterClient`].

pub mod openrouter;
pub mod schemas;

pub use openrouter::OpenRouterClient;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Reasoning-service failures
///
/// All variants are transient from the pipeline's point of view: they abort
/// the pass and leave the prediction eligible for another attempt.
#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("No response content from reasoning service")]
    EmptyResponse,

    #[error("Malformed {stage} response: {message}")]
    Malformed { stage: Stage, message: String },

    /// The request payload could not be encoded; nothing was sent
    #[error("Failed to encode {stage} request: {message}")]
    Encode { stage: Stage, message: String },
}

/// Pipeline stage issuing a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Timeframe,
    Filter,
    Verdict,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Timeframe => "timeframe_extraction",
            Stage::Filter => "filter_validation",
            Stage::Verdict => "verdict_generation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One chat-completion style request
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningRequest {
    pub stage: Stage,
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    /// Strict JSON schema the response must follow, if enforced
    pub schema: Option<Value>,
    /// Allow the service to search the web and cite what it finds
    pub web_search: bool,
}

/// Source the service cited while answering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlCitation {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Raw response content
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReasoningResponse {
    pub content: String,
    pub citations: Vec<UrlCitation>,
}

impl ReasoningResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            citations: Vec::new(),
        }
    }
}

/// Narrow judgment function the stages depend on
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn complete(
        &self,
        request: ReasoningRequest,
    ) -> Result<ReasoningResponse, ReasoningError>;
}

/// Parse a JSON response body, tolerating a surrounding Markdown code fence
///
/// Responses produced without schema enforcement are sometimes wrapped in
/// ```` ```json ... ``` ````.
pub fn parse_content<T: DeserializeOwned>(
    stage: Stage,
    content: &str,
) -> Result<T, ReasoningError> {
    let json = strip_code_fence(content);
    if json.is_empty() {
        return Err(ReasoningError::EmptyResponse);
    }
    serde_json::from_str(json).map_err(|e| ReasoningError::Malformed {
        stage,
        message: e.to_string(),
    })
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Render a payload as the user prompt: a fixed instruction, a blank line, then
/// the payload as pretty-printed JSON
pub fn user_prompt(
    stage: Stage,
    instruction: &str,
    payload: &impl Serialize,
) -> Result<String, ReasoningError> {
    let json = serde_json::to_string_pretty(payload).map_err(|e| ReasoningError::Encode {
        stage,
        message: e.to_string(),
    })?;
    Ok(format!("{}\n\n{}", instruction, json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        valid: bool,
    }

    #[test]
    fn test_parse_plain_json() {
        let parsed: Sample = parse_content(Stage::Verdict, r#"{"valid": true}"#).unwrap();
        assert_eq!(parsed, Sample { valid: true });
    }

    #[test]
    fn test_parse_fenced_json() {
        let content = "```json\n{\"valid\": false}\n```\n";
        let parsed: Sample = parse_content(Stage::Verdict, content).unwrap();
        assert_eq!(parsed, Sample { valid: false });

        let bare = "```\n{\"valid\": true}\n```";
        let parsed: Sample = parse_content(Stage::Verdict, bare).unwrap();
        assert!(parsed.valid);
    }

    #[test]
    fn test_parse_garbage_is_malformed() {
        let err = parse_content::<Sample>(Stage::Filter, "I think it's valid").unwrap_err();
        assert!(matches!(err, ReasoningError::Malformed { stage: Stage::Filter, .. }));
    }

    #[test]
    fn test_parse_blank_is_empty_response() {
        let err = parse_content::<Sample>(Stage::Timeframe, "  \n").unwrap_err();
        assert!(matches!(err, ReasoningError::EmptyResponse));
    }

    #[test]
    fn test_user_prompt_layout() {
        let prompt = user_prompt(
            Stage::Filter,
            "Validate this prediction extraction:",
            &json!({"a": 1}),
        )
        .unwrap();
        assert_eq!(prompt, "Validate this prediction extraction:\n\n{\n  \"a\": 1\n}");
    }

    #[test]
    fn test_unencodable_payload_is_encode_error() {
        // JSON object keys must be strings
        let payload: HashMap<(i32, i32), i32> = [((1, 2), 3)].into_iter().collect();
        let err = user_prompt(Stage::Timeframe, "Extract:", &payload).unwrap_err();
        assert!(matches!(err, ReasoningError::Encode { stage: Stage::Timeframe, .. }));
        assert!(!matches!(err, ReasoningError::Transport(_)));
    }
}
