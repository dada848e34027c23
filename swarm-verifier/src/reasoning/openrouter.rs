//! OpenRouter chat-completions client

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ReasoningError, ReasoningRequest, ReasoningResponse, ReasoningService, UrlCitation};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const USER_AGENT: &str = concat!("swarm-verifier/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
    #[serde(default)]
    annotations: Vec<Annotation>,
}

#[derive(Debug, Deserialize)]
struct Annotation {
    #[serde(rename = "type")]
    kind: String,
    url_citation: Option<UrlCitation>,
}

/// Reasoning service backed by OpenRouter
pub struct OpenRouterClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    temperature: f64,
}

impl OpenRouterClient {
    /// `timeout` bounds each request end to end; a request that hangs past it
    /// fails with [`ReasoningError::Transport`]
    pub fn new(
        api_key: String,
        base_url: String,
        temperature: f64,
        timeout: Duration,
    ) -> Result<Self, ReasoningError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ReasoningError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            temperature,
        })
    }

    fn request_body(&self, request: &ReasoningRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_prompt },
            ],
            "temperature": self.temperature,
        });

        if let Some(schema) = &request.schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": request.stage.as_str(),
                    "strict": true,
                    "schema": schema,
                },
            });
        }

        if request.web_search {
            body["plugins"] = json!([{ "id": "web" }]);
        }

        body
    }
}

fn into_response(completion: CompletionResponse) -> Result<ReasoningResponse, ReasoningError> {
    let message = completion
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or(ReasoningError::EmptyResponse)?;

    let content = match message.content {
        Some(content) if !content.trim().is_empty() => content,
        _ => return Err(ReasoningError::EmptyResponse),
    };

    let citations = message
        .annotations
        .into_iter()
        .filter(|a| a.kind == "url_citation")
        .filter_map(|a| a.url_citation)
        .collect();

    Ok(ReasoningResponse { content, citations })
}

#[async_trait]
impl ReasoningService for OpenRouterClient {
    async fn complete(
        &self,
        request: ReasoningRequest,
    ) -> Result<ReasoningResponse, ReasoningError> {
        let url = format!("{}/chat/completions", self.base_url);

        tracing::debug!(
            stage = %request.stage,
            model = %request.model,
            web_search = request.web_search,
            "Sending reasoning request"
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(&request))
            .send()
            .await
            .map_err(|e| ReasoningError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReasoningError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ReasoningError::Transport(format!("Decode response failed: {}", e)))?;

        into_response(completion)
    }
}
