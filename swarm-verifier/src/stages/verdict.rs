//! Verdict Generator
//!
//! Retrieval-augmented judgment: the request enables web search and the
//! service's URL citations are kept as the verdict's sources. The response is
//! not schema-enforced, so parsing tolerates fenced JSON.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{StageConfig, TimeframeBounds};
use crate::reasoning::{
    parse_content, user_prompt, ReasoningError, ReasoningRequest, ReasoningService, Stage,
    UrlCitation,
};
use crate::store::{VerdictDetails, VerdictSource};

const INSTRUCTION: &str = "Generate verdict for this prediction:";

#[derive(Debug, Deserialize)]
struct VerdictBody {
    valid: bool,
    verdict: bool,
    confidence: f64,
    reasoning: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerdictResult {
    /// The prediction was genuinely checkable (not news or noise)
    pub valid: bool,
    /// The prediction came true
    pub verdict: bool,
    pub confidence: f64,
    pub reasoning: String,
    pub sources: Vec<UrlCitation>,
}

impl VerdictResult {
    pub fn to_details(&self) -> VerdictDetails {
        VerdictDetails {
            confidence: self.confidence,
            sources: if self.sources.is_empty() {
                None
            } else {
                Some(self.sources.iter().map(VerdictSource::from).collect())
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct VerdictPayload<'a> {
    context: &'a str,
    target_text: &'a str,
    timeframe_text: &'a str,
    timeframe_parsed: &'a TimeframeBounds,
}

#[derive(Debug, Clone, Copy)]
pub struct VerdictInput<'a> {
    /// Thread summary produced by the filter stage
    pub context: &'a str,
    pub target_text: &'a str,
    pub timeframe_text: &'a str,
    pub bounds: &'a TimeframeBounds,
}

#[derive(Clone)]
pub struct VerdictGenerator {
    service: Arc<dyn ReasoningService>,
    config: StageConfig,
}

impl VerdictGenerator {
    pub fn new(service: Arc<dyn ReasoningService>, config: StageConfig) -> Self {
        Self { service, config }
    }

    pub fn build_request(
        &self,
        input: &VerdictInput<'_>,
    ) -> Result<ReasoningRequest, ReasoningError> {
        let payload = VerdictPayload {
            context: input.context,
            target_text: input.target_text,
            timeframe_text: input.timeframe_text,
            timeframe_parsed: input.bounds,
        };

        Ok(ReasoningRequest {
            stage: Stage::Verdict,
            model: self.config.model.clone(),
            system_prompt: self.config.system_prompt.clone(),
            user_prompt: user_prompt(Stage::Verdict, INSTRUCTION, &payload)?,
            schema: None,
            web_search: true,
        })
    }

    pub async fn generate(
        &self,
        input: &VerdictInput<'_>,
    ) -> Result<VerdictResult, ReasoningError> {
        let request = self.build_request(input)?;
        let response = self.service.complete(request).await?;
        let body: VerdictBody = parse_content(Stage::Verdict, &response.content)?;

        Ok(VerdictResult {
            valid: body.valid,
            verdict: body.verdict,
            confidence: body.confidence,
            reasoning: body.reasoning,
            sources: response.citations,
        })
    }
}
