//! Filter Validator
//!
//! Semantic admission check: is the extraction a genuine, falsifiable,
//! publicly verifiable prediction?

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use swarm_common::models::{FailureCause, PostSlice};
use swarm_common::text::utf16_slice;
use swarm_common::time::to_iso;

use super::{StageConfig, TimeframeBounds};
use crate::reasoning::{
    parse_content, schemas, user_prompt, ReasoningError, ReasoningRequest, ReasoningService, Stage,
};
use crate::services::conversation::ThreadContext;
use crate::store::FilterDetails;

const INSTRUCTION: &str = "Validate this prediction extraction:";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilterValidation {
    pub context: String,
    pub is_valid: bool,
    #[serde(default)]
    pub failure_cause: Option<FailureCause>,
    pub confidence: f64,
    pub reasoning: String,
}

impl FilterValidation {
    pub fn to_details(&self) -> FilterDetails {
        FilterDetails {
            context: self.context.clone(),
            confidence: self.confidence,
            reasoning: self.reasoning.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ThreadTweet {
    tweet_id: String,
    author: String,
    date: String,
    text: String,
}

#[derive(Debug, Serialize)]
struct SliceWithText {
    tweet_id: String,
    start: i64,
    end: i64,
    text: String,
}

#[derive(Debug, Serialize)]
struct FilterPayload {
    current_date: String,
    thread_tweets: Vec<ThreadTweet>,
    target_slices: Vec<SliceWithText>,
    timeframe_slices: Vec<SliceWithText>,
    timeframe_parsed: TimeframeBounds,
}

fn slices_with_text(slices: &[PostSlice], thread: &ThreadContext) -> Vec<SliceWithText> {
    slices
        .iter()
        .map(|slice| SliceWithText {
            tweet_id: slice.tweet_id().to_string(),
            start: slice.start,
            end: slice.end,
            text: thread
                .get(slice.tweet_id())
                .map(|t| utf16_slice(&t.text, slice.start, slice.end))
                .unwrap_or_default(),
        })
        .collect()
}

/// What the validator needs to know about one prediction
#[derive(Debug, Clone, Copy)]
pub struct FilterInput<'a> {
    pub thread: &'a ThreadContext,
    pub target: &'a [PostSlice],
    pub timeframe: &'a [PostSlice],
    pub bounds: &'a TimeframeBounds,
    pub now: DateTime<Utc>,
}

#[derive(Clone)]
pub struct FilterValidator {
    service: Arc<dyn ReasoningService>,
    config: StageConfig,
}

impl FilterValidator {
    pub fn new(service: Arc<dyn ReasoningService>, config: StageConfig) -> Self {
        Self { service, config }
    }

    pub fn build_request(
        &self,
        input: &FilterInput<'_>,
    ) -> Result<ReasoningRequest, ReasoningError> {
        let payload = FilterPayload {
            current_date: to_iso(&input.now),
            thread_tweets: input
                .thread
                .tweets()
                .iter()
                .map(|t| ThreadTweet {
                    tweet_id: t.id.to_string(),
                    author: t.author_handle(),
                    date: to_iso(&t.date),
                    text: t.text.clone(),
                })
                .collect(),
            target_slices: slices_with_text(input.target, input.thread),
            timeframe_slices: slices_with_text(input.timeframe, input.thread),
            timeframe_parsed: input.bounds.clone(),
        };

        Ok(ReasoningRequest {
            stage: Stage::Filter,
            model: self.config.model.clone(),
            system_prompt: self.config.system_prompt.clone(),
            user_prompt: user_prompt(Stage::Filter, INSTRUCTION, &payload)?,
            schema: Some(schemas::filter_validation()),
            web_search: false,
        })
    }

    pub async fn validate(
        &self,
        input: &FilterInput<'_>,
    ) -> Result<FilterValidation, ReasoningError> {
        let request = self.build_request(input)?;
        let response = self.service.complete(request).await?;
        parse_content(Stage::Filter, &response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::ReasoningResponse;
    use crate::stages::Precision;
    use chrono::TimeZone;
    use serde_json::Value;
    use std::sync::Mutex;
    use swarm_common::models::Tweet;

    struct Recording {
        reply: String,
        seen: Mutex<Vec<ReasoningRequest>>,
    }

    #[async_trait::async_trait]
    impl ReasoningService for Recording {
        async fn complete(
            &self,
            request: ReasoningRequest,
        ) -> Result<ReasoningResponse, ReasoningError> {
            self.seen.lock().unwrap().push(request);
            Ok(ReasoningResponse::new(self.reply.clone()))
        }
    }

    fn thread() -> ThreadContext {
        ThreadContext::new(vec![Tweet {
            id: 501,
            text: "SOL flips ETH before July 2025".into(),
            author_id: 9,
            author_username: Some("degen".into()),
            date: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            conversation_id: Some(501),
            parent_tweet_id: None,
            quoted_id: None,
            prediction_id: Some("pub".into()),
        }])
    }

    #[tokio::test]
    async fn test_validate_sends_slices_with_text_and_parses_rejection() {
        let service = Arc::new(Recording {
            reply: r#"{"context":"Joke thread","is_valid":false,"failure_cause":"SARCASM",
                "confidence":0.8,"reasoning":"Author is joking"}"#
                .into(),
            seen: Mutex::new(Vec::new()),
        });
        let validator = FilterValidator::new(service.clone(), StageConfig::new("m", "sys"));
        let thread = thread();
        let bounds = TimeframeBounds {
            start_utc: None,
            end_utc: Some("2025-07-01T00:00:00.000Z".into()),
            precision: Precision::Month,
        };
        let target = [PostSlice::new("501", 0, 13)];
        let timeframe = [PostSlice::new("501", 14, 30)];

        let result = validator
            .validate(&FilterInput {
                thread: &thread,
                target: &target,
                timeframe: &timeframe,
                bounds: &bounds,
                now: Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap(),
            })
            .await
            .unwrap();

        assert!(!result.is_valid);
        assert_eq!(result.failure_cause, Some(FailureCause::Sarcasm));

        let seen = service.seen.lock().unwrap();
        let body = seen[0]
            .user_prompt
            .strip_prefix("Validate this prediction extraction:\n\n")
            .unwrap();
        let json: Value = serde_json::from_str(body).unwrap();
        assert_eq!(json["target_slices"][0]["text"], "SOL flips ETH");
        assert_eq!(json["timeframe_slices"][0]["text"], "before July 2025");
        assert_eq!(json["thread_tweets"][0]["author"], "@degen");
        assert_eq!(json["timeframe_parsed"]["precision"], "month");
        assert_eq!(json["timeframe_parsed"]["start_utc"], Value::Null);
    }

    #[test]
    fn test_valid_result_has_null_cause() {
        let parsed: FilterValidation = parse_content(
            Stage::Filter,
            r#"{"context":"c","is_valid":true,"failure_cause":null,"confidence":0.9,"reasoning":"r"}"#,
        )
        .unwrap();
        assert!(parsed.is_valid);
        assert_eq!(parsed.failure_cause, None);
    }
}
