//! Shared fixtures for pipeline and scheduler tests
//!
//! `FakeReasoning` stands in for the reasoning service: each stage answers with
//! a scripted response (or a transport failure) and every request is recorded.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use swarm_common::models::{ParsedPrediction, PostSlice, Tweet};
use swarm_verifier::reasoning::{
    ReasoningError, ReasoningRequest, ReasoningResponse, ReasoningService, Stage, UrlCitation,
};
use swarm_verifier::stages::{ReasoningStages, StageConfig};
use swarm_verifier::workflow::{Orchestrator, PipelineSettings};

/// "Bitcoin will hit $200k" is [0, 22), "by end of 2025" is [23, 37)
pub const PREDICTION_TEXT: &str = "Bitcoin will hit $200k by end of 2025";
pub const TARGET: (i64, i64) = (0, 22);
pub const TIMEFRAME: (i64, i64) = (23, 37);

/// Fixed clock for deterministic maturity checks
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub fn tweet(id: i64, conversation_id: i64, parent: Option<i64>, text: &str) -> Tweet {
    Tweet {
        id,
        text: text.to_string(),
        author_id: 1000 + id,
        author_username: Some(format!("user{}", id)),
        date: now() - Duration::days(400) + Duration::minutes(id),
        conversation_id: Some(conversation_id),
        parent_tweet_id: parent,
        quoted_id: None,
        prediction_id: None,
    }
}

/// Tweet carrying a prediction's public id
pub fn prediction_tweet(id: i64, conversation_id: i64, prediction_id: &str) -> Tweet {
    Tweet {
        prediction_id: Some(prediction_id.to_string()),
        ..tweet(id, conversation_id, None, PREDICTION_TEXT)
    }
}

/// Prediction citing `tweet_id` with the standard target and timeframe ranges
pub fn prediction(id: &str, prediction_id: &str, tweet_id: i64) -> ParsedPrediction {
    prediction_with_slices(
        id,
        prediction_id,
        vec![PostSlice::new(tweet_id.to_string(), TARGET.0, TARGET.1)],
        vec![PostSlice::new(tweet_id.to_string(), TIMEFRAME.0, TIMEFRAME.1)],
    )
}

pub fn prediction_with_slices(
    id: &str,
    prediction_id: &str,
    target: Vec<PostSlice>,
    timeframe: Vec<PostSlice>,
) -> ParsedPrediction {
    ParsedPrediction {
        id: id.to_string(),
        prediction_id: prediction_id.to_string(),
        target,
        timeframe,
        created_at: now() - Duration::hours(1),
        llm_confidence: Some("high".to_string()),
        vagueness: Some("low".to_string()),
        topic_id: None,
    }
}

pub fn timeframe_reply(status: &str, end: Option<DateTime<Utc>>) -> String {
    json!({
        "timeframe_status": status,
        "start_utc": "2025-01-01T00:00:00Z",
        "end_utc": end.map(|e| e.to_rfc3339()),
        "precision": "year",
        "reasoning": "Explicit year-end deadline",
        "assumptions": ["End of 2025 means December 31"],
        "confidence": 0.9
    })
    .to_string()
}

pub fn mature_timeframe_reply() -> String {
    timeframe_reply("explicit", Some(Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap()))
}

pub fn filter_reply(is_valid: bool, failure_cause: Option<&str>) -> String {
    json!({
        "context": "Bitcoin will reach a price of $200,000 by the end of 2025",
        "is_valid": is_valid,
        "failure_cause": failure_cause,
        "confidence": 0.85,
        "reasoning": "Specific price target with a deadline"
    })
    .to_string()
}

pub fn verdict_reply(valid: bool, verdict: bool) -> String {
    json!({
        "valid": valid,
        "verdict": verdict,
        "confidence": 0.8,
        "reasoning": "Bitcoin peaked well below $200k during 2025"
    })
    .to_string()
}

#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(ReasoningResponse),
    Fail(String),
}

/// Reasoning service answering from a per-stage script
#[derive(Default)]
pub struct FakeReasoning {
    scripts: Mutex<HashMap<Stage, Scripted>>,
    requests: Mutex<Vec<ReasoningRequest>>,
}

impl FakeReasoning {
    /// Every stage answers so the prediction reaches a verdict of `false`
    pub fn happy_path() -> Self {
        let fake = Self::default();
        fake.reply(Stage::Timeframe, mature_timeframe_reply());
        fake.reply(Stage::Filter, filter_reply(true, None));
        fake.script(
            Stage::Verdict,
            Scripted::Reply(ReasoningResponse {
                content: verdict_reply(true, false),
                citations: vec![UrlCitation {
                    url: "https://example.com/btc-2025".to_string(),
                    title: Some("Bitcoin in 2025".to_string()),
                    content: None,
                }],
            }),
        );
        fake
    }

    pub fn reply(&self, stage: Stage, content: impl Into<String>) {
        self.script(stage, Scripted::Reply(ReasoningResponse::new(content)));
    }

    pub fn fail(&self, stage: Stage, message: &str) {
        self.script(stage, Scripted::Fail(message.to_string()));
    }

    pub fn script(&self, stage: Stage, scripted: Scripted) {
        self.scripts.lock().unwrap().insert(stage, scripted);
    }

    pub fn requests(&self) -> Vec<ReasoningRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn stages_called(&self) -> Vec<Stage> {
        self.requests().iter().map(|r| r.stage).collect()
    }
}

#[async_trait]
impl ReasoningService for FakeReasoning {
    async fn complete(
        &self,
        request: ReasoningRequest,
    ) -> Result<ReasoningResponse, ReasoningError> {
        let stage = request.stage;
        self.requests.lock().unwrap().push(request);
        match self.scripts.lock().unwrap().get(&stage).cloned() {
            Some(Scripted::Reply(response)) => Ok(response),
            Some(Scripted::Fail(message)) => Err(ReasoningError::Transport(message)),
            None => Err(ReasoningError::EmptyResponse),
        }
    }
}

pub fn orchestrator(fake: Arc<FakeReasoning>) -> Orchestrator {
    orchestrator_with(fake, PipelineSettings::default())
}

pub fn orchestrator_with(fake: Arc<FakeReasoning>, settings: PipelineSettings) -> Orchestrator {
    let service: Arc<dyn ReasoningService> = fake;
    let stages = ReasoningStages::new(
        service,
        StageConfig::new("test/timeframe", "timeframe system prompt"),
        StageConfig::new("test/filter", "filter system prompt"),
        StageConfig::new("test/verdict", "verdict system prompt"),
    );
    Orchestrator::new(stages, settings)
}
