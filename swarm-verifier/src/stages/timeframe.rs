//! Timeframe Extractor
//!
//! Asks the reasoning service when a prediction resolves. `missing` and
//! `event_trigger` classifications make a prediction unverifiable.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use swarm_common::models::{FailureCause, Tweet};
use swarm_common::time::to_iso;

use super::StageConfig;
use crate::reasoning::{
    parse_content, schemas, user_prompt, ReasoningError, ReasoningRequest, ReasoningService, Stage,
};
use crate::store::TimeframeDetails;

const INSTRUCTION: &str = "Extract the timeframe from this prediction:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeframeStatus {
    Explicit,
    Implicit,
    Inferred,
    EventTrigger,
    Missing,
}

impl TimeframeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeframeStatus::Explicit => "explicit",
            TimeframeStatus::Implicit => "implicit",
            TimeframeStatus::Inferred => "inferred",
            TimeframeStatus::EventTrigger => "event_trigger",
            TimeframeStatus::Missing => "missing",
        }
    }

    /// Feedback cause when this classification ends the pass
    pub fn rejection_cause(&self) -> Option<FailureCause> {
        match self {
            TimeframeStatus::Missing => Some(FailureCause::MissingTimeframe),
            TimeframeStatus::EventTrigger => Some(FailureCause::EventTrigger),
            _ => None,
        }
    }
}

impl fmt::Display for TimeframeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
    Unbounded,
    Event,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Hour => "hour",
            Precision::Day => "day",
            Precision::Week => "week",
            Precision::Month => "month",
            Precision::Quarter => "quarter",
            Precision::Year => "year",
            Precision::Unbounded => "unbounded",
            Precision::Event => "event",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimeframeExtraction {
    pub timeframe_status: TimeframeStatus,
    #[serde(default, deserialize_with = "lenient_utc")]
    pub start_utc: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_utc")]
    pub end_utc: Option<DateTime<Utc>>,
    pub precision: Precision,
    pub reasoning: String,
    #[serde(default)]
    pub assumptions: Vec<String>,
    pub confidence: f64,
}

impl TimeframeExtraction {
    pub fn to_details(&self) -> TimeframeDetails {
        TimeframeDetails {
            status: self.timeframe_status.as_str().to_string(),
            start_utc: self.start_utc,
            end_utc: self.end_utc,
            precision: self.precision.as_str().to_string(),
            reasoning: self.reasoning.clone(),
            assumptions: self.assumptions.clone(),
            confidence: self.confidence,
        }
    }
}

/// Accept RFC 3339, a zone-less date-time (taken as UTC) or a bare date
fn parse_utc(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn lenient_utc<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => parse_utc(s.trim())
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", s))),
    }
}

/// Render the thread as the plain-text context block the prompt expects
pub fn format_thread_context(tweets: &[Tweet]) -> String {
    tweets
        .iter()
        .map(|t| {
            format!(
                "Tweet ID: {}\nAuthor: {}\nDate: {}\nText: {}\n",
                t.id,
                t.author_handle(),
                to_iso(&t.date),
                t.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n\n")
}

#[derive(Debug, Serialize)]
struct TimeframePayload<'a> {
    timeframe_text: &'a str,
    target_text: &'a str,
    tweet_timestamp: String,
    current_time: String,
    thread_context: String,
}

/// What the extractor needs to know about one prediction
#[derive(Debug, Clone, Copy)]
pub struct TimeframeInput<'a> {
    pub target_text: &'a str,
    pub timeframe_text: &'a str,
    pub tweet_timestamp: DateTime<Utc>,
    pub now: DateTime<Utc>,
    pub thread: &'a [Tweet],
}

#[derive(Clone)]
pub struct TimeframeExtractor {
    service: Arc<dyn ReasoningService>,
    config: StageConfig,
}

impl TimeframeExtractor {
    pub fn new(service: Arc<dyn ReasoningService>, config: StageConfig) -> Self {
        Self { service, config }
    }

    pub fn build_request(
        &self,
        input: &TimeframeInput<'_>,
    ) -> Result<ReasoningRequest, ReasoningError> {
        let payload = TimeframePayload {
            timeframe_text: input.timeframe_text,
            target_text: input.target_text,
            tweet_timestamp: to_iso(&input.tweet_timestamp),
            current_time: to_iso(&input.now),
            thread_context: format_thread_context(input.thread),
        };

        Ok(ReasoningRequest {
            stage: Stage::Timeframe,
            model: self.config.model.clone(),
            system_prompt: self.config.system_prompt.clone(),
            user_prompt: user_prompt(Stage::Timeframe, INSTRUCTION, &payload)?,
            schema: Some(schemas::timeframe_extraction()),
            web_search: false,
        })
    }

    pub async fn extract(
        &self,
        input: &TimeframeInput<'_>,
    ) -> Result<TimeframeExtraction, ReasoningError> {
        let request = self.build_request(input)?;
        let response = self.service.complete(request).await?;
        parse_content(Stage::Timeframe, &response.content)
    }
}
