//! Persistence seam for the verification pipeline
//!
//! A pass runs entirely inside one [`VerificationTx`]: the claim, every read of
//! the conversation tree, and every outcome write. Dropping a transaction
//! without calling [`VerificationTx::commit`] rolls all of it back and releases
//! the claim, which is how a failed pass makes its prediction selectable again.
//!
//! Two adapters implement the seam:
//! - [`PgStore`] - Postgres, row lock via `FOR UPDATE ... SKIP LOCKED`
//! - [`MemoryStore`] - in-process, used by the pipeline and scheduler tests

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use swarm_common::models::{FailureCause, ParsedPrediction, Tweet, ValidationStep};

use crate::error::VerifierResult;
use crate::reasoning::UrlCitation;

/// Prediction returned by the job selector, joined to its source tweet
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedPrediction {
    pub prediction: ParsedPrediction,
    pub source_tweet_id: i64,
    pub conversation_id: Option<i64>,
}

/// Append-only rejection record
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackRecord {
    pub parsed_prediction_id: String,
    pub validation_step: ValidationStep,
    pub failure_cause: Option<FailureCause>,
    pub reason: String,
}

/// Marks a prediction as a non-canonical member of a duplicate cluster
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateRelation {
    pub prediction_id: String,
    pub canonical_id: String,
    pub similarity_score: f64,
}

/// Terminal success record
#[derive(Debug, Clone, PartialEq)]
pub struct VerdictRecord {
    pub parsed_prediction_id: String,
    pub verdict: bool,
    /// `{"feedback": <reasoning>}`
    pub context: Value,
}

impl VerdictRecord {
    pub fn new(parsed_prediction_id: impl Into<String>, verdict: bool, reasoning: &str) -> Self {
        Self {
            parsed_prediction_id: parsed_prediction_id.into(),
            verdict,
            context: json!({ "feedback": reasoning }),
        }
    }

    /// Reasoning text stored in the context
    pub fn reasoning(&self) -> Option<&str> {
        self.context.get("feedback").and_then(Value::as_str)
    }
}

/// Timeframe stage output as persisted
#[derive(Debug, Clone, PartialEq)]
pub struct TimeframeDetails {
    pub status: String,
    pub start_utc: Option<DateTime<Utc>>,
    pub end_utc: Option<DateTime<Utc>>,
    pub precision: String,
    pub reasoning: String,
    pub assumptions: Vec<String>,
    pub confidence: f64,
}

/// Filter stage output as persisted
#[derive(Debug, Clone, PartialEq)]
pub struct FilterDetails {
    pub context: String,
    pub confidence: f64,
    pub reasoning: String,
}

/// Source cited by the verdict stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictSource {
    pub url: String,
    pub title: Option<String>,
    pub content: Option<String>,
}

impl From<&UrlCitation> for VerdictSource {
    fn from(citation: &UrlCitation) -> Self {
        Self {
            url: citation.url.clone(),
            title: citation.title.clone(),
            content: citation.content.clone(),
        }
    }
}

/// Verdict stage output as persisted
#[derive(Debug, Clone, PartialEq)]
pub struct VerdictDetails {
    pub confidence: f64,
    /// `None` when the stage cited nothing
    pub sources: Option<Vec<VerdictSource>>,
}

/// One stage's contribution to a prediction's details row
#[derive(Debug, Clone, PartialEq)]
pub enum DetailsUpdate {
    Timeframe(TimeframeDetails),
    Filter(FilterDetails),
    Verdict(VerdictDetails),
}

/// Accumulated details row, one per prediction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionDetails {
    pub timeframe: Option<TimeframeDetails>,
    pub filter: Option<FilterDetails>,
    pub verdict: Option<VerdictDetails>,
}

impl PredictionDetails {
    /// Overwrite the columns owned by `update`'s stage, leaving the others intact
    pub fn apply(&mut self, update: &DetailsUpdate) {
        match update {
            DetailsUpdate::Timeframe(details) => self.timeframe = Some(details.clone()),
            DetailsUpdate::Filter(details) => self.filter = Some(details.clone()),
            DetailsUpdate::Verdict(details) => self.verdict = Some(details.clone()),
        }
    }
}

/// Opens one transaction per pipeline pass
#[async_trait]
pub trait VerificationStore: Send + Sync + 'static {
    type Tx: VerificationTx;

    async fn begin(&self) -> VerifierResult<Self::Tx>;
}

/// Transaction-scoped reads and writes for one pass
#[async_trait]
pub trait VerificationTx: Send {
    /// Claim the oldest eligible prediction created before `cutoff`
    ///
    /// Eligible means no verdict, no feedback, no duplicate relation, and no
    /// scraping job pending for the source tweet's conversation. Rows claimed by
    /// other open transactions are skipped, never waited on.
    async fn claim_next(&mut self, cutoff: DateTime<Utc>)
        -> VerifierResult<Option<ClaimedPrediction>>;

    async fn fetch_tweet(&mut self, tweet_id: i64) -> VerifierResult<Option<Tweet>>;

    async fn fetch_conversation(&mut self, conversation_id: i64) -> VerifierResult<Vec<Tweet>>;

    /// Predictions whose source tweet is one of `tweet_ids`
    async fn predictions_for_tweets(
        &mut self,
        tweet_ids: &[i64],
    ) -> VerifierResult<Vec<ParsedPrediction>>;

    async fn insert_feedback(&mut self, feedback: &FeedbackRecord) -> VerifierResult<()>;

    /// Insert or update the details row keyed by `parsed_prediction_id`
    async fn upsert_details(
        &mut self,
        parsed_prediction_id: &str,
        update: &DetailsUpdate,
    ) -> VerifierResult<()>;

    /// Returns `false` when a relation for the prediction already existed
    async fn insert_duplicate_relation(
        &mut self,
        relation: &DuplicateRelation,
    ) -> VerifierResult<bool>;

    async fn insert_verdict(&mut self, verdict: &VerdictRecord) -> VerifierResult<()>;

    async fn commit(self) -> VerifierResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_context_carries_reasoning() {
        let record = VerdictRecord::new("p1", true, "BTC closed above $100k");
        assert_eq!(record.context, json!({"feedback": "BTC closed above $100k"}));
        assert_eq!(record.reasoning(), Some("BTC closed above $100k"));
    }

    #[test]
    fn test_details_apply_keeps_other_stages() {
        let mut details = PredictionDetails::default();
        details.apply(&DetailsUpdate::Filter(FilterDetails {
            context: "ctx".into(),
            confidence: 0.9,
            reasoning: "ok".into(),
        }));
        details.apply(&DetailsUpdate::Verdict(VerdictDetails {
            confidence: 0.8,
            sources: None,
        }));
        assert!(details.timeframe.is_none());
        assert_eq!(details.filter.as_ref().map(|f| f.context.as_str()), Some("ctx"));
        assert_eq!(details.verdict.as_ref().map(|v| v.confidence), Some(0.8));
    }
}
