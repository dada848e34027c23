//! Shared domain models
//!
//! Tweets and parsed predictions are produced upstream by the ingestion
//! pipeline and are read-only here. The enums at the bottom name the outcomes
//! the verifier records against a prediction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Scraped tweet with its reply-chain pointers
#[derive(Debug, Clone, PartialEq)]
pub struct Tweet {
    pub id: i64,
    pub text: String,
    pub author_id: i64,
    /// Username of the author, when the user row has been scraped
    pub author_username: Option<String>,
    pub date: DateTime<Utc>,
    pub conversation_id: Option<i64>,
    /// Tweet this one replies to
    pub parent_tweet_id: Option<i64>,
    pub quoted_id: Option<i64>,
    /// Public id of the prediction extracted from this tweet, if any
    pub prediction_id: Option<String>,
}

impl Tweet {
    /// Author rendered for reasoning payloads: `@username`, or `@<author id>` when
    /// the username is unknown
    pub fn author_handle(&self) -> String {
        match &self.author_username {
            Some(username) => format!("@{}", username),
            None => format!("@{}", self.author_id),
        }
    }
}

/// Tweet a slice points into
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SliceSource {
    pub tweet_id: String,
}

/// Half-open character range `[start, end)` into one tweet's text
///
/// Offsets count UTF-16 code units (see [`crate::text`]). They are kept signed
/// because upstream extraction may emit negative values, which validation
/// rejects rather than the deserializer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSlice {
    pub source: SliceSource,
    pub start: i64,
    pub end: i64,
}

impl PostSlice {
    pub fn new(tweet_id: impl Into<String>, start: i64, end: i64) -> Self {
        Self {
            source: SliceSource {
                tweet_id: tweet_id.into(),
            },
            start,
            end,
        }
    }

    pub fn tweet_id(&self) -> &str {
        &self.source.tweet_id
    }
}

/// Prediction extracted from a tweet thread
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPrediction {
    /// Row id; also the ordering key for canonical selection
    pub id: String,
    /// Stable public prediction id shared with the source tweet
    pub prediction_id: String,
    /// Slices holding the falsifiable claim
    pub target: Vec<PostSlice>,
    /// Slices holding the resolution window
    pub timeframe: Vec<PostSlice>,
    pub created_at: DateTime<Utc>,
    pub llm_confidence: Option<String>,
    pub vagueness: Option<String>,
    pub topic_id: Option<String>,
}

/// Pipeline stage a feedback row is recorded against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStep {
    SliceValidation,
    TimeframeExtraction,
    FilterValidation,
    VerdictValidation,
}

impl ValidationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStep::SliceValidation => "slice_validation",
            ValidationStep::TimeframeExtraction => "timeframe_extraction",
            ValidationStep::FilterValidation => "filter_validation",
            ValidationStep::VerdictValidation => "verdict_validation",
        }
    }
}

impl fmt::Display for ValidationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationStep {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "slice_validation" => Ok(ValidationStep::SliceValidation),
            "timeframe_extraction" => Ok(ValidationStep::TimeframeExtraction),
            "filter_validation" => Ok(ValidationStep::FilterValidation),
            "verdict_validation" => Ok(ValidationStep::VerdictValidation),
            other => Err(Error::InvalidRecord(format!(
                "Unknown validation step: {}",
                other
            ))),
        }
    }
}

/// Reason a prediction was rejected
///
/// Covers structural slice errors, timeframe classification outcomes and the
/// semantic filter taxonomy. Serialized in SCREAMING_SNAKE_CASE, matching the
/// values the reasoning service emits for the filter stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCause {
    // Slice validation
    EmptySlices,
    MissingTweet,
    NegativeIndices,
    InvalidRange,
    SliceTooShort,
    OutOfBounds,

    // Timeframe extraction
    MissingTimeframe,
    EventTrigger,

    // Filter validation (FUTURE_TIMEFRAME is shared with the maturity gate)
    BrokenExtraction,
    VagueTarget,
    PresentState,
    Negation,
    Sarcasm,
    QuotingOthers,
    HeavyHedging,
    FutureTimeframe,
    SelfAnnouncement,
    PersonalAction,
    Other,
}

impl FailureCause {
    pub const ALL: [FailureCause; 19] = [
        FailureCause::EmptySlices,
        FailureCause::MissingTweet,
        FailureCause::NegativeIndices,
        FailureCause::InvalidRange,
        FailureCause::SliceTooShort,
        FailureCause::OutOfBounds,
        FailureCause::MissingTimeframe,
        FailureCause::EventTrigger,
        FailureCause::BrokenExtraction,
        FailureCause::VagueTarget,
        FailureCause::PresentState,
        FailureCause::Negation,
        FailureCause::Sarcasm,
        FailureCause::QuotingOthers,
        FailureCause::HeavyHedging,
        FailureCause::FutureTimeframe,
        FailureCause::SelfAnnouncement,
        FailureCause::PersonalAction,
        FailureCause::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCause::EmptySlices => "EMPTY_SLICES",
            FailureCause::MissingTweet => "MISSING_TWEET",
            FailureCause::NegativeIndices => "NEGATIVE_INDICES",
            FailureCause::InvalidRange => "INVALID_RANGE",
            FailureCause::SliceTooShort => "SLICE_TOO_SHORT",
            FailureCause::OutOfBounds => "OUT_OF_BOUNDS",
            FailureCause::MissingTimeframe => "MISSING_TIMEFRAME",
            FailureCause::EventTrigger => "EVENT_TRIGGER",
            FailureCause::BrokenExtraction => "BROKEN_EXTRACTION",
            FailureCause::VagueTarget => "VAGUE_TARGET",
            FailureCause::PresentState => "PRESENT_STATE",
            FailureCause::Negation => "NEGATION",
            FailureCause::Sarcasm => "SARCASM",
            FailureCause::QuotingOthers => "QUOTING_OTHERS",
            FailureCause::HeavyHedging => "HEAVY_HEDGING",
            FailureCause::FutureTimeframe => "FUTURE_TIMEFRAME",
            FailureCause::SelfAnnouncement => "SELF_ANNOUNCEMENT",
            FailureCause::PersonalAction => "PERSONAL_ACTION",
            FailureCause::Other => "OTHER",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureCause {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FailureCause::ALL
            .iter()
            .copied()
            .find(|cause| cause.as_str() == s)
            .ok_or_else(|| Error::InvalidRecord(format!("Unknown failure cause: {}", s)))
    }
}
