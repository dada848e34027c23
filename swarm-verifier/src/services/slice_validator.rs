//! Slice Validator
//!
//! Structural sanity check on the character ranges a prediction cites. Runs
//! before any reasoning call so that a malformed extraction is rejected
//! without spending a request on it.
//!
//! Checks run in a fixed order and the first violation wins:
//! 1. `EMPTY_SLICES` - the slice set is empty
//! 2. `MISSING_TWEET` - a slice cites a tweet outside the fetched thread
//! 3. `NEGATIVE_INDICES` - `start < 0` or `end < 0`
//! 4. `INVALID_RANGE` - `start >= end`
//! 5. `SLICE_TOO_SHORT` - fewer than two characters
//! 6. `OUT_OF_BOUNDS` - `end` past the tweet text length (UTF-16 units)
//!
//! Checks 2-6 are applied slice by slice, so an early slice's violation is
//! reported even if a later slice has a "worse" one.

use std::fmt;

use swarm_common::models::{FailureCause, ParsedPrediction, PostSlice};
use swarm_common::text::utf16_len;

use super::conversation::ThreadContext;

/// Minimum slice length in characters
pub const MIN_SLICE_LENGTH: i64 = 2;

/// Which of a prediction's two slice sets is being checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceKind {
    Target,
    Timeframe,
}

impl fmt::Display for SliceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SliceKind::Target => f.write_str("Target"),
            SliceKind::Timeframe => f.write_str("Timeframe"),
        }
    }
}

/// First structural problem found in a slice set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceViolation {
    pub kind: SliceKind,
    pub cause: FailureCause,
    /// Human-readable reason stored with the feedback row
    pub message: String,
}

/// Validate one slice set against the thread it was extracted from
pub fn validate_slices(
    slices: &[PostSlice],
    thread: &ThreadContext,
    kind: SliceKind,
) -> Result<(), SliceViolation> {
    let violation = |cause: FailureCause, message: String| SliceViolation {
        kind,
        cause,
        message,
    };

    if slices.is_empty() {
        return Err(violation(
            FailureCause::EmptySlices,
            format!("{} slices are empty", kind),
        ));
    }

    for slice in slices {
        let tweet_id = slice.tweet_id();
        let Some(tweet) = thread.get(tweet_id) else {
            return Err(violation(
                FailureCause::MissingTweet,
                format!("{} slice references missing tweet {}", kind, tweet_id),
            ));
        };

        if slice.start < 0 || slice.end < 0 {
            return Err(violation(
                FailureCause::NegativeIndices,
                format!(
                    "{} slice has negative indices (start: {}, end: {})",
                    kind, slice.start, slice.end
                ),
            ));
        }

        if slice.start >= slice.end {
            return Err(violation(
                FailureCause::InvalidRange,
                format!(
                    "{} slice has invalid range (start: {}, end: {})",
                    kind, slice.start, slice.end
                ),
            ));
        }

        let length = slice.end - slice.start;
        if length < MIN_SLICE_LENGTH {
            return Err(violation(
                FailureCause::SliceTooShort,
                format!(
                    "{} slice too short ({} characters, minimum {})",
                    kind, length, MIN_SLICE_LENGTH
                ),
            ));
        }

        let text_length = utf16_len(&tweet.text) as i64;
        if slice.end > text_length {
            return Err(violation(
                FailureCause::OutOfBounds,
                format!(
                    "{} slice end index {} exceeds tweet text length {}",
                    kind, slice.end, text_length
                ),
            ));
        }
    }

    Ok(())
}

/// Validate target slices, then timeframe slices
pub fn validate_prediction_slices(
    prediction: &ParsedPrediction,
    thread: &ThreadContext,
) -> Result<(), SliceViolation> {
    validate_slices(&prediction.target, thread, SliceKind::Target)?;
    validate_slices(&prediction.timeframe, thread, SliceKind::Timeframe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use swarm_common::models::Tweet;

    fn thread() -> ThreadContext {
        ThreadContext::new(vec![Tweet {
            id: 10,
            text: "BTC will hit $100k by end of 2025".to_string(),
            author_id: 1,
            author_username: Some("oracle".into()),
            date: Utc::now(),
            conversation_id: None,
            parent_tweet_id: None,
            quoted_id: None,
            prediction_id: None,
        }])
    }

    fn cause_of(slices: &[PostSlice]) -> Option<FailureCause> {
        validate_slices(slices, &thread(), SliceKind::Target)
            .err()
            .map(|v| v.cause)
    }

    #[test]
    fn test_valid_slices_pass() {
        assert_eq!(cause_of(&[PostSlice::new("10", 0, 18)]), None);
        // end == text length is still in bounds
        assert_eq!(cause_of(&[PostSlice::new("10", 29, 33)]), None);
    }

    #[test]
    fn test_empty_slices() {
        assert_eq!(cause_of(&[]), Some(FailureCause::EmptySlices));
    }

    #[test]
    fn test_missing_tweet() {
        assert_eq!(
            cause_of(&[PostSlice::new("11", 0, 5)]),
            Some(FailureCause::MissingTweet)
        );
    }

    #[test]
    fn test_negative_indices() {
        assert_eq!(
            cause_of(&[PostSlice::new("10", -1, 5)]),
            Some(FailureCause::NegativeIndices)
        );
    }

    #[test]
    fn test_equal_bounds_is_invalid_range() {
        assert_eq!(
            cause_of(&[PostSlice::new("10", 5, 5)]),
            Some(FailureCause::InvalidRange)
        );
    }

    #[test]
    fn test_single_character_is_too_short() {
        assert_eq!(
            cause_of(&[PostSlice::new("10", 5, 6)]),
            Some(FailureCause::SliceTooShort)
        );
    }

    #[test]
    fn test_end_past_text_is_out_of_bounds() {
        let violation =
            validate_slices(&[PostSlice::new("10", 20, 34)], &thread(), SliceKind::Timeframe)
                .unwrap_err();
        assert_eq!(violation.cause, FailureCause::OutOfBounds);
        assert_eq!(
            violation.message,
            "Timeframe slice end index 34 exceeds tweet text length 33"
        );
    }

    #[test]
    fn test_first_violation_wins() {
        // Missing tweet on the first slice is reported over the later negative one
        let slices = [PostSlice::new("99", 0, 5), PostSlice::new("10", -3, 2)];
        assert_eq!(cause_of(&slices), Some(FailureCause::MissingTweet));

        // Negative check precedes range check on the same slice
        assert_eq!(
            cause_of(&[PostSlice::new("10", 4, -1)]),
            Some(FailureCause::NegativeIndices)
        );
    }

    #[test]
    fn test_prediction_checks_target_before_timeframe() {
        let prediction = ParsedPrediction {
            id: "p1".into(),
            prediction_id: "pub1".into(),
            target: vec![PostSlice::new("10", 3, 3)],
            timeframe: vec![],
            created_at: Utc::now(),
            llm_confidence: None,
            vagueness: None,
            topic_id: None,
        };
        let violation = validate_prediction_slices(&prediction, &thread()).unwrap_err();
        assert_eq!(violation.kind, SliceKind::Target);
        assert_eq!(violation.cause, FailureCause::InvalidRange);
    }
}
