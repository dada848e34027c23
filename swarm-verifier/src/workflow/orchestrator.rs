//! Pipeline Orchestrator
//!
//! One pass claims one prediction and drives it to exactly one terminal
//! record inside the caller's transaction:
//!
//! 1. Claim the oldest eligible prediction (none → [`PassOutcome::Idle`])
//! 2. Rebuild the reply chain ending at its source tweet
//! 3. Slice validation → feedback `slice_validation`
//! 4. Duplicate detection → duplicate relation to the cluster's canonical member
//! 5. Timeframe extraction → feedback `timeframe_extraction` for missing/event_trigger
//! 6. Maturity gate → feedback `timeframe_extraction` / `FUTURE_TIMEFRAME`
//! 7. Filter validation → feedback `filter_validation`
//! 8. Verdict generation → feedback `verdict_validation`, or the verdict itself
//!
//! The first rejection ends the pass. Stage details are upserted as each
//! reasoning stage completes, so a rejected prediction still keeps the
//! structured output that led to the rejection. Any error aborts the pass and
//! the caller's transaction rolls everything back.

use chrono::{DateTime, Duration, Utc};
use swarm_common::models::{FailureCause, ParsedPrediction, Tweet, ValidationStep};
use swarm_common::text::truncate;
use swarm_common::Error;
use tracing::{debug, info};

use crate::error::VerifierResult;
use crate::services::conversation::{build_reply_chain, ThreadContext};
use crate::services::duplicate_detector::{DedupCandidate, DedupThresholds, DuplicateDetector};
use crate::services::slice_validator::validate_prediction_slices;
use crate::stages::filter::FilterInput;
use crate::stages::maturity::{check_maturity, Maturity, DEFAULT_MATURITY_BUFFER_HOURS};
use crate::stages::timeframe::TimeframeInput;
use crate::stages::verdict::VerdictInput;
use crate::stages::{ReasoningStages, TimeframeBounds};
use crate::store::{
    ClaimedPrediction, DetailsUpdate, FeedbackRecord, VerdictRecord, VerificationStore,
    VerificationTx,
};

/// Default minimum age of a prediction before it can be claimed
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 300;

/// Terminal result of one pass
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    /// Nothing eligible to claim
    Idle,
    Rejected {
        prediction_id: String,
        step: ValidationStep,
        cause: Option<FailureCause>,
    },
    Duplicate {
        prediction_id: String,
        canonical_id: String,
        similarity_score: f64,
    },
    Verdict {
        prediction_id: String,
        verdict: bool,
    },
}

impl PassOutcome {
    pub fn is_idle(&self) -> bool {
        matches!(self, PassOutcome::Idle)
    }
}

/// Timing and threshold knobs for a pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub grace_period: Duration,
    pub maturity_buffer: Duration,
    pub thresholds: DedupThresholds,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            grace_period: Duration::seconds(DEFAULT_GRACE_PERIOD_SECS as i64),
            maturity_buffer: Duration::hours(DEFAULT_MATURITY_BUFFER_HOURS),
            thresholds: DedupThresholds::default(),
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    stages: ReasoningStages,
    detector: DuplicateDetector,
    settings: PipelineSettings,
}

impl Orchestrator {
    pub fn new(stages: ReasoningStages, settings: PipelineSettings) -> Self {
        Self {
            stages,
            detector: DuplicateDetector::new(settings.thresholds),
            settings,
        }
    }

    /// Run one pass in its own transaction, committing on success
    pub async fn run_pass<S: VerificationStore>(
        &self,
        store: &S,
        now: DateTime<Utc>,
    ) -> VerifierResult<PassOutcome> {
        let mut tx = store.begin().await?;
        let outcome = self.process_next(&mut tx, now).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Claim the next prediction and take it to a terminal record
    pub async fn process_next<T: VerificationTx>(
        &self,
        tx: &mut T,
        now: DateTime<Utc>,
    ) -> VerifierResult<PassOutcome> {
        let cutoff = now - self.settings.grace_period;
        let Some(claimed) = tx.claim_next(cutoff).await? else {
            return Ok(PassOutcome::Idle);
        };

        let ClaimedPrediction {
            prediction,
            source_tweet_id,
            conversation_id,
        } = claimed;

        info!(
            id = %prediction.id,
            prediction_id = %prediction.prediction_id,
            source_tweet_id,
            "Found prediction to verify"
        );

        let tweets = load_thread(tx, source_tweet_id, conversation_id).await?;
        if tweets.is_empty() {
            return Err(
                Error::NotFound(format!("Source tweet {} not found", source_tweet_id)).into(),
            );
        }
        let thread = ThreadContext::new(tweets);

        debug!(
            count = thread.len(),
            tweet_ids = ?thread.tweet_ids(),
            "Fetched tweets for prediction"
        );

        if let Err(violation) = validate_prediction_slices(&prediction, &thread) {
            info!(
                kind = %violation.kind,
                failure_cause = %violation.cause,
                "Slice validation failed"
            );
            return reject(
                tx,
                &prediction.id,
                ValidationStep::SliceValidation,
                Some(violation.cause),
                violation.message,
            )
            .await;
        }

        if let Some(outcome) = self.absorb_duplicate(tx, &prediction, &thread).await? {
            return Ok(outcome);
        }

        let target_text = thread.slice_text(&prediction.target);
        let timeframe_text = thread.slice_text(&prediction.timeframe);
        debug!(
            target = %truncate(&target_text, 100),
            timeframe = %truncate(&timeframe_text, 100),
            "Extracted slice text"
        );

        let source_tweet = thread.get_by_id(source_tweet_id).ok_or_else(|| {
            Error::NotFound(format!("Source tweet {} missing from thread", source_tweet_id))
        })?;

        // Timeframe extraction
        let extraction = self
            .stages
            .timeframe
            .extract(&TimeframeInput {
                target_text: &target_text,
                timeframe_text: &timeframe_text,
                tweet_timestamp: source_tweet.date,
                now,
                thread: thread.tweets(),
            })
            .await?;

        info!(
            status = %extraction.timeframe_status,
            start_utc = ?extraction.start_utc,
            end_utc = ?extraction.end_utc,
            confidence = extraction.confidence,
            "Timeframe extracted"
        );
        tx.upsert_details(&prediction.id, &DetailsUpdate::Timeframe(extraction.to_details()))
            .await?;

        if let Some(cause) = extraction.timeframe_status.rejection_cause() {
            return reject(
                tx,
                &prediction.id,
                ValidationStep::TimeframeExtraction,
                Some(cause),
                extraction.reasoning.clone(),
            )
            .await;
        }

        // Maturity gate
        let maturity = check_maturity(extraction.end_utc, now, self.settings.maturity_buffer);
        if let Some(reason) = maturity.reason() {
            if let Maturity::NotYet { eligible_after, .. } = &maturity {
                info!(eligible_after = %eligible_after, "Timeframe has not matured yet");
            }
            return reject(
                tx,
                &prediction.id,
                ValidationStep::TimeframeExtraction,
                Some(FailureCause::FutureTimeframe),
                reason,
            )
            .await;
        }

        let bounds = TimeframeBounds::from(&extraction);

        // Filter validation
        let validation = self
            .stages
            .filter
            .validate(&FilterInput {
                thread: &thread,
                target: &prediction.target,
                timeframe: &prediction.timeframe,
                bounds: &bounds,
                now,
            })
            .await?;

        info!(
            is_valid = validation.is_valid,
            context = %truncate(&validation.context, 100),
            confidence = validation.confidence,
            "Filter validation completed"
        );
        tx.upsert_details(&prediction.id, &DetailsUpdate::Filter(validation.to_details()))
            .await?;

        if !validation.is_valid {
            return reject(
                tx,
                &prediction.id,
                ValidationStep::FilterValidation,
                validation.failure_cause,
                validation.reasoning.clone(),
            )
            .await;
        }

        // Verdict generation
        let result = self
            .stages
            .verdict
            .generate(&VerdictInput {
                context: &validation.context,
                target_text: &target_text,
                timeframe_text: &timeframe_text,
                bounds: &bounds,
            })
            .await?;

        info!(
            valid = result.valid,
            verdict = result.verdict,
            confidence = result.confidence,
            sources = result.sources.len(),
            reasoning = %truncate(&result.reasoning, 150),
            "Verdict generated"
        );
        tx.upsert_details(&prediction.id, &DetailsUpdate::Verdict(result.to_details()))
            .await?;

        if !result.valid {
            return reject(
                tx,
                &prediction.id,
                ValidationStep::VerdictValidation,
                None,
                result.reasoning.clone(),
            )
            .await;
        }

        tx.insert_verdict(&VerdictRecord::new(&prediction.id, result.verdict, &result.reasoning))
            .await?;

        info!(
            id = %prediction.id,
            prediction_id = %prediction.prediction_id,
            verdict = result.verdict,
            "Verdict stored"
        );

        Ok(PassOutcome::Verdict {
            prediction_id: prediction.id,
            verdict: result.verdict,
        })
    }

    /// Record a duplicate relation if the prediction is not its cluster's
    /// canonical member
    async fn absorb_duplicate<T: VerificationTx>(
        &self,
        tx: &mut T,
        prediction: &ParsedPrediction,
        thread: &ThreadContext,
    ) -> VerifierResult<Option<PassOutcome>> {
        let in_tree = tx.predictions_for_tweets(&thread.tweet_ids()).await?;
        let candidates: Vec<DedupCandidate> = in_tree.iter().map(DedupCandidate::from).collect();

        let Some(relation) = self.detector.find_canonical(&prediction.id, &candidates) else {
            return Ok(None);
        };

        info!(
            id = %prediction.id,
            canonical_id = %relation.canonical_id,
            similarity_score = %format!("{:.4}", relation.similarity_score),
            "Prediction is a duplicate, skipping verification"
        );
        if let Some(canonical) = candidates.iter().find(|c| c.id == relation.canonical_id) {
            debug!(
                current_target = %thread.slice_text(&prediction.target),
                canonical_target = %thread.slice_text(&canonical.target),
                current_timeframe = %thread.slice_text(&prediction.timeframe),
                canonical_timeframe = %thread.slice_text(&canonical.timeframe),
                "Duplicate comparison"
            );
        }

        tx.insert_duplicate_relation(&relation).await?;

        Ok(Some(PassOutcome::Duplicate {
            prediction_id: relation.prediction_id,
            canonical_id: relation.canonical_id,
            similarity_score: relation.similarity_score,
        }))
    }
}

/// Fetch the source tweet's thread: the reply chain when the tweet belongs to a
/// conversation, else the tweet alone. Ordered by tweet date.
async fn load_thread<T: VerificationTx>(
    tx: &mut T,
    source_tweet_id: i64,
    conversation_id: Option<i64>,
) -> VerifierResult<Vec<Tweet>> {
    let mut tweets = match conversation_id {
        Some(conversation_id) => {
            let conversation = tx.fetch_conversation(conversation_id).await?;
            build_reply_chain(source_tweet_id, conversation)
        }
        None => tx.fetch_tweet(source_tweet_id).await?.into_iter().collect(),
    };
    tweets.sort_by_key(|t| t.date);
    Ok(tweets)
}

async fn reject<T: VerificationTx>(
    tx: &mut T,
    prediction_id: &str,
    step: ValidationStep,
    cause: Option<FailureCause>,
    reason: String,
) -> VerifierResult<PassOutcome> {
    info!(
        id = %prediction_id,
        validation_step = %step,
        failure_cause = cause.map(|c| c.as_str()).unwrap_or("none"),
        reason = %truncate(&reason, 100),
        "Stored prediction feedback"
    );

    tx.insert_feedback(&FeedbackRecord {
        parsed_prediction_id: prediction_id.to_string(),
        validation_step: step,
        failure_cause: cause,
        reason,
    })
    .await?;

    Ok(PassOutcome::Rejected {
        prediction_id: prediction_id.to_string(),
        step,
        cause,
    })
}
