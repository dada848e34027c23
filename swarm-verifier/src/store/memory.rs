//! In-process adapter
//!
//! Mirrors the Postgres adapter's contract closely enough to drive the pipeline
//! and the worker pool in tests:
//! - a claimed row is invisible to other transactions until release
//! - writes are buffered and applied only on commit
//! - dropping a transaction discards its writes and releases its claim
//! - a second verdict for the same prediction is rejected like a unique key

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use swarm_common::models::{ParsedPrediction, Tweet};

use super::{
    ClaimedPrediction, DetailsUpdate, DuplicateRelation, FeedbackRecord, PredictionDetails,
    VerdictRecord, VerificationStore, VerificationTx,
};
use crate::error::VerifierResult;

/// Committed rows
#[derive(Debug, Default)]
pub struct MemoryState {
    pub tweets: Vec<Tweet>,
    pub predictions: Vec<ParsedPrediction>,
    /// Conversations with a scraping job in flight
    pub scraping_jobs: HashSet<i64>,
    pub feedback: Vec<FeedbackRecord>,
    pub details: HashMap<String, PredictionDetails>,
    pub duplicates: HashMap<String, DuplicateRelation>,
    pub verdicts: HashMap<String, VerdictRecord>,
    claimed: HashSet<String>,
    commits: usize,
}

impl MemoryState {
    fn is_terminal(&self, id: &str) -> bool {
        self.verdicts.contains_key(id)
            || self.duplicates.contains_key(id)
            || self.feedback.iter().any(|f| f.parsed_prediction_id == id)
    }

    fn source_tweet(&self, prediction_id: &str) -> Option<&Tweet> {
        self.tweets
            .iter()
            .find(|t| t.prediction_id.as_deref() == Some(prediction_id))
    }
}

/// Shared in-process store; clones see the same state
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        lock_state(&self.state)
    }

    pub fn insert_tweet(&self, tweet: Tweet) {
        self.lock().tweets.push(tweet);
    }

    pub fn insert_prediction(&self, prediction: ParsedPrediction) {
        self.lock().predictions.push(prediction);
    }

    pub fn start_scraping_job(&self, conversation_id: i64) {
        self.lock().scraping_jobs.insert(conversation_id);
    }

    pub fn finish_scraping_job(&self, conversation_id: i64) {
        self.lock().scraping_jobs.remove(&conversation_id);
    }

    pub fn feedback_for(&self, id: &str) -> Vec<FeedbackRecord> {
        self.lock()
            .feedback
            .iter()
            .filter(|f| f.parsed_prediction_id == id)
            .cloned()
            .collect()
    }

    pub fn details_for(&self, id: &str) -> Option<PredictionDetails> {
        self.lock().details.get(id).cloned()
    }

    pub fn duplicate_for(&self, id: &str) -> Option<DuplicateRelation> {
        self.lock().duplicates.get(id).cloned()
    }

    pub fn verdict_for(&self, id: &str) -> Option<VerdictRecord> {
        self.lock().verdicts.get(id).cloned()
    }

    /// Number of committed transactions
    pub fn commit_count(&self) -> usize {
        self.lock().commits
    }

    /// Ids currently claimed by open transactions
    pub fn claimed_ids(&self) -> Vec<String> {
        self.lock().claimed.iter().cloned().collect()
    }
}

fn lock_state(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl VerificationStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> VerifierResult<MemoryTx> {
        Ok(MemoryTx {
            state: Arc::clone(&self.state),
            claimed: Vec::new(),
            pending: Vec::new(),
        })
    }
}

#[derive(Debug)]
enum PendingWrite {
    Feedback(FeedbackRecord),
    Details(String, DetailsUpdate),
    Duplicate(DuplicateRelation),
    Verdict(VerdictRecord),
}

/// Buffered transaction over [`MemoryStore`]
#[derive(Debug)]
pub struct MemoryTx {
    state: Arc<Mutex<MemoryState>>,
    claimed: Vec<String>,
    pending: Vec<PendingWrite>,
}

impl MemoryTx {
    fn release(&mut self) {
        if self.claimed.is_empty() {
            return;
        }
        let mut state = lock_state(&self.state);
        for id in self.claimed.drain(..) {
            state.claimed.remove(&id);
        }
    }

    fn has_pending_duplicate(&self, id: &str) -> bool {
        self.pending
            .iter()
            .any(|w| matches!(w, PendingWrite::Duplicate(r) if r.prediction_id == id))
    }

    fn has_pending_verdict(&self, id: &str) -> bool {
        self.pending
            .iter()
            .any(|w| matches!(w, PendingWrite::Verdict(v) if v.parsed_prediction_id == id))
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl VerificationTx for MemoryTx {
    async fn claim_next(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> VerifierResult<Option<ClaimedPrediction>> {
        let mut state = lock_state(&self.state);

        let mut eligible: Vec<(ParsedPrediction, &Tweet)> = state
            .predictions
            .iter()
            .filter(|p| p.created_at < cutoff)
            .filter(|p| !state.claimed.contains(&p.id))
            .filter(|p| !state.is_terminal(&p.id))
            .filter_map(|p| state.source_tweet(&p.prediction_id).map(|t| (p.clone(), t)))
            .filter(|(_, t)| match t.conversation_id {
                Some(conversation_id) => !state.scraping_jobs.contains(&conversation_id),
                None => true,
            })
            .collect();
        eligible.sort_by_key(|(p, _)| p.created_at);

        let claimed = eligible.into_iter().next().map(|(prediction, tweet)| {
            ClaimedPrediction {
                source_tweet_id: tweet.id,
                conversation_id: tweet.conversation_id,
                prediction,
            }
        });

        if let Some(claimed) = &claimed {
            state.claimed.insert(claimed.prediction.id.clone());
            self.claimed.push(claimed.prediction.id.clone());
        }
        Ok(claimed)
    }

    async fn fetch_tweet(&mut self, tweet_id: i64) -> VerifierResult<Option<Tweet>> {
        let state = lock_state(&self.state);
        Ok(state.tweets.iter().find(|t| t.id == tweet_id).cloned())
    }

    async fn fetch_conversation(&mut self, conversation_id: i64) -> VerifierResult<Vec<Tweet>> {
        let state = lock_state(&self.state);
        Ok(state
            .tweets
            .iter()
            .filter(|t| t.conversation_id == Some(conversation_id))
            .cloned()
            .collect())
    }

    async fn predictions_for_tweets(
        &mut self,
        tweet_ids: &[i64],
    ) -> VerifierResult<Vec<ParsedPrediction>> {
        let state = lock_state(&self.state);
        let prediction_ids: HashSet<&str> = state
            .tweets
            .iter()
            .filter(|t| tweet_ids.contains(&t.id))
            .filter_map(|t| t.prediction_id.as_deref())
            .collect();
        Ok(state
            .predictions
            .iter()
            .filter(|p| prediction_ids.contains(p.prediction_id.as_str()))
            .cloned()
            .collect())
    }

    async fn insert_feedback(&mut self, feedback: &FeedbackRecord) -> VerifierResult<()> {
        self.pending.push(PendingWrite::Feedback(feedback.clone()));
        Ok(())
    }

    async fn upsert_details(
        &mut self,
        parsed_prediction_id: &str,
        update: &DetailsUpdate,
    ) -> VerifierResult<()> {
        self.pending.push(PendingWrite::Details(
            parsed_prediction_id.to_string(),
            update.clone(),
        ));
        Ok(())
    }

    async fn insert_duplicate_relation(
        &mut self,
        relation: &DuplicateRelation,
    ) -> VerifierResult<bool> {
        let exists = lock_state(&self.state)
            .duplicates
            .contains_key(&relation.prediction_id)
            || self.has_pending_duplicate(&relation.prediction_id);
        if exists {
            return Ok(false);
        }
        self.pending.push(PendingWrite::Duplicate(relation.clone()));
        Ok(true)
    }

    async fn insert_verdict(&mut self, verdict: &VerdictRecord) -> VerifierResult<()> {
        let exists = lock_state(&self.state)
            .verdicts
            .contains_key(&verdict.parsed_prediction_id)
            || self.has_pending_verdict(&verdict.parsed_prediction_id);
        if exists {
            return Err(swarm_common::Error::Conflict(format!(
                "Verdict for {} already exists",
                verdict.parsed_prediction_id
            ))
            .into());
        }
        self.pending.push(PendingWrite::Verdict(verdict.clone()));
        Ok(())
    }

    async fn commit(mut self) -> VerifierResult<()> {
        {
            let mut state = lock_state(&self.state);
            for write in self.pending.drain(..) {
                match write {
                    PendingWrite::Feedback(feedback) => state.feedback.push(feedback),
                    PendingWrite::Details(id, update) => {
                        state.details.entry(id).or_default().apply(&update)
                    }
                    PendingWrite::Duplicate(relation) => {
                        state
                            .duplicates
                            .entry(relation.prediction_id.clone())
                            .or_insert(relation);
                    }
                    PendingWrite::Verdict(verdict) => {
                        state
                            .verdicts
                            .insert(verdict.parsed_prediction_id.clone(), verdict);
                    }
                }
            }
            state.commits += 1;
        }
        self.release();
        Ok(())
    }
}
