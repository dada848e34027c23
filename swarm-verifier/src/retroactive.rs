//! Retroactive deduplication
//!
//! Batch pass over whole conversations, for predictions that reached the
//! database before live deduplication existed or that were judged before a
//! later duplicate arrived. Uses the same overlap metric, clustering and
//! canonical rule as the live pipeline.
//!
//! A conversation is (re)processed when it has a prediction newer than its
//! `dedup_processed_conversation` marker, or, with no marker, newer than the
//! most recent marker anywhere (all conversations on the first run). Each
//! conversation commits its relations and its marker in one transaction.
//!
//! Live workers may hold a prediction of the same conversation. Before marking
//! a prediction the pass takes its row lock with `SKIP LOCKED`; a locked row is
//! left alone and counted as in flight. The insert itself re-checks for a
//! verdict or feedback, since those may have committed after the clustering read.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::{debug, error, info, warn};

use crate::error::VerifierResult;
use crate::services::duplicate_detector::{DedupCandidate, DuplicateDetector};
use crate::store::postgres::prediction_from_row;
use crate::store::DuplicateRelation;

/// Batch counters, printed as the run summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetroactiveStats {
    pub total_conversations: usize,
    pub processed: usize,
    /// Conversations with fewer than two predictions
    pub skipped: usize,
    pub predictions_analyzed: usize,
    pub conversations_with_duplicates: usize,
    pub relations_inserted: usize,
    /// Planned relations left out because a worker held the prediction
    pub in_flight: usize,
    pub errors: usize,
    pub interrupted: bool,
}

impl fmt::Display for RetroactiveStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{}", rule)?;
        writeln!(f, "SUMMARY{}", if self.interrupted { " (interrupted)" } else { "" })?;
        writeln!(f, "{}", rule)?;
        writeln!(f, "Conversations to process: {}", self.total_conversations)?;
        writeln!(f, "Conversations processed: {}", self.processed)?;
        writeln!(f, "Conversations skipped (fewer than two predictions): {}", self.skipped)?;
        writeln!(f, "Total predictions analyzed: {}", self.predictions_analyzed)?;
        writeln!(f, "Conversations with duplicates: {}", self.conversations_with_duplicates)?;
        writeln!(f, "Total duplicate relations inserted: {}", self.relations_inserted)?;
        if self.in_flight > 0 {
            writeln!(f, "Predictions skipped while in flight: {}", self.in_flight)?;
        }
        if self.errors > 0 {
            writeln!(f, "Errors encountered: {}", self.errors)?;
        }
        write!(
            f,
            "\n=== {} ===",
            if self.interrupted { "INTERRUPTED" } else { "COMPLETE" }
        )
    }
}

/// Result for one conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationResult {
    pub predictions: usize,
    pub relations_inserted: usize,
    pub in_flight: usize,
}

/// Relations to write for one conversation
///
/// Predictions that already hold a terminal record still take part in
/// clustering (and may be canonical) but are never marked themselves.
pub fn plan_relations(
    detector: &DuplicateDetector,
    candidates: &[DedupCandidate],
    terminal: &HashSet<String>,
) -> Vec<DuplicateRelation> {
    detector
        .duplicate_relations(candidates)
        .into_iter()
        .filter(|relation| !terminal.contains(&relation.prediction_id))
        .collect()
}

pub struct RetroactiveDeduplicator {
    pool: PgPool,
    detector: DuplicateDetector,
}

impl RetroactiveDeduplicator {
    pub fn new(pool: PgPool, detector: DuplicateDetector) -> Self {
        Self { pool, detector }
    }

    /// Most recent marker update, `None` before the first run
    pub async fn global_cutoff(&self) -> VerifierResult<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT MAX(updated_at) AS cutoff FROM dedup_processed_conversation")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("cutoff")?)
    }

    /// Conversations holding predictions newer than their marker or the cutoff
    pub async fn pending_conversations(
        &self,
        cutoff: Option<DateTime<Utc>>,
    ) -> VerifierResult<Vec<i64>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT t.conversation_id
            FROM scraped_tweet t
            INNER JOIN parsed_prediction p ON p.prediction_id = t.prediction_id
            LEFT JOIN dedup_processed_conversation d ON d.conversation_id = t.conversation_id
            WHERE t.conversation_id IS NOT NULL
              AND (
                  (d.updated_at IS NOT NULL AND p.created_at > d.updated_at)
                  OR (d.updated_at IS NULL AND ($1::timestamptz IS NULL OR p.created_at > $1))
              )
            ORDER BY t.conversation_id
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| row.try_get("conversation_id"))
            .collect::<Result<_, _>>()?)
    }

    /// Cluster one conversation and record its relations and marker
    pub async fn process_conversation(
        &self,
        conversation_id: i64,
    ) -> VerifierResult<ConversationResult> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            r#"
            SELECT p.id::text AS id,
                   p.prediction_id::text AS prediction_id,
                   p.target,
                   p.timeframe,
                   p.created_at,
                   p.llm_confidence,
                   p.vagueness,
                   p.topic_id::text AS topic_id,
                   (EXISTS (SELECT 1 FROM verdict v WHERE v.parsed_prediction_id = p.id)
                    OR EXISTS (
                        SELECT 1 FROM parsed_prediction_feedback f
                        WHERE f.parsed_prediction_id = p.id
                    )) AS terminal
            FROM parsed_prediction p
            INNER JOIN scraped_tweet t ON t.prediction_id = p.prediction_id
            WHERE t.conversation_id = $1
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        let mut terminal = HashSet::new();
        for row in &rows {
            let prediction = prediction_from_row(row)?;
            if row.try_get::<bool, _>("terminal")? {
                terminal.insert(prediction.id.clone());
            }
            candidates.push(DedupCandidate::from(&prediction));
        }

        let relations = plan_relations(&self.detector, &candidates, &terminal);

        let mut inserted = 0;
        let mut in_flight = 0;
        for relation in &relations {
            let locked = sqlx::query(
                "SELECT id FROM parsed_prediction WHERE id = $1::uuid FOR UPDATE SKIP LOCKED",
            )
            .bind(&relation.prediction_id)
            .fetch_optional(&mut *tx)
            .await?;
            if locked.is_none() {
                debug!(
                    conversation_id,
                    prediction_id = %relation.prediction_id,
                    "Prediction held by a worker, not marking"
                );
                in_flight += 1;
                continue;
            }

            let result = sqlx::query(
                r#"
                INSERT INTO prediction_duplicate_relation
                    (prediction_id, canonical_id, similarity_score)
                SELECT $1::uuid, $2::uuid, $3
                WHERE NOT EXISTS (
                        SELECT 1 FROM verdict v WHERE v.parsed_prediction_id = $1::uuid
                    )
                  AND NOT EXISTS (
                        SELECT 1 FROM parsed_prediction_feedback f
                        WHERE f.parsed_prediction_id = $1::uuid
                    )
                ON CONFLICT (prediction_id) DO NOTHING
                "#,
            )
            .bind(&relation.prediction_id)
            .bind(&relation.canonical_id)
            .bind(relation.similarity_score)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }

        sqlx::query(
            r#"
            INSERT INTO dedup_processed_conversation
                (conversation_id, predictions_processed, duplicates_found)
            VALUES ($1, $2, $3)
            ON CONFLICT (conversation_id) DO UPDATE SET
                predictions_processed = EXCLUDED.predictions_processed,
                duplicates_found = EXCLUDED.duplicates_found,
                updated_at = NOW()
            "#,
        )
        .bind(conversation_id)
        .bind(candidates.len() as i32)
        .bind(inserted as i32)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ConversationResult {
            predictions: candidates.len(),
            relations_inserted: inserted,
            in_flight,
        })
    }

    /// Process every pending conversation, stopping early when `stop` fires
    ///
    /// Per-conversation failures are logged and counted; they do not end the run.
    pub async fn run<F>(&self, stop: F) -> VerifierResult<RetroactiveStats>
    where
        F: Fn() -> bool,
    {
        let thresholds = self.detector.thresholds();
        info!(
            target_threshold = thresholds.target,
            timeframe_threshold = thresholds.timeframe,
            "Starting retroactive deduplication"
        );

        let cutoff = self.global_cutoff().await?;
        match cutoff {
            Some(cutoff) => info!(cutoff = %cutoff, "Global cutoff"),
            None => info!("No previous deduplication records found, processing all conversations"),
        }

        let conversations = self.pending_conversations(cutoff).await?;
        let mut stats = RetroactiveStats {
            total_conversations: conversations.len(),
            ..Default::default()
        };
        info!(count = conversations.len(), "Found conversations with new predictions");

        for conversation_id in conversations {
            if stop() {
                warn!("Interrupted, stopping between conversations");
                stats.interrupted = true;
                break;
            }

            stats.processed += 1;
            if stats.processed % 100 == 0 {
                info!(
                    processed = stats.processed,
                    total = stats.total_conversations,
                    percent = %format!(
                        "{:.1}",
                        stats.processed as f64 / stats.total_conversations as f64 * 100.0
                    ),
                    relations_inserted = stats.relations_inserted,
                    "Progress"
                );
            }

            match self.process_conversation(conversation_id).await {
                Ok(result) => {
                    stats.predictions_analyzed += result.predictions;
                    if result.predictions < 2 {
                        stats.skipped += 1;
                    }
                    stats.relations_inserted += result.relations_inserted;
                    stats.in_flight += result.in_flight;
                    if result.relations_inserted > 0 {
                        stats.conversations_with_duplicates += 1;
                    }
                }
                Err(e) => {
                    stats.errors += 1;
                    error!(conversation_id, error = %e, "Error processing conversation");
                }
            }
        }

        Ok(stats)
    }
}
