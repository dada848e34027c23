//! Postgres adapter
//!
//! Ids are UUID columns but travel through the pipeline as strings: selects
//! cast with `::text` and binds cast back with `::uuid`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};
use swarm_common::models::{ParsedPrediction, PostSlice, Tweet};
use tracing::debug;
use uuid::Uuid;

use super::{
    ClaimedPrediction, DetailsUpdate, DuplicateRelation, FeedbackRecord, VerdictRecord,
    VerificationStore, VerificationTx,
};
use crate::error::VerifierResult;

const CLAIM_NEXT_SQL: &str = r#"
    SELECT p.id::text AS id,
           p.prediction_id::text AS prediction_id,
           p.target,
           p.timeframe,
           p.created_at,
           p.llm_confidence,
           p.vagueness,
           p.topic_id::text AS topic_id,
           t.id AS source_tweet_id,
           t.conversation_id
    FROM parsed_prediction p
    INNER JOIN scraped_tweet t ON t.prediction_id = p.prediction_id
    WHERE p.created_at < $1
      AND NOT EXISTS (SELECT 1 FROM verdict v WHERE v.parsed_prediction_id = p.id)
      AND NOT EXISTS (
          SELECT 1 FROM parsed_prediction_feedback f WHERE f.parsed_prediction_id = p.id
      )
      AND NOT EXISTS (
          SELECT 1 FROM prediction_duplicate_relation d WHERE d.prediction_id = p.id
      )
      AND NOT EXISTS (
          SELECT 1 FROM twitter_scraping_job j WHERE j.conversation_id = t.conversation_id
      )
    ORDER BY p.created_at ASC
    LIMIT 1
    FOR UPDATE OF p SKIP LOCKED
"#;

const TWEET_COLUMNS: &str = r#"
    SELECT t.id, t.text, t.author_id, u.username AS author_username, t.date,
           t.conversation_id, t.parent_tweet_id, t.quoted_id,
           t.prediction_id::text AS prediction_id
    FROM scraped_tweet t
    LEFT JOIN twitter_user u ON u.id = t.author_id
"#;

/// Postgres-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VerificationStore for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> VerifierResult<PgTx> {
        let tx = self.pool.begin().await?;
        Ok(PgTx { tx })
    }
}

/// One pass's transaction; rolls back on drop unless committed
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

pub(crate) fn tweet_from_row(row: &PgRow) -> Result<Tweet, sqlx::Error> {
    Ok(Tweet {
        id: row.try_get("id")?,
        text: row.try_get("text")?,
        author_id: row.try_get("author_id")?,
        author_username: row.try_get("author_username")?,
        date: row.try_get("date")?,
        conversation_id: row.try_get("conversation_id")?,
        parent_tweet_id: row.try_get("parent_tweet_id")?,
        quoted_id: row.try_get("quoted_id")?,
        prediction_id: row.try_get("prediction_id")?,
    })
}

/// Map a `parsed_prediction` row selected with text-cast ids
pub(crate) fn prediction_from_row(row: &PgRow) -> Result<ParsedPrediction, sqlx::Error> {
    let target: Json<Vec<PostSlice>> = row.try_get("target")?;
    let timeframe: Json<Vec<PostSlice>> = row.try_get("timeframe")?;
    Ok(ParsedPrediction {
        id: row.try_get("id")?,
        prediction_id: row.try_get("prediction_id")?,
        target: target.0,
        timeframe: timeframe.0,
        created_at: row.try_get("created_at")?,
        llm_confidence: row.try_get("llm_confidence")?,
        vagueness: row.try_get("vagueness")?,
        topic_id: row.try_get("topic_id")?,
    })
}

#[async_trait]
impl VerificationTx for PgTx {
    async fn claim_next(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> VerifierResult<Option<ClaimedPrediction>> {
        let row = sqlx::query(CLAIM_NEXT_SQL)
            .bind(cutoff)
            .fetch_optional(&mut *self.tx)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let claimed = ClaimedPrediction {
            prediction: prediction_from_row(&row)?,
            source_tweet_id: row.try_get("source_tweet_id")?,
            conversation_id: row.try_get("conversation_id")?,
        };
        debug!(prediction_id = %claimed.prediction.id, "Claimed prediction row");
        Ok(Some(claimed))
    }

    async fn fetch_tweet(&mut self, tweet_id: i64) -> VerifierResult<Option<Tweet>> {
        let sql = format!("{} WHERE t.id = $1", TWEET_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(tweet_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.as_ref().map(tweet_from_row).transpose()?)
    }

    async fn fetch_conversation(&mut self, conversation_id: i64) -> VerifierResult<Vec<Tweet>> {
        let sql = format!("{} WHERE t.conversation_id = $1", TWEET_COLUMNS);
        let rows = sqlx::query(&sql)
            .bind(conversation_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.iter().map(tweet_from_row).collect::<Result<_, _>>()?)
    }

    async fn predictions_for_tweets(
        &mut self,
        tweet_ids: &[i64],
    ) -> VerifierResult<Vec<ParsedPrediction>> {
        if tweet_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT p.id::text AS id,
                   p.prediction_id::text AS prediction_id,
                   p.target,
                   p.timeframe,
                   p.created_at,
                   p.llm_confidence,
                   p.vagueness,
                   p.topic_id::text AS topic_id
            FROM parsed_prediction p
            INNER JOIN scraped_tweet t ON t.prediction_id = p.prediction_id
            WHERE t.id = ANY($1)
            "#,
        )
        .bind(tweet_ids)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows
            .iter()
            .map(prediction_from_row)
            .collect::<Result<_, _>>()?)
    }

    async fn insert_feedback(&mut self, feedback: &FeedbackRecord) -> VerifierResult<()> {
        sqlx::query(
            r#"
            INSERT INTO parsed_prediction_feedback
                (id, parsed_prediction_id, validation_step, failure_cause, reason)
            VALUES ($1, $2::uuid, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&feedback.parsed_prediction_id)
        .bind(feedback.validation_step.as_str())
        .bind(feedback.failure_cause.map(|c| c.as_str()))
        .bind(&feedback.reason)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn upsert_details(
        &mut self,
        parsed_prediction_id: &str,
        update: &DetailsUpdate,
    ) -> VerifierResult<()> {
        let query = match update {
            DetailsUpdate::Timeframe(details) => sqlx::query(
                r#"
                INSERT INTO parsed_prediction_details
                    (parsed_prediction_id, timeframe_status, timeframe_start_utc,
                     timeframe_end_utc, timeframe_precision, timeframe_reasoning,
                     timeframe_assumptions, timeframe_confidence)
                VALUES ($1::uuid, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (parsed_prediction_id) DO UPDATE SET
                    timeframe_status = EXCLUDED.timeframe_status,
                    timeframe_start_utc = EXCLUDED.timeframe_start_utc,
                    timeframe_end_utc = EXCLUDED.timeframe_end_utc,
                    timeframe_precision = EXCLUDED.timeframe_precision,
                    timeframe_reasoning = EXCLUDED.timeframe_reasoning,
                    timeframe_assumptions = EXCLUDED.timeframe_assumptions,
                    timeframe_confidence = EXCLUDED.timeframe_confidence,
                    updated_at = NOW()
                "#,
            )
            .bind(parsed_prediction_id)
            .bind(details.status.clone())
            .bind(details.start_utc)
            .bind(details.end_utc)
            .bind(details.precision.clone())
            .bind(details.reasoning.clone())
            .bind(Json(details.assumptions.clone()))
            .bind(details.confidence),

            DetailsUpdate::Filter(details) => sqlx::query(
                r#"
                INSERT INTO parsed_prediction_details
                    (parsed_prediction_id, prediction_context,
                     filter_validation_confidence, filter_validation_reasoning)
                VALUES ($1::uuid, $2, $3, $4)
                ON CONFLICT (parsed_prediction_id) DO UPDATE SET
                    prediction_context = EXCLUDED.prediction_context,
                    filter_validation_confidence = EXCLUDED.filter_validation_confidence,
                    filter_validation_reasoning = EXCLUDED.filter_validation_reasoning,
                    updated_at = NOW()
                "#,
            )
            .bind(parsed_prediction_id)
            .bind(details.context.clone())
            .bind(details.confidence)
            .bind(details.reasoning.clone()),

            DetailsUpdate::Verdict(details) => sqlx::query(
                r#"
                INSERT INTO parsed_prediction_details
                    (parsed_prediction_id, verdict_confidence, verdict_sources)
                VALUES ($1::uuid, $2, $3)
                ON CONFLICT (parsed_prediction_id) DO UPDATE SET
                    verdict_confidence = EXCLUDED.verdict_confidence,
                    verdict_sources = EXCLUDED.verdict_sources,
                    updated_at = NOW()
                "#,
            )
            .bind(parsed_prediction_id)
            .bind(details.confidence)
            .bind(details.sources.clone().map(Json)),
        };

        query.execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn insert_duplicate_relation(
        &mut self,
        relation: &DuplicateRelation,
    ) -> VerifierResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO prediction_duplicate_relation
                (prediction_id, canonical_id, similarity_score)
            VALUES ($1::uuid, $2::uuid, $3)
            ON CONFLICT (prediction_id) DO NOTHING
            "#,
        )
        .bind(&relation.prediction_id)
        .bind(&relation.canonical_id)
        .bind(relation.similarity_score)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_verdict(&mut self, verdict: &VerdictRecord) -> VerifierResult<()> {
        sqlx::query(
            r#"
            INSERT INTO verdict (id, parsed_prediction_id, verdict, context)
            VALUES ($1, $2::uuid, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&verdict.parsed_prediction_id)
        .bind(verdict.verdict)
        .bind(Json(&verdict.context))
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self) -> VerifierResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
