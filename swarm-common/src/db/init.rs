//! Database initialization
//!
//! Connection pool creation plus an idempotent schema bootstrap for the tables
//! the verifier reads and writes. Production schema ownership sits with the
//! ingestion service's migrations; the bootstrap exists so a fresh database
//! (development, integration tests) can be brought up with `init-db`.

use crate::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

/// Connect a Postgres pool
///
/// Each worker holds one connection for the length of a transaction, so the
/// pool must be at least as large as the worker count; one spare connection is
/// kept for ad-hoc queries.
pub async fn init_pool(database_url: &str, workers: usize) -> Result<PgPool> {
    let max_connections = (workers as u32).saturating_add(1).max(2);

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await?;

    info!(max_connections, "Database pool connected");
    Ok(pool)
}

/// Create every table the verifier touches if it does not exist
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    create_twitter_user_table(pool).await?;
    create_scraped_tweet_table(pool).await?;
    create_parsed_prediction_table(pool).await?;
    create_twitter_scraping_job_table(pool).await?;

    // Verifier-owned outcome tables
    create_parsed_prediction_feedback_table(pool).await?;
    create_parsed_prediction_details_table(pool).await?;
    create_prediction_duplicate_relation_table(pool).await?;
    create_verdict_table(pool).await?;
    create_dedup_processed_conversation_table(pool).await?;

    info!("Database schema ensured");
    Ok(())
}

async fn create_twitter_user_table(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS twitter_user (
            id BIGINT PRIMARY KEY,
            username TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_scraped_tweet_table(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scraped_tweet (
            id BIGINT PRIMARY KEY,
            text TEXT NOT NULL,
            author_id BIGINT NOT NULL,
            date TIMESTAMPTZ NOT NULL,
            conversation_id BIGINT,
            parent_tweet_id BIGINT,
            quoted_id BIGINT,
            prediction_id UUID,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS scraped_tweet_conversation_id_idx ON scraped_tweet (conversation_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS scraped_tweet_prediction_id_idx ON scraped_tweet (prediction_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_parsed_prediction_table(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS parsed_prediction (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            prediction_id UUID NOT NULL,
            target JSONB NOT NULL,
            timeframe JSONB NOT NULL,
            llm_confidence TEXT,
            vagueness TEXT,
            topic_id UUID,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS parsed_prediction_created_at_idx ON parsed_prediction (created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_twitter_scraping_job_table(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS twitter_scraping_job (
            id BIGSERIAL PRIMARY KEY,
            conversation_id BIGINT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_parsed_prediction_feedback_table(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS parsed_prediction_feedback (
            id UUID PRIMARY KEY,
            parsed_prediction_id UUID NOT NULL REFERENCES parsed_prediction (id),
            validation_step TEXT NOT NULL,
            failure_cause TEXT,
            reason TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS parsed_prediction_feedback_prediction_idx ON parsed_prediction_feedback (parsed_prediction_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_parsed_prediction_details_table(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS parsed_prediction_details (
            parsed_prediction_id UUID PRIMARY KEY REFERENCES parsed_prediction (id),
            timeframe_status TEXT,
            timeframe_start_utc TIMESTAMPTZ,
            timeframe_end_utc TIMESTAMPTZ,
            timeframe_precision TEXT,
            timeframe_reasoning TEXT,
            timeframe_assumptions JSONB,
            timeframe_confidence DOUBLE PRECISION,
            prediction_context TEXT,
            filter_validation_confidence DOUBLE PRECISION,
            filter_validation_reasoning TEXT,
            verdict_confidence DOUBLE PRECISION,
            verdict_sources JSONB,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_prediction_duplicate_relation_table(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS prediction_duplicate_relation (
            prediction_id UUID PRIMARY KEY REFERENCES parsed_prediction (id),
            canonical_id UUID NOT NULL REFERENCES parsed_prediction (id),
            similarity_score DOUBLE PRECISION NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_verdict_table(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS verdict (
            id UUID PRIMARY KEY,
            parsed_prediction_id UUID NOT NULL UNIQUE REFERENCES parsed_prediction (id),
            verdict BOOLEAN NOT NULL,
            context JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_dedup_processed_conversation_table(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dedup_processed_conversation (
            conversation_id BIGINT PRIMARY KEY,
            predictions_processed INTEGER NOT NULL,
            duplicates_found INTEGER NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
