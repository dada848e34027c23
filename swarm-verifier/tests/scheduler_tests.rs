//! Worker pool tests
//!
//! Run the real scheduler over the in-process store with millisecond
//! intervals. The workers read the wall clock, so fixtures here are dated
//! relative to `Utc::now()` rather than the fixed test clock.

mod helpers;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use helpers::*;
use swarm_common::models::Tweet;
use swarm_verifier::reasoning::Stage;
use swarm_verifier::store::MemoryStore;
use swarm_verifier::workflow::{Scheduler, SchedulerConfig, StopPredicate};

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn fast_config(concurrency: usize) -> SchedulerConfig {
    SchedulerConfig {
        concurrency,
        idle_interval: Duration::from_millis(20),
        backoff_base: Duration::from_millis(10),
        backoff_max: Duration::from_millis(40),
    }
}

/// Reasoning service that matures against the wall clock
fn live_fake() -> Arc<FakeReasoning> {
    let fake = FakeReasoning::happy_path();
    fake.reply(
        Stage::Timeframe,
        timeframe_reply("explicit", Some(Utc::now() - chrono::Duration::days(30))),
    );
    Arc::new(fake)
}

/// `count` predictions, each in its own conversation
fn seeded_store(count: i64) -> MemoryStore {
    let store = MemoryStore::new();
    for n in 1..=count {
        let tweet_id = n * 100;
        store.insert_tweet(prediction_tweet(tweet_id, n, &format!("pub-{}", n)));
        let mut p = prediction(&format!("p{}", n), &format!("pub-{}", n), tweet_id);
        p.created_at = Utc::now() - chrono::Duration::hours(1);
        store.insert_prediction(p);
    }
    store
}

#[tokio::test]
async fn test_workers_drain_queue_then_stop() {
    // Given: five eligible predictions and three workers
    let store = seeded_store(5);
    let fake = live_fake();
    let scheduler = Scheduler::new(
        Arc::new(store.clone()),
        Arc::new(orchestrator(Arc::clone(&fake))),
        fast_config(3),
    );

    let watched = store.clone();
    let stop: StopPredicate =
        Arc::new(move || (1..=5).all(|n| watched.verdict_for(&format!("p{}", n)).is_some()));

    // When: the pool runs until every prediction has a verdict
    let stats = tokio::time::timeout(TEST_TIMEOUT, scheduler.run(stop))
        .await
        .expect("workers did not stop");

    // Then: each prediction was processed exactly once
    assert_eq!(stats.processed, 5);
    assert_eq!(stats.failures, 0);
    assert_eq!(fake.requests().len(), 15);
    for n in 1..=5 {
        let id = format!("p{}", n);
        assert!(store.feedback_for(&id).is_empty());
        assert!(store.duplicate_for(&id).is_none());
    }
    assert!(store.claimed_ids().is_empty());
}

/// Whether `id` holds a verdict, feedback or a duplicate relation
fn terminal_records(store: &MemoryStore, id: &str) -> usize {
    usize::from(store.verdict_for(id).is_some())
        + store.feedback_for(id).len()
        + usize::from(store.duplicate_for(id).is_some())
}

#[tokio::test]
async fn test_concurrent_workers_settle_duplicate_cluster_once() {
    // Given: one claim restated down a reply chain, with the canonical id
    // neither the oldest nor the first one claimed
    let store = MemoryStore::new();
    store.insert_tweet(prediction_tweet(10, 1, "pub-a"));
    store.insert_tweet(Tweet {
        prediction_id: Some("pub-b".into()),
        ..tweet(11, 1, Some(10), "Agreed, $200k by end of 2025")
    });
    store.insert_tweet(Tweet {
        prediction_id: Some("pub-c".into()),
        ..tweet(12, 1, Some(11), "Same call here")
    });
    for (id, hours_ago) in [("b", 3), ("a", 2), ("c", 1)] {
        let mut p = prediction(id, &format!("pub-{}", id), 10);
        p.created_at = Utc::now() - chrono::Duration::hours(hours_ago);
        store.insert_prediction(p);
    }

    let fake = live_fake();
    let scheduler = Scheduler::new(
        Arc::new(store.clone()),
        Arc::new(orchestrator(Arc::clone(&fake))),
        fast_config(3),
    );

    let watched = store.clone();
    let stop: StopPredicate =
        Arc::new(move || ["a", "b", "c"].iter().all(|id| terminal_records(&watched, id) > 0));

    // When: three workers claim the cluster at once
    let stats = tokio::time::timeout(TEST_TIMEOUT, scheduler.run(stop))
        .await
        .expect("workers did not stop");

    // Then: every member ends with exactly one terminal record, and only the
    // canonical member reaches the reasoning service
    for id in ["a", "b", "c"] {
        assert_eq!(terminal_records(&store, id), 1, "prediction {}", id);
    }
    assert!(store.verdict_for("a").is_some());
    assert_eq!(store.duplicate_for("b").unwrap().canonical_id, "a");
    assert_eq!(store.duplicate_for("c").unwrap().canonical_id, "a");
    assert_eq!(stats.processed, 3);
    assert_eq!(stats.failures, 0);
    assert_eq!(fake.requests().len(), 3);
    assert!(store.claimed_ids().is_empty());
}

#[tokio::test]
async fn test_failing_pass_backs_off_and_leaves_prediction_eligible() {
    // Given: a timeframe stage that always fails
    let store = seeded_store(1);
    let fake = live_fake();
    fake.fail(Stage::Timeframe, "upstream timeout");
    let scheduler = Scheduler::new(
        Arc::new(store.clone()),
        Arc::new(orchestrator(Arc::clone(&fake))),
        fast_config(1),
    );

    let counted = Arc::clone(&fake);
    let stop: StopPredicate = Arc::new(move || counted.requests().len() >= 3);

    // When: the worker fails three times in a row
    let started = Instant::now();
    let stats = tokio::time::timeout(TEST_TIMEOUT, scheduler.run(stop))
        .await
        .expect("worker did not stop");

    // Then: it backed off between attempts (10ms, then 20ms) and wrote nothing
    assert_eq!(stats.failures, 3);
    assert_eq!(stats.processed, 0);
    assert!(started.elapsed() >= Duration::from_millis(30));
    assert!(store.details_for("p1").is_none());
    assert!(store.feedback_for("p1").is_empty());
    assert!(store.claimed_ids().is_empty());
}

#[tokio::test]
async fn test_idle_workers_exit_when_stopped() {
    // Given: nothing to verify
    let store = MemoryStore::new();
    let fake = live_fake();
    let scheduler = Scheduler::new(
        Arc::new(store),
        Arc::new(orchestrator(Arc::clone(&fake))),
        fast_config(2),
    );

    let flag = Arc::new(AtomicBool::new(false));
    let setter = Arc::clone(&flag);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        setter.store(true, Ordering::SeqCst);
    });
    let stop: StopPredicate = Arc::new(move || flag.load(Ordering::SeqCst));

    // When/Then: workers idle until the flag flips, then return
    let stats = tokio::time::timeout(TEST_TIMEOUT, scheduler.run(stop))
        .await
        .expect("idle workers did not stop");
    assert!(stats.idle >= 2);
    assert_eq!(stats.processed, 0);
    assert!(fake.requests().is_empty());
}

#[tokio::test]
async fn test_stop_before_start_runs_nothing() {
    let store = seeded_store(2);
    let fake = live_fake();
    let scheduler = Scheduler::new(
        Arc::new(store.clone()),
        Arc::new(orchestrator(Arc::clone(&fake))),
        fast_config(3),
    );

    let stats = scheduler.run(Arc::new(|| true)).await;

    assert_eq!(stats.processed + stats.idle + stats.failures, 0);
    assert!(fake.requests().is_empty());
    assert!(store.verdict_for("p1").is_none());
}
