//! Concurrency and lost-race tests.

mod common;

use std::sync::Arc;

use anyhow::Result;
use casket_kv::MemoryKvClient;
use casket_session::{AcquireOutcome, CommitOutcome, SessionItems, SessionStateProvider};
use tokio::sync::Barrier;

use common::{InterferingClient, fast_retry, store_over};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquire_exactly_one_wins() -> Result<()> {
    for round in 0..20 {
        let (store, _client) = common::memory_store();
        let id = format!("race-{round}");
        store.create_uninitialized(&id, 20).await?;

        let barrier = Arc::new(Barrier::new(2));
        let mut handles = Vec::new();
        for _ in 0..2 {
            let store = store.clone();
            let barrier = barrier.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                store.try_acquire_exclusive(&id).await
            }));
        }

        let mut acquired = Vec::new();
        let mut contended = Vec::new();
        for handle in handles {
            match handle.await?? {
                AcquireOutcome::Acquired { lock_id, .. } => acquired.push(lock_id),
                AcquireOutcome::Contended { owner, .. } => contended.push(owner),
                other => panic!("unexpected outcome {other:?}"),
            }
        }

        assert_eq!(acquired.len(), 1, "round {round}");
        assert_eq!(contended, acquired, "loser should see the winner's lock");
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_counter_survives_many_workers() -> Result<()> {
    const WORKERS: usize = 8;
    const HITS: i64 = 10;

    let (store, _client) = common::memory_store();
    store.create_uninitialized("counter", 20).await?;

    let mut handles = Vec::new();
    for _ in 0..WORKERS {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let mut done = 0;
            while done < HITS {
                let AcquireOutcome::Acquired {
                    mut record,
                    lock_id,
                    ..
                } = store.try_acquire_exclusive("counter").await?
                else {
                    tokio::task::yield_now().await;
                    continue;
                };
                let next = record.items.get_i64("A").unwrap_or(0) + 1;
                record.items.set_i64("A", next);
                let outcome = store
                    .commit_and_release("counter", Some(lock_id), &record.items, 20, false)
                    .await?;
                assert_eq!(outcome, CommitOutcome::Committed);
                done += 1;
            }
            anyhow::Ok(())
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let record = store.load("counter", false).await?.expect("exists");
    assert_eq!(record.items.get_i64("A"), Some(WORKERS as i64 * HITS));
    assert!(!record.header.is_locked());
    Ok(())
}

#[tokio::test]
async fn test_lost_races_are_retried() -> Result<()> {
    let inner = Arc::new(MemoryKvClient::new());
    let client = Arc::new(InterferingClient::new(inner, "+info-", 3));
    let store = store_over(client.clone(), fast_retry(10));

    store.create_uninitialized("s1", 20).await?;
    let outcome = store.try_acquire_exclusive("s1").await?;

    assert!(matches!(outcome, AcquireOutcome::Acquired { .. }));
    assert_eq!(client.interfered(), 3);
    Ok(())
}

#[tokio::test]
async fn test_retries_are_bounded() -> Result<()> {
    let inner = Arc::new(MemoryKvClient::new());
    let client = Arc::new(InterferingClient::new(inner, "+info-", u32::MAX));
    let store = store_over(client.clone(), fast_retry(4));

    store.create_uninitialized("s1", 20).await?;
    assert_eq!(
        store.try_acquire_exclusive("s1").await?,
        AcquireOutcome::Exhausted { attempts: 4 }
    );
    assert_eq!(client.interfered(), 4);

    // The provider reports exhaustion as locked with no known owner.
    let item = store.get_item_exclusive("s1").await?;
    assert!(item.locked);
    assert!(item.lock_id.is_none());
    assert!(item.record.is_none());

    // Nobody actually holds the lock.
    let header = store.load("s1", true).await?.expect("exists").header;
    assert!(!header.is_locked());
    Ok(())
}

#[tokio::test]
async fn test_data_race_during_commit_is_a_conflict() -> Result<()> {
    let inner = Arc::new(MemoryKvClient::new());
    let client = Arc::new(InterferingClient::new(inner, "+data-", 1));
    let store = store_over(client.clone(), fast_retry(10));

    store.create_uninitialized("s1", 20).await?;
    let lock_id = store.try_acquire_exclusive("s1").await?.lock_id();
    let before = store.load("s1", false).await?.expect("exists");

    let mut items = SessionItems::new();
    items.set_i64("A", 99);
    let outcome = store
        .commit_and_release("s1", lock_id, &items, 20, false)
        .await?;
    assert_eq!(outcome, CommitOutcome::Conflict);

    // Header untouched: still locked by the caller, data not replaced.
    let after = store.load("s1", false).await?.expect("exists");
    assert_eq!(after.header, before.header);
    assert!(after.items.is_empty());

    // The lock is still usable for a retry.
    let outcome = store
        .commit_and_release("s1", lock_id, &items, 20, false)
        .await?;
    assert_eq!(outcome, CommitOutcome::Committed);
    Ok(())
}

#[tokio::test]
async fn test_header_race_during_release_is_retried() -> Result<()> {
    let inner = Arc::new(MemoryKvClient::new());
    let store = store_over(inner.clone(), fast_retry(10));

    store.create_uninitialized("s1", 20).await?;
    let lock_id = store
        .try_acquire_exclusive("s1")
        .await?
        .lock_id()
        .expect("acquired");

    // Same backing data, but the releasing process loses two header races.
    let interfering = Arc::new(InterferingClient::new(inner, "+info-", 2));
    let releasing = store_over(interfering.clone(), fast_retry(10));
    assert!(releasing.release_item_exclusive("s1", lock_id).await?);
    assert_eq!(interfering.interfered(), 2);

    let header = store.load("s1", true).await?.expect("exists").header;
    assert!(!header.is_locked());
    Ok(())
}
