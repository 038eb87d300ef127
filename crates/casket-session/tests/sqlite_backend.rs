//! Locking protocol over the SQLite backend, including two handles on one
//! database file standing in for two processes.

mod common;

use std::sync::Arc;

use anyhow::Result;
use casket_kv::SqliteKvClient;
use casket_session::{AcquireOutcome, CommitOutcome, SessionItems, SessionStateProvider};
use tempfile::TempDir;

use common::{fast_retry, store_over};

fn open(dir: &TempDir) -> Result<Arc<SqliteKvClient>> {
    Ok(Arc::new(SqliteKvClient::open(dir.path().join("kv.sqlite3"))?))
}

#[tokio::test]
async fn test_scenario_on_sqlite() -> Result<()> {
    let dir = TempDir::new()?;
    let store = store_over(open(&dir)?, fast_retry(10));

    store.create_uninitialized_item("s1", 20).await?;

    let first = store.get_item_exclusive("s1").await?;
    assert!(!first.locked);
    let t1 = first.lock_id.expect("acquired");

    assert!(store.get_item_exclusive("s1").await?.locked);

    let mut items = SessionItems::new();
    items.set_i64("A", 2);
    assert_eq!(
        store
            .set_and_release_item_exclusive("s1", Some(t1), &items, 20, false)
            .await?,
        CommitOutcome::Committed
    );

    let t2 = store
        .get_item_exclusive("s1")
        .await?
        .lock_id
        .expect("acquired again");
    assert_ne!(t1, t2);

    assert!(store.remove_item("s1", t2).await?);
    assert!(store.get_item("s1").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_two_handles_share_locks() -> Result<()> {
    let dir = TempDir::new()?;
    let web1 = store_over(open(&dir)?, fast_retry(10));
    let web2 = store_over(open(&dir)?, fast_retry(10));

    web1.create_uninitialized("s1", 20).await?;

    let lock_id = web1
        .try_acquire_exclusive("s1")
        .await?
        .lock_id()
        .expect("acquired");

    match web2.try_acquire_exclusive("s1").await? {
        AcquireOutcome::Contended { owner, .. } => assert_eq!(owner, lock_id),
        other => panic!("expected contention, got {other:?}"),
    }

    // The other process can't release or remove what it doesn't hold.
    let bogus = casket_session::LockId::new(lock_id.get() + 1).expect("nonzero");
    assert!(!web2.release_exclusive("s1", bogus).await?);
    assert!(!web2.remove_if_owned("s1", bogus).await?);

    assert!(web1.release_exclusive("s1", lock_id).await?);
    assert!(web2.try_acquire_exclusive("s1").await?.lock_id().is_some());
    Ok(())
}

#[tokio::test]
async fn test_state_survives_reopen() -> Result<()> {
    let dir = TempDir::new()?;
    {
        let store = store_over(open(&dir)?, fast_retry(10));
        let mut items = SessionItems::new();
        items.set_str("user", "ana");
        store
            .commit_and_release("s1", None, &items, 20, true)
            .await?;
    }

    let store = store_over(open(&dir)?, fast_retry(10));
    let record = store.load("s1", false).await?.expect("persisted");
    assert_eq!(record.items.get_str("user"), Some("ana"));
    Ok(())
}
