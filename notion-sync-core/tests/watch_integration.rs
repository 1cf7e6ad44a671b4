use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

use notion_sync_core::contract::{ChangeNotice, MockSource, SubscriptionHandle, SubscriptionTarget};
use notion_sync_core::synchronise::CollectionSync;
use notion_sync_core::watch::{watch, WatchSummary};

#[tokio::test(start_paused = true)]
async fn test_change_notice_triggers_extra_cycle_and_shutdown_unsubscribes() {
    let out = tempdir().unwrap();
    let mut source = MockSource::new();
    source.expect_get_rows().returning(|_| Ok(vec![]));

    // The collection subscription fires three notices straight away; they coalesce.
    source.expect_subscribe().times(1).returning(|target, notices| {
        for _ in 0..3 {
            let _ = notices.try_send(ChangeNotice {
                target: target.clone(),
            });
        }
        SubscriptionHandle::new()
    });
    let released = Arc::new(Mutex::new(0));
    let count = released.clone();
    source
        .expect_unsubscribe()
        .times(1)
        .returning(move |_| *count.lock().unwrap() += 1);

    let mut sync = CollectionSync::new(source, "collection", out.path());
    let summary = watch(
        &mut sync,
        Duration::from_secs(3600),
        tokio::time::sleep(Duration::from_millis(50)),
    )
    .await;

    // First tick fires immediately, then one cycle for the coalesced notices.
    assert_eq!(
        summary,
        WatchSummary {
            cycles: 2,
            failed_cycles: 0
        }
    );
    assert_eq!(*released.lock().unwrap(), 1);
    assert!(!sync.is_watching());
}

#[tokio::test(start_paused = true)]
async fn test_failed_cycles_are_retried_on_next_tick() {
    let out = tempdir().unwrap();
    let mut source = MockSource::new();
    let calls = Arc::new(Mutex::new(0));
    let counter = calls.clone();
    source.expect_get_rows().returning(move |_| {
        let mut calls = counter.lock().unwrap();
        *calls += 1;
        if *calls == 1 {
            Err("temporarily unavailable".into())
        } else {
            Ok(vec![])
        }
    });
    source
        .expect_subscribe()
        .withf(|target, _| *target == SubscriptionTarget::Collection("collection".into()))
        .returning(|_, _| SubscriptionHandle::new());
    source.expect_unsubscribe().return_const(());

    let mut sync = CollectionSync::new(source, "collection", out.path());
    let summary = watch(
        &mut sync,
        Duration::from_secs(1),
        tokio::time::sleep(Duration::from_millis(2500)),
    )
    .await;

    assert!(summary.cycles >= 2, "got {summary:?}");
    assert_eq!(summary.failed_cycles, 1);
    assert!(*calls.lock().unwrap() >= 2);
}
