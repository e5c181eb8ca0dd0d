//! Contract Test: Failure Isolation
//!
//! Verifies that remote and probe failures stay inside one cycle:
//! - A failed apply leaves the persisted address untouched
//! - The next cycle recomputes and resubmits the same list
//! - A failed fetch submits nothing
//! - A failed probe makes no remote calls at all
//! - An address of the wrong family stops the cycle before any remote call
//! - A failed save does not undo a successful apply
//!
//! If this test fails, an address change can be silently lost.

mod common;

use allowsync_core::traits::IpVersion;
use allowsync_core::{AllowList, CycleOutcome, EngineEvent, SyncEngine};
use common::*;

#[tokio::test]
async fn failed_apply_is_resubmitted_next_cycle() {
    let prober = ScriptedProber::new(ip("1.2.3.4"));
    let provider = MockAllowListProvider::new(list(&[
        ("10.0.0.0/8", "office"),
        ("9.9.9.9/32", "home"),
    ]));
    let store = CountingStateStore::with_address(ip("9.9.9.9"));

    let (engine, _events) = SyncEngine::new(
        Box::new(prober.clone()),
        Box::new(provider.clone()),
        Box::new(store.clone()),
        minimal_config("home"),
    )
    .expect("engine construction succeeds");

    provider.fail_apply(Failure::Unavailable);
    let outcome = tokio_test::assert_ok!(engine.run_cycle().await);

    assert_eq!(outcome, CycleOutcome::ApplyFailed);
    assert_eq!(store.persisted().await, Some(ip("9.9.9.9")), "persisted address advanced");
    assert_eq!(store.save_count(), 0);

    provider.fail_apply(Failure::None);
    let outcome = tokio_test::assert_ok!(engine.run_cycle().await);

    assert_eq!(outcome, CycleOutcome::Updated);
    let applied = provider.applied();
    assert_eq!(applied.len(), 2);
    assert_eq!(applied[0], applied[1], "retry submitted a different list");
    assert_eq!(
        applied[1],
        list(&[("10.0.0.0/8", "office"), ("1.2.3.4/32", "home")])
    );
    assert_eq!(store.persisted().await, Some(ip("1.2.3.4")));
}

#[tokio::test]
async fn failed_fetch_submits_nothing() {
    let prober = ScriptedProber::new(ip("1.2.3.4"));
    let provider = MockAllowListProvider::new(list(&[("10.0.0.0/8", "office")]));
    let store = CountingStateStore::new();

    let (engine, mut events) = SyncEngine::new(
        Box::new(prober),
        Box::new(provider.clone()),
        Box::new(store.clone()),
        minimal_config("home"),
    )
    .unwrap();

    provider.fail_fetch(Failure::Unavailable);
    assert_eq!(engine.run_cycle().await.unwrap(), CycleOutcome::FetchFailed);

    assert_eq!(provider.apply_count(), 0);
    assert_eq!(store.persisted().await, None);

    let mut saw_failure = false;
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::UpdateFailed { consecutive_rejections, .. } = event {
            assert_eq!(consecutive_rejections, 0, "transient errors are not rejections");
            saw_failure = true;
        }
    }
    assert!(saw_failure, "UpdateFailed event not emitted");
}

#[tokio::test]
async fn failed_probe_makes_no_remote_calls() {
    let prober = ScriptedProber::new(ip("1.2.3.4"));
    let provider = MockAllowListProvider::new(AllowList::new());
    let store = CountingStateStore::new();

    let (engine, _events) = SyncEngine::new(
        Box::new(prober.clone()),
        Box::new(provider.clone()),
        Box::new(store.clone()),
        minimal_config("home"),
    )
    .unwrap();

    prober.go_offline();
    assert_eq!(engine.run_cycle().await.unwrap(), CycleOutcome::ProbeFailed);
    assert_eq!(provider.fetch_count(), 0);
    assert_eq!(provider.apply_count(), 0);

    // The service comes back and the next cycle converges
    prober.set_address(ip("1.2.3.4"));
    assert_eq!(engine.run_cycle().await.unwrap(), CycleOutcome::Updated);
    assert_eq!(provider.remote(), list(&[("1.2.3.4/32", "home")]));
}

#[tokio::test]
async fn conflict_is_retried_not_fatal() {
    let mut config = minimal_config("home");
    config.engine.max_consecutive_rejections = Some(1);

    let provider = MockAllowListProvider::new(AllowList::new());
    let (engine, _events) = SyncEngine::new(
        Box::new(ScriptedProber::new(ip("1.2.3.4"))),
        Box::new(provider.clone()),
        Box::new(CountingStateStore::new()),
        config,
    )
    .unwrap();

    provider.fail_apply(Failure::Conflict);
    for _ in 0..3 {
        assert_eq!(engine.run_cycle().await.unwrap(), CycleOutcome::ApplyFailed);
    }
    assert_eq!(provider.apply_count(), 3);
}

#[tokio::test]
async fn failed_save_keeps_remote_update() {
    let prober = ScriptedProber::new(ip("1.2.3.4"));
    let provider = MockAllowListProvider::new(AllowList::new());
    let store = CountingStateStore::new();
    store.refuse_writes(true);

    let (engine, _events) = SyncEngine::new(
        Box::new(prober),
        Box::new(provider.clone()),
        Box::new(store.clone()),
        minimal_config("home"),
    )
    .unwrap();

    assert_eq!(engine.run_cycle().await.unwrap(), CycleOutcome::Updated);
    assert_eq!(store.persisted().await, None);

    // Next cycle sees "no persisted address", fetches, finds the remote
    // already correct and persists without a second mutation
    store.refuse_writes(false);
    assert_eq!(engine.run_cycle().await.unwrap(), CycleOutcome::InSync);
    assert_eq!(provider.apply_count(), 1);
    assert_eq!(store.persisted().await, Some(ip("1.2.3.4")));
}

#[tokio::test]
async fn wrong_address_family_stops_before_fetch() {
    let prober = ScriptedProber::new(ip("2001:db8::1")).restricted_to(IpVersion::V4);
    let provider = MockAllowListProvider::new(AllowList::new());
    let store = CountingStateStore::new();

    let (engine, mut events) = SyncEngine::new(
        Box::new(prober.clone()),
        Box::new(provider.clone()),
        Box::new(store.clone()),
        minimal_config("home"),
    )
    .unwrap();

    assert_eq!(engine.run_cycle().await.unwrap(), CycleOutcome::ProbeFailed);
    assert_eq!(provider.fetch_count(), 0);
    assert_eq!(store.persisted().await, None);
    assert!(
        std::iter::from_fn(|| events.try_recv().ok())
            .any(|e| matches!(e, EngineEvent::AddressProbeFailed { .. }))
    );

    prober.set_address(ip("1.2.3.4"));
    assert_eq!(engine.run_cycle().await.unwrap(), CycleOutcome::Updated);
}
