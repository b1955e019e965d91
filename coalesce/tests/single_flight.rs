//! End-to-end coordination over the in-process backends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use coalesce::{
    ActionResult, Actor, JsonCodec, KeyableMap, Manager, MemoryStore, MsgpackCodec, MutexLocker,
};
use tokio::time::sleep;

fn make_actor(name: &str) -> Actor<String, String> {
    Actor::new(
        name,
        Arc::new(MemoryStore::new()),
        Arc::new(MutexLocker::new()),
        Arc::new(JsonCodec),
    )
}

#[tokio::test]
async fn test_single_flight_runs_action_once() {
    let actor = Arc::new(make_actor("reports"));
    let invocations = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let actor = Arc::clone(&actor);
        let invocations = Arc::clone(&invocations);
        handles.push(tokio::spawn(async move {
            actor
                .run("hot", move || {
                    let invocations = Arc::clone(&invocations);
                    async move {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_millis(200)).await;
                        Ok::<_, String>(ActionResult::cached_for(
                            "warm".to_string(),
                            Duration::from_secs(60),
                        ))
                    }
                })
                .await
                .unwrap()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), "warm");
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_uncached_results_run_every_caller() {
    let actor = Arc::new(make_actor("reports"));
    let invocations = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let actor = Arc::clone(&actor);
        let invocations = Arc::clone(&invocations);
        handles.push(tokio::spawn(async move {
            actor
                .run("volatile", move || {
                    let invocations = Arc::clone(&invocations);
                    async move {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, String>(ActionResult::uncached("fresh".to_string()))
                    }
                })
                .await
                .unwrap()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), "fresh");
    }
    // Nobody cached, so the callers serialize on the lock and each one
    // computes for itself.
    assert_eq!(invocations.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_hit_within_ttl_skips_later_actions() {
    let actor = make_actor("reports");

    let value = actor
        .run("daily", || async {
            Ok::<_, String>(ActionResult::cached("first".to_string()))
        })
        .await
        .unwrap();
    assert_eq!(value, "first");

    let second_ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&second_ran);
    let value = actor
        .run("daily", move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(ActionResult::cached("second".to_string()))
            }
        })
        .await
        .unwrap();

    assert_eq!(value, "first");
    assert_eq!(second_ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_expired_entry_reruns_action() {
    let actor = make_actor("reports");

    actor
        .run("daily", || async {
            Ok::<_, String>(ActionResult::cached_for(
                "stale".to_string(),
                Duration::from_millis(150),
            ))
        })
        .await
        .unwrap();

    sleep(Duration::from_millis(300)).await;

    let reran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reran);
    let value = actor
        .run("daily", move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(ActionResult::cached("fresh".to_string()))
            }
        })
        .await
        .unwrap();

    assert_eq!(value, "fresh");
    assert_eq!(reran.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalidate_forces_recompute() {
    let actor = make_actor("reports");

    actor
        .run("daily", || async {
            Ok::<_, String>(ActionResult::cached("first".to_string()))
        })
        .await
        .unwrap();
    actor.invalidate("daily").await.unwrap();

    let reran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reran);
    let value = actor
        .run("daily", move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(ActionResult::cached("second".to_string()))
            }
        })
        .await
        .unwrap();

    assert_eq!(value, "second");
    assert_eq!(reran.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_namespaces_do_not_collide() {
    let store = Arc::new(MemoryStore::new());
    let locker = Arc::new(MutexLocker::new());
    let manager = Manager::new(store, locker);

    let invoices = manager.actor::<String, String>("invoices");
    let receipts = manager.actor::<String, String>("receipts");

    let a = invoices
        .run("42", || async {
            Ok::<_, String>(ActionResult::cached("invoice-42".to_string()))
        })
        .await
        .unwrap();
    let b = receipts
        .run("42", || async {
            Ok::<_, String>(ActionResult::cached("receipt-42".to_string()))
        })
        .await
        .unwrap();

    assert_eq!(a, "invoice-42");
    assert_eq!(b, "receipt-42");
}

#[tokio::test]
async fn test_msgpack_payloads_survive_the_store() {
    let store = Arc::new(MemoryStore::new());
    let locker = Arc::new(MutexLocker::new());
    let manager = Manager::new(store, locker);
    let actor = manager.actor_with_codec::<Vec<(String, u32)>, String>(
        "rankings",
        Arc::new(MsgpackCodec),
    );

    let rankings = vec![("ada".to_string(), 3), ("lin".to_string(), 1)];
    let expected = rankings.clone();
    actor
        .run("weekly", move || {
            let rankings = rankings.clone();
            async move { Ok::<_, String>(ActionResult::cached(rankings)) }
        })
        .await
        .unwrap();

    // Served from the store this time, decoded through the same codec.
    let value = actor
        .run("weekly", || async {
            Ok::<_, String>(ActionResult::uncached(Vec::new()))
        })
        .await
        .unwrap();
    assert_eq!(value, expected);
}

#[tokio::test]
async fn test_equal_mapping_keys_share_an_entry() {
    let actor = make_actor("queries");

    let first_key = KeyableMap::new().with("tenant", 9).with("country", "se");
    let value = actor
        .run(first_key, || async {
            Ok::<_, String>(ActionResult::cached("rows".to_string()))
        })
        .await
        .unwrap();
    assert_eq!(value, "rows");

    // Same logical content, different insertion order.
    let second_key = KeyableMap::new().with("country", "se").with("tenant", 9);
    let reran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reran);
    let value = actor
        .run(second_key, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(ActionResult::cached("other rows".to_string()))
            }
        })
        .await
        .unwrap();

    assert_eq!(value, "rows");
    assert_eq!(reran.load(Ordering::SeqCst), 0);
}
