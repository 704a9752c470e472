use super::*;
use crate::{
    ReadinessGate, Size,
    test_util::{GatedEngine, settle},
};
use core::time::Duration;
use futures::future::join_all;
use std::collections::{HashSet, VecDeque};

fn spawn_open(engine: Arc<GatedEngine>, pool_size: usize) -> DispatcherHandle {
    Dispatcher::spawn(
        engine,
        PoolConfig::default().with_pool_size(pool_size),
        ReadinessGate::opened(),
        EventBus::new(),
    )
}

fn png_of(seed: &str, size: Size) -> Artifact {
    Artifact::Image(crate::ImageData::from_png(bytes::Bytes::from(format!(
        "{seed}@{}",
        size.pixels()
    ))))
}

#[tokio::test]
async fn identical_requests_share_one_invocation() {
    let (engine, mut started) = GatedEngine::blocking();
    let handle = spawn_open(Arc::clone(&engine), 4);

    let requests: Vec<_> = (0..5)
        .map(|_| handle.request(Job::image("seedX", Size::Large)))
        .collect();

    assert_eq!(started.recv().await.as_deref(), Some("seedX"));
    settle(|| handle.stats().requests == 5).await;
    assert_eq!(handle.stats().coalesced, 4);

    engine.release("seedX");
    for result in join_all(requests).await {
        assert_eq!(result.unwrap(), png_of("seedX", Size::Large));
    }
    assert_eq!(engine.calls("seedX"), 1);
    assert_eq!(handle.stats().dispatched, 1);
}

#[tokio::test(start_paused = true)]
async fn staggered_identical_requests_coalesce() {
    let (engine, mut started) = GatedEngine::blocking();
    let handle = spawn_open(Arc::clone(&engine), 8);

    let mut requests = Vec::new();
    for _ in 0..4 {
        requests.push(handle.request(Job::image("seedX", Size::Large)));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(started.recv().await.as_deref(), Some("seedX"));

    engine.release("seedX");
    let results: Vec<_> = join_all(requests).await;
    let first = results[0].clone().unwrap();
    assert!(results.iter().all(|r| r.as_ref() == Ok(&first)));
    assert_eq!(first.to_display(), png_of("seedX", Size::Large).to_display());
    assert_eq!(engine.calls("seedX"), 1);
    assert_eq!(handle.stats().cache_entries, 1);
}

#[tokio::test]
async fn completed_results_are_cached() {
    let engine = GatedEngine::instant();
    let handle = spawn_open(Arc::clone(&engine), 2);

    let first = handle.request(Job::name("abc")).await.unwrap();
    let second = handle.request(Job::name("abc")).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first, Artifact::Name("Robot abc".into()));
    assert_eq!(engine.calls("abc"), 1);

    let stats = handle.stats();
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_entries, 1);
}

#[tokio::test]
async fn sizes_and_kinds_are_distinct_entries() {
    let engine = GatedEngine::instant();
    let handle = spawn_open(Arc::clone(&engine), 2);

    let small = handle.request(Job::image("abc", Size::Small)).await.unwrap();
    let large = handle.request(Job::image("abc", Size::Large)).await.unwrap();
    let name = handle.request(Job::name("abc")).await.unwrap();

    assert_ne!(small, large);
    assert!(matches!(name, Artifact::Name(_)));
    assert_eq!(engine.calls("abc"), 3);
    assert_eq!(handle.stats().cache_entries, 3);
}

#[tokio::test]
async fn failures_are_not_cached() {
    let engine = GatedEngine::instant();
    let handle = spawn_open(Arc::clone(&engine), 2);

    engine.fail_next("bad");
    let err = handle.request(Job::image("bad", Size::Small)).await.unwrap_err();
    assert!(matches!(err, Error::Engine(_)));
    assert_eq!(handle.stats().cache_entries, 0);

    let retry = handle.request(Job::image("bad", Size::Small)).await;
    assert_eq!(retry.unwrap(), png_of("bad", Size::Small));
    assert_eq!(engine.calls("bad"), 2);
    assert_eq!(handle.stats().failed, 1);
}

#[tokio::test]
async fn failure_reaches_every_coalesced_waiter() {
    let (engine, mut started) = GatedEngine::blocking();
    let handle = spawn_open(Arc::clone(&engine), 2);
    engine.fail_next("bad");

    let requests: Vec<_> = (0..3).map(|_| handle.request(Job::name("bad"))).collect();
    started.recv().await;
    settle(|| handle.stats().requests == 3).await;
    engine.release("bad");

    for result in join_all(requests).await {
        assert!(matches!(result, Err(Error::Engine(_))));
    }
    assert_eq!(engine.calls("bad"), 1);
}

#[tokio::test]
async fn pool_bounds_concurrency_and_drains_fifo() {
    let (engine, mut started) = GatedEngine::blocking();
    let handle = spawn_open(Arc::clone(&engine), 3);
    let seeds: Vec<String> = (0..20).map(|i| format!("s{i}")).collect();

    let requests: Vec<_> = seeds
        .iter()
        .map(|seed| handle.request(Job::name(seed.as_str())))
        .collect();

    let mut running = VecDeque::new();
    for _ in 0..3 {
        running.push_back(started.recv().await.unwrap());
    }
    let first: HashSet<_> = running.iter().cloned().collect();
    assert_eq!(first, seeds[..3].iter().cloned().collect::<HashSet<_>>());

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(started.try_recv().is_err());
    assert_eq!(engine.active(), 3);
    assert_eq!(handle.stats().dispatched, 3);

    // Freeing one worker admits exactly the oldest queued task.
    for expected in &seeds[3..] {
        let done = running.pop_front().unwrap();
        engine.release(&done);
        let next = started.recv().await.unwrap();
        assert_eq!(&next, expected);
        running.push_back(next);
    }
    for seed in running {
        engine.release(&seed);
    }

    let results = join_all(requests).await;
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(engine.max_active(), 3);
    assert_eq!(engine.total_calls(), 20);
}

#[tokio::test]
async fn freed_worker_takes_next_queued_task() {
    let (engine, mut started) = GatedEngine::blocking();
    let handle = spawn_open(Arc::clone(&engine), 2);

    let a = handle.request(Job::name("A"));
    let b = handle.request(Job::name("B"));
    let c = handle.request(Job::name("C"));
    let d = handle.request(Job::name("D"));

    let mut first = vec![started.recv().await.unwrap(), started.recv().await.unwrap()];
    first.sort();
    assert_eq!(first, ["A", "B"]);

    // A second request for A joins the running task instead of queueing.
    let a_again = handle.request(Job::name("A"));
    settle(|| handle.stats().requests == 5).await;
    assert_eq!(handle.stats().coalesced, 1);

    engine.release("A");
    assert_eq!(a.await.unwrap(), Artifact::Name("Robot A".into()));
    assert_eq!(a_again.await.unwrap(), Artifact::Name("Robot A".into()));
    assert_eq!(started.recv().await.as_deref(), Some("C"));

    engine.release("B");
    assert_eq!(b.await.unwrap(), Artifact::Name("Robot B".into()));
    assert_eq!(started.recv().await.as_deref(), Some("D"));

    engine.release("C");
    engine.release("D");
    assert!(c.await.is_ok());
    assert!(d.await.is_ok());
    assert_eq!(engine.max_active(), 2);
    assert_eq!(engine.total_calls(), 4);

    let stats = handle.stats();
    assert_eq!(stats.coalesced, 1);
    assert_eq!(stats.dispatched, 4);
    assert_eq!(stats.cache_entries, 4);
}

#[tokio::test]
async fn requests_wait_for_readiness() {
    let engine = GatedEngine::instant();
    let (gate, signal) = ReadinessGate::manual();
    let events = EventBus::new();
    let mut rx = events.subscribe();
    let handle = Dispatcher::spawn(Arc::clone(&engine), PoolConfig::default(), gate, events);

    let pending = handle.request(Job::image("early", Size::Small));
    settle(|| handle.stats().requests == 1).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(engine.total_calls(), 0);
    assert_eq!(handle.stats().dispatched, 0);

    signal.open();
    assert_eq!(pending.await.unwrap(), png_of("early", Size::Small));
    assert_eq!(rx.recv().await.unwrap(), Event::EngineReady);
}

#[tokio::test]
async fn readiness_failure_rejects_until_recovery() {
    let engine = GatedEngine::instant();
    let (gate, signal) = ReadinessGate::manual();
    let events = EventBus::new();
    let mut rx = events.subscribe();
    let handle = Dispatcher::spawn(Arc::clone(&engine), PoolConfig::default(), gate, events);

    let queued = handle.request(Job::name("early"));
    settle(|| handle.stats().requests == 1).await;

    let timeout = Error::ReadinessTimeout {
        waited: Duration::from_secs(30),
    };
    signal.fail(timeout.clone());
    assert_eq!(queued.await.unwrap_err(), timeout);
    assert_eq!(
        rx.recv().await.unwrap(),
        Event::ReadinessFailed {
            reason: timeout.to_string()
        }
    );
    assert_eq!(handle.request(Job::name("late")).await.unwrap_err(), timeout);

    signal.open();
    assert_eq!(rx.recv().await.unwrap(), Event::EngineReady);
    assert_eq!(
        handle.request(Job::name("late")).await.unwrap(),
        Artifact::Name("Robot late".into())
    );
    assert_eq!(engine.total_calls(), 1);
}

#[tokio::test]
async fn engine_panic_leaves_worker_serving() {
    let engine = GatedEngine::instant();
    let handle = spawn_open(Arc::clone(&engine), 1);
    engine.panic_on("boom");

    let err = handle.request(Job::name("boom")).await.unwrap_err();
    assert!(matches!(err, Error::EnginePanicked { .. }));

    let ok = handle.request(Job::name("fine")).await;
    assert_eq!(ok.unwrap(), Artifact::Name("Robot fine".into()));
    assert_eq!(handle.stats().failed, 1);
}

#[tokio::test]
async fn zero_sized_pool_still_serves() {
    let engine = GatedEngine::instant();
    let handle = spawn_open(Arc::clone(&engine), 0);
    assert!(handle.request(Job::name("abc")).await.is_ok());
}

#[tokio::test]
async fn shutdown_rejects_queued_and_finishes_in_flight() {
    let (engine, mut started) = GatedEngine::blocking();
    let handle = spawn_open(Arc::clone(&engine), 1);

    let running = handle.request(Job::name("a"));
    let queued = handle.request(Job::name("b"));
    assert_eq!(started.recv().await.as_deref(), Some("a"));

    let stopper = handle.clone();
    let stop = tokio::spawn(async move { stopper.shutdown().await });

    assert_eq!(queued.await.unwrap_err(), Error::ServiceShutdown);
    engine.release("a");
    assert_eq!(running.await.unwrap(), Artifact::Name("Robot a".into()));
    stop.await.unwrap().unwrap();

    let after = handle.request(Job::name("c")).await;
    assert_eq!(after.unwrap_err(), Error::ServiceShutdown);
    assert_eq!(engine.calls("b"), 0);
}

#[tokio::test]
async fn shutdown_with_unbounded_grace_period() {
    let engine = GatedEngine::instant();
    let handle = Dispatcher::spawn(
        Arc::clone(&engine),
        PoolConfig::default().with_shutdown_timeout(Duration::from_secs(u64::MAX)),
        ReadinessGate::opened(),
        EventBus::new(),
    );

    assert!(handle.request(Job::name("abc")).await.is_ok());
    handle.shutdown().await.unwrap();
    assert_eq!(
        handle.request(Job::name("abc")).await.unwrap_err(),
        Error::ServiceShutdown
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_gives_up_on_stuck_work() {
    let (engine, mut started) = GatedEngine::blocking();
    let handle = Dispatcher::spawn(
        Arc::clone(&engine),
        PoolConfig::default()
            .with_pool_size(1)
            .with_shutdown_timeout(Duration::from_millis(50)),
        ReadinessGate::opened(),
        EventBus::new(),
    );

    let stuck = handle.request(Job::name("stuck"));
    started.recv().await;

    handle.shutdown().await.unwrap();
    assert_eq!(stuck.await.unwrap_err(), Error::ServiceShutdown);
}
