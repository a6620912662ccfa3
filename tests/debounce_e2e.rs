use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use quiesce::{
    AttachRequest, EventSource, GroupId, LocalSource, ManualTimer, Multiplexer, QuiesceError,
    ThreadTimer, TimerDriver, ValidationError,
};

fn manual_fixture() -> (Multiplexer, Arc<ManualTimer>, Arc<LocalSource>) {
    let timer = Arc::new(ManualTimer::new());
    let mux = Multiplexer::new(Arc::clone(&timer) as Arc<dyn TimerDriver>);
    (mux, timer, Arc::new(LocalSource::new()))
}

fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let hits = Arc::new(AtomicUsize::new(0));
    let in_cb = Arc::clone(&hits);
    (hits, move || {
        in_cb.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn scroll_burst_flushes_once_at_quiet_period_end() {
    let (mux, timer, source) = manual_fixture();
    let (hits, cb) = counter();

    let id = mux
        .attach(AttachRequest::new_group(
            Arc::clone(&source) as Arc<dyn EventSource>,
            "scroll",
            Duration::from_millis(100),
            cb,
        ))
        .unwrap();
    assert_eq!(id, GroupId::from_raw(0));

    // Fire "scroll" three times at t=0, 30, 60ms.
    source.emit("scroll");
    timer.advance(Duration::from_millis(30));
    source.emit("scroll");
    timer.advance(Duration::from_millis(30));
    source.emit("scroll");

    // Nothing before t=160ms.
    timer.advance(Duration::from_millis(99));
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    // Exactly one coalesced notification at t=160ms.
    timer.advance(Duration::from_millis(1));
    assert_eq!(timer.now(), Duration::from_millis(160));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // Persistent subscriber: the group stays registered.
    assert!(mux.contains(id));
    assert_eq!(source.handler_count("scroll"), 1);
}

#[test]
fn events_spaced_beyond_timeout_each_flush() {
    let (mux, timer, source) = manual_fixture();
    let (hits, cb) = counter();

    mux.attach(AttachRequest::new_group(
        Arc::clone(&source) as Arc<dyn EventSource>,
        "input",
        Duration::from_millis(100),
        cb,
    ))
    .unwrap();

    for _ in 0..3 {
        source.emit("input");
        timer.advance(Duration::from_millis(200));
    }

    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(mux.flushes(), 3);
    assert_eq!(mux.stale_flushes(), 0);
}

#[test]
fn once_click_flushes_then_group_is_erased() {
    let (mux, timer, source) = manual_fixture();
    let (hits, cb) = counter();

    let id = mux
        .attach(
            AttachRequest::new_group(
                Arc::clone(&source) as Arc<dyn EventSource>,
                "click",
                Duration::from_millis(50),
                cb,
            )
            .once(true),
        )
        .unwrap();

    source.emit("click");
    timer.advance(Duration::from_millis(50));

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!mux.contains(id));
    assert_eq!(source.handler_count("click"), 0);

    // Further events cannot resurrect the group.
    source.emit("click");
    timer.advance(Duration::from_millis(100));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn join_after_teardown_fails_with_unknown_group() {
    let (mux, timer, source) = manual_fixture();

    let id = mux
        .attach(
            AttachRequest::new_group(
                Arc::clone(&source) as Arc<dyn EventSource>,
                "click",
                Duration::from_millis(50),
                || {},
            )
            .once(true),
        )
        .unwrap();

    source.emit("click");
    timer.advance(Duration::from_millis(50));

    let err = mux.attach(AttachRequest::join(id, || {})).unwrap_err();
    let QuiesceError::UnknownGroup { id: offending } = err else {
        panic!("expected unknown group, got {err:?}");
    };
    assert_eq!(offending, id);
}

#[test]
fn one_shot_fires_exactly_once_among_persistent_peers() {
    let (mux, timer, source) = manual_fixture();
    let (persistent_hits, persistent_cb) = counter();
    let (once_hits, once_cb) = counter();

    let id = mux
        .attach(AttachRequest::new_group(
            Arc::clone(&source) as Arc<dyn EventSource>,
            "tick",
            Duration::from_millis(10),
            persistent_cb,
        ))
        .unwrap();
    mux.attach(AttachRequest::join(id, once_cb).once(true)).unwrap();

    for _ in 0..5 {
        source.emit("tick");
        timer.advance(Duration::from_millis(10));
    }

    assert_eq!(persistent_hits.load(Ordering::SeqCst), 5);
    assert_eq!(once_hits.load(Ordering::SeqCst), 1);
    assert_eq!(mux.subscriber_count(id), Some(1));
}

#[test]
fn fresh_registrations_always_get_unused_ids() {
    let (mux, _timer, source) = manual_fixture();

    let mut seen = Vec::new();
    for event in ["a", "b", "c"] {
        let id = mux
            .attach(AttachRequest::new_group(
                Arc::clone(&source) as Arc<dyn EventSource>,
                event,
                Duration::from_millis(10),
                || {},
            ))
            .unwrap();
        assert!(!seen.contains(&id));
        seen.push(id);
    }

    // Detach one and attach again: the id is not recycled.
    mux.detach(seen[1]).unwrap();
    let id = mux
        .attach(AttachRequest::new_group(
            Arc::clone(&source) as Arc<dyn EventSource>,
            "d",
            Duration::from_millis(10),
            || {},
        ))
        .unwrap();
    assert!(!seen.contains(&id));
}

#[test]
fn join_never_creates_groups_or_resubscribes() {
    let (mux, _timer, source) = manual_fixture();

    let id = mux
        .attach(AttachRequest::new_group(
            Arc::clone(&source) as Arc<dyn EventSource>,
            "tick",
            Duration::from_millis(10),
            || {},
        ))
        .unwrap();

    for _ in 0..4 {
        let joined = mux.attach(AttachRequest::join(id, || {})).unwrap();
        assert_eq!(joined, id);
    }

    assert_eq!(mux.group_count(), 1);
    assert_eq!(mux.subscriber_count(id), Some(5));
    assert_eq!(source.handler_count("tick"), 1);
}

#[test]
fn double_detach_fails_on_second_call() {
    let (mux, _timer, source) = manual_fixture();

    let id = mux
        .attach(AttachRequest::new_group(
            Arc::clone(&source) as Arc<dyn EventSource>,
            "tick",
            Duration::from_millis(10),
            || {},
        ))
        .unwrap();

    mux.detach(id).unwrap();
    let err = mux.detach(id).unwrap_err();
    assert!(err.is_unknown_group());
}

#[test]
fn stale_timers_are_noops_without_cancellation() {
    let (mux, timer, source) = manual_fixture();
    let (hits, cb) = counter();

    mux.attach(AttachRequest::new_group(
        Arc::clone(&source) as Arc<dyn EventSource>,
        "tick",
        Duration::from_millis(100),
        cb,
    ))
    .unwrap();

    source.emit("tick");
    timer.advance(Duration::from_millis(50));
    source.emit("tick");

    // Both timers are still scheduled; the first fires stale.
    assert_eq!(timer.pending_count(), 2);
    timer.advance(Duration::from_millis(50));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(mux.stale_flushes(), 1);

    timer.advance(Duration::from_millis(50));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(mux.flushes(), 1);
}

#[test]
fn invalid_new_group_requests_fail_fast() {
    let (mux, _timer, source) = manual_fixture();

    let err = mux
        .attach(AttachRequest::new_group(
            Arc::clone(&source) as Arc<dyn EventSource>,
            "tick",
            Duration::ZERO,
            || {},
        ))
        .unwrap_err();
    let QuiesceError::Validation(ValidationError::ZeroTimeout) = err else {
        panic!("expected zero-timeout validation error, got {err:?}");
    };

    let err = mux
        .attach(AttachRequest::new_group(
            Arc::clone(&source) as Arc<dyn EventSource>,
            "",
            Duration::from_millis(10),
            || {},
        ))
        .unwrap_err();
    let QuiesceError::Validation(ValidationError::EmptyEventName) = err else {
        panic!("expected empty-event-name validation error, got {err:?}");
    };

    // Nothing was registered or subscribed.
    assert_eq!(mux.group_count(), 0);
    assert_eq!(source.handler_count("tick"), 0);
}

#[test]
fn real_time_burst_coalesces_with_thread_timer() {
    let source = Arc::new(LocalSource::new());
    let mux = Multiplexer::new(Arc::new(ThreadTimer::new()));
    let (hits, cb) = counter();

    mux.attach(AttachRequest::new_group(
        Arc::clone(&source) as Arc<dyn EventSource>,
        "scroll",
        Duration::from_millis(50),
        cb,
    ))
    .unwrap();

    for _ in 0..3 {
        source.emit("scroll");
        std::thread::sleep(Duration::from_millis(10));
    }

    // Allow the quiet period to elapse and the worker to fire.
    let mut flushed = 0;
    for _ in 0..50 {
        flushed = hits.load(Ordering::SeqCst);
        if flushed > 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(flushed, 1);
    assert_eq!(mux.flushes(), 1);
    assert_eq!(mux.stale_flushes(), 2);
}
