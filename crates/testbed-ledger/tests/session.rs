//! Integration tests for session handles.

use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use testbed_ledger::{
    BoxError, CleanupLedger, CompensatingAction, EnvironmentPolicy, FailureHandler,
    HandlerFailure, LogFailureHandler, SessionHandle,
};

#[derive(Debug, PartialEq, thiserror::Error)]
#[error("{0}")]
struct TestError(String);

#[derive(Debug, PartialEq, thiserror::Error)]
#[error("assertion failed: {0}")]
struct WorkloadError(String);

fn counting_ledger(counter: &Arc<AtomicUsize>, names: &[&str]) -> CleanupLedger<TestError> {
    let mut ledger = CleanupLedger::new();
    for name in names {
        let counter = Arc::clone(counter);
        ledger.push(CompensatingAction::persistent(*name, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
    }
    ledger
}

fn session(ledger: CleanupLedger<TestError>) -> SessionHandle<TestError> {
    SessionHandle::new(
        "test",
        ledger,
        Arc::new(LogFailureHandler),
        EnvironmentPolicy::default(),
    )
}

#[test]
fn close_twice_drains_once() {
    let counter = Arc::new(AtomicUsize::new(0));
    let session = session(counting_ledger(&counter, &["r1", "r2", "r3"]));

    session.close().expect("first close succeeds");
    session.close().expect("second close is a no-op");

    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert!(session.is_closed());
    assert_eq!(session.pending(), 0);
}

#[test]
fn second_close_reports_nothing_after_failed_first_close() {
    let mut ledger = CleanupLedger::new();
    ledger.defer_persistent("r1", |_| Err(TestError("delete failed".to_string())));
    let session = session(ledger);

    let record = session.close().expect_err("first close reports the failure");
    assert_eq!(record.primary(), &TestError("delete failed".to_string()));

    assert!(session.close().is_ok());
}

#[test]
fn run_returns_workload_error_unchanged_and_keeps_ledger() {
    let counter = Arc::new(AtomicUsize::new(0));
    let session = session(counting_ledger(&counter, &["r1", "r2", "r3"]));

    let record = session
        .run(|| -> Result<(), WorkloadError> { Err(WorkloadError("expected 3 messages".to_string())) })
        .expect_err("workload fails");

    assert_eq!(
        record.into_primary(),
        WorkloadError("expected 3 messages".to_string())
    );
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(session.pending_labels(), vec!["r1", "r2", "r3"]);

    session.close().expect("cleanup succeeds");
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[test]
fn run_passes_through_success() {
    let counter = Arc::new(AtomicUsize::new(0));
    let session = session(counting_ledger(&counter, &["r1"]));

    let value = session
        .run(|| Ok::<_, WorkloadError>(42))
        .expect("workload succeeds");

    assert_eq!(value, 42);
    assert_eq!(session.pending(), 1);
}

#[test]
fn run_notifies_handler_and_suppresses_its_failure() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler: Arc<dyn FailureHandler> =
        Arc::new(move |error: &(dyn Error + 'static)| -> Result<(), BoxError> {
            sink.lock().expect("lock").push(error.to_string());
            Err("collector offline".into())
        });
    let session = SessionHandle::new(
        "test",
        CleanupLedger::<TestError>::new(),
        handler,
        EnvironmentPolicy::default(),
    );

    let record = session
        .run(|| -> Result<(), WorkloadError> { Err(WorkloadError("timeout".to_string())) })
        .expect_err("workload fails");

    assert_eq!(record.primary(), &WorkloadError("timeout".to_string()));
    assert_eq!(record.suppressed().len(), 1);
    assert!(record.suppressed()[0].downcast_ref::<HandlerFailure>().is_some());
    assert_eq!(
        *seen.lock().expect("lock"),
        vec!["assertion failed: timeout".to_string()]
    );
}

#[test]
#[should_panic(expected = "used after it was closed")]
fn run_after_close_fails_fast() {
    let session = session(CleanupLedger::new());
    session.close().expect("close succeeds");

    let _ = session.run(|| Ok::<_, WorkloadError>(()));
}

#[test]
fn push_after_close_is_rejected() {
    let counter = Arc::new(AtomicUsize::new(0));
    let session = session(CleanupLedger::new());
    session.close().expect("close succeeds");

    let late_counter = Arc::clone(&counter);
    let err = session
        .push(CompensatingAction::local("late client", move |_| {
            late_counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .expect_err("closed sessions accept no cleanup");

    assert_eq!(err.to_string(), "session 'test' is already closed");
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn concurrent_close_drains_exactly_once() {
    for _ in 0..50 {
        let counter = Arc::new(AtomicUsize::new(0));
        let session = Arc::new(session(counting_ledger(&counter, &["r1", "r2", "r3"])));
        let barrier = Barrier::new(2);

        thread::scope(|s| {
            for _ in 0..2 {
                let session = Arc::clone(&session);
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    session.close().expect("close succeeds");
                });
            }
        });

        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}

#[test]
fn nested_owner_and_caller_close_share_one_drain() {
    let counter = Arc::new(AtomicUsize::new(0));
    let inner = Arc::new(session(counting_ledger(&counter, &["project", "endpoint"])));
    let mut outer = CleanupLedger::<TestError>::new();
    // The ledger needs a From<FailureRecord> conversion to adopt, so register
    // the close by hand.
    let owned = Arc::clone(&inner);
    outer.defer_local("tenant", move |_| {
        owned.close().map_err(|record| TestError(record.to_string()))
    });

    inner.close().expect("caller closes first");
    assert!(outer.drain_reverse(None).is_none());

    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn dropping_open_session_runs_cleanup() {
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let _session = session(counting_ledger(&counter, &["r1", "r2"]));
    }
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn close_with_audit_reports_order() {
    let counter = Arc::new(AtomicUsize::new(0));
    let session = session(counting_ledger(&counter, &["r1", "r2", "r3"]));

    let (record, audit) = session.close_with_audit();

    assert!(record.is_none());
    let audit = audit.expect("first close drains");
    assert_eq!(audit.labels(), vec!["r3", "r2", "r1"]);

    let (record, audit) = session.close_with_audit();
    assert!(record.is_none());
    assert!(audit.is_none());
}
