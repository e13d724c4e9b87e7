//! Integration tests for transactional scopes.

use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use testbed_ledger::{
    BoxError, CleanupLedger, CompensatingAction, EnvironmentPolicy, FailureHandler,
    FailureRecord, HandlerFailure, SessionHandle, TransactionalScope,
};

#[derive(Debug, thiserror::Error)]
enum TestError {
    #[error("{0}")]
    Step(String),
    #[error("nested session teardown failed")]
    Teardown(#[source] Box<FailureRecord<TestError>>),
}

impl From<FailureRecord<TestError>> for TestError {
    fn from(record: FailureRecord<TestError>) -> Self {
        Self::Teardown(Box::new(record))
    }
}

#[derive(Default, Clone)]
struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    fn push(&self, event: impl Into<String>) {
        self.0.lock().expect("log lock").push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.0.lock().expect("log lock").clone()
    }
}

/// Registers the delete before "creating" the resource, like a provisioner.
fn provision(
    ledger: &mut CleanupLedger<TestError>,
    log: &EventLog,
    name: &str,
    fail_create: bool,
) -> Result<String, TestError> {
    let delete_log = log.clone();
    let delete_name = name.to_string();
    ledger.push(CompensatingAction::persistent(name, move |_| {
        delete_log.push(format!("delete {delete_name}"));
        Ok(())
    }));
    if fail_create {
        return Err(TestError::Step(format!("create {name} failed")));
    }
    log.push(format!("create {name}"));
    Ok(name.to_string())
}

fn recording_handler(log: &EventLog) -> Arc<dyn FailureHandler> {
    let log = log.clone();
    Arc::new(move |error: &(dyn Error + 'static)| -> Result<(), BoxError> {
        log.push(format!("handler: {error}"));
        Ok(())
    })
}

#[test]
fn success_returns_value_without_draining() {
    let log = EventLog::default();
    let scope = TransactionalScope::new(recording_handler(&log), EnvironmentPolicy::default());

    let session = scope
        .run(|ledger| {
            provision(ledger, &log, "r1", false)?;
            provision(ledger, &log, "r2", false)?;
            Ok(scope.session("test", ledger))
        })
        .expect("provisioning succeeds");

    assert_eq!(log.events(), vec!["create r1", "create r2"]);
    assert_eq!(session.pending_labels(), vec!["r1", "r2"]);

    session.close().expect("cleanup succeeds");
    assert_eq!(
        log.events(),
        vec!["create r1", "create r2", "delete r2", "delete r1"]
    );
}

#[test]
fn failing_step_runs_handler_then_rolls_back() {
    let log = EventLog::default();
    let scope = TransactionalScope::new(recording_handler(&log), EnvironmentPolicy::default());

    let result: Result<SessionHandle<TestError>, _> = scope.run(|ledger| {
        provision(ledger, &log, "r1", false)?;
        provision(ledger, &log, "r2", false)?;
        provision(ledger, &log, "r3", true)?;
        Ok(scope.session("unreachable", ledger))
    });

    let record = result.expect_err("third step fails");
    assert!(matches!(record.primary(), TestError::Step(m) if m == "create r3 failed"));
    assert!(record.suppressed().is_empty());
    // r3's delete was registered before its create and runs as a no-op.
    assert_eq!(
        log.events(),
        vec![
            "create r1",
            "create r2",
            "handler: create r3 failed",
            "delete r3",
            "delete r2",
            "delete r1",
        ]
    );
}

#[test]
fn handler_failure_is_suppressed_and_cleanup_still_runs() {
    let log = EventLog::default();
    let handler: Arc<dyn FailureHandler> =
        Arc::new(|_: &(dyn Error + 'static)| -> Result<(), BoxError> {
            Err("cannot save state".into())
        });
    let scope = TransactionalScope::new(handler, EnvironmentPolicy::default());

    let record = scope
        .run(|ledger| -> Result<(), TestError> {
            provision(ledger, &log, "r1", false)?;
            Err(TestError::Step("boom".to_string()))
        })
        .expect_err("body fails");

    assert!(matches!(record.primary(), TestError::Step(m) if m == "boom"));
    assert_eq!(record.suppressed().len(), 1);
    let failure = record.suppressed()[0]
        .downcast_ref::<HandlerFailure>()
        .expect("handler failure is suppressed");
    assert_eq!(failure.source.to_string(), "cannot save state");
    assert_eq!(log.events(), vec!["create r1", "delete r1"]);
}

#[test]
fn compensation_failures_follow_handler_failure_in_suppressed_list() {
    let handler: Arc<dyn FailureHandler> =
        Arc::new(|_: &(dyn Error + 'static)| -> Result<(), BoxError> { Err("handler".into()) });
    let scope = TransactionalScope::new(handler, EnvironmentPolicy::default());

    let record = scope
        .run(|ledger| -> Result<(), TestError> {
            ledger.defer_persistent("r1", |_| Err(TestError::Step("r1 stuck".to_string())));
            Err(TestError::Step("boom".to_string()))
        })
        .expect_err("body fails");

    let messages: Vec<String> = record.suppressed().iter().map(ToString::to_string).collect();
    assert_eq!(
        messages,
        vec![
            "failed to run failure handler".to_string(),
            "compensation failed for 'r1': undo r1".to_string(),
        ]
    );
}

#[test]
fn skip_save_state_does_not_call_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let handler: Arc<dyn FailureHandler> =
        Arc::new(move |_: &(dyn Error + 'static)| -> Result<(), BoxError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    let scope = TransactionalScope::new(
        handler,
        EnvironmentPolicy::default().with_skip_save_state(true),
    );

    let result = scope.run(|_ledger: &mut CleanupLedger<TestError>| -> Result<(), TestError> {
        Err(TestError::Step("boom".to_string()))
    });

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn skip_cleanup_keeps_persistent_resources_on_rollback() {
    let log = EventLog::default();
    let scope = TransactionalScope::new(
        recording_handler(&log),
        EnvironmentPolicy::default().with_skip_cleanup(true),
    );

    let result = scope.run(|ledger| -> Result<(), TestError> {
        provision(ledger, &log, "r1", false)?;
        let client_log = log.clone();
        ledger.defer_local("client", move |_| {
            client_log.push("close client");
            Ok(())
        });
        provision(ledger, &log, "r2", true)?;
        Ok(())
    });

    assert!(result.is_err());
    assert_eq!(
        log.events(),
        vec!["create r1", "handler: create r2 failed", "close client"]
    );
}

#[test]
fn nested_scope_resources_are_torn_down_by_outer_failure() {
    let log = EventLog::default();
    let scope = TransactionalScope::new(recording_handler(&log), EnvironmentPolicy::default());

    let result = scope.run(|outer| -> Result<(), TestError> {
        provision(outer, &log, "infra", false)?;

        let tenant = scope
            .run(|inner| {
                provision(inner, &log, "project", false)?;
                provision(inner, &log, "endpoint", false)?;
                Ok(Arc::new(scope.session("tenant", inner)))
            })
            .map_err(TestError::from)?;
        outer.adopt(tenant);

        provision(outer, &log, "late", true)?;
        Ok(())
    });

    assert!(result.is_err());
    assert_eq!(
        log.events(),
        vec![
            "create infra",
            "create project",
            "create endpoint",
            "handler: create late failed",
            "delete late",
            "delete endpoint",
            "delete project",
            "delete infra",
        ]
    );
}

#[test]
fn failed_inner_scope_rolls_back_only_its_own_resources_first() {
    let log = EventLog::default();
    let scope = TransactionalScope::new(recording_handler(&log), EnvironmentPolicy::default());

    let result = scope.run(|outer| -> Result<(), TestError> {
        provision(outer, &log, "infra", false)?;
        scope
            .run(|inner| -> Result<(), TestError> {
                provision(inner, &log, "project", false)?;
                provision(inner, &log, "endpoint", true)?;
                Ok(())
            })
            .map_err(TestError::from)?;
        Ok(())
    });

    let record = result.expect_err("inner failure propagates");
    let TestError::Teardown(inner) = record.primary() else {
        panic!("expected nested record as primary");
    };
    assert!(matches!(inner.primary(), TestError::Step(m) if m == "create endpoint failed"));
    assert_eq!(
        log.events(),
        vec![
            "create infra",
            "create project",
            "handler: create endpoint failed",
            "delete endpoint",
            "delete project",
            "handler: nested session teardown failed",
            "delete infra",
        ]
    );
}

#[test]
fn panicking_step_still_rolls_back() {
    let log = EventLog::default();
    let scope = TransactionalScope::new(recording_handler(&log), EnvironmentPolicy::default());

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        scope.run(|ledger: &mut CleanupLedger<TestError>| -> Result<(), TestError> {
            provision(ledger, &log, "r1", false)?;
            provision(ledger, &log, "r2", false)?;
            panic!("assertion inside a step");
        })
    }));

    assert!(outcome.is_err());
    assert_eq!(
        log.events(),
        ["create r1", "create r2", "delete r2", "delete r1"]
    );
}
