use task_sched::backend::LogonType;
use task_sched::mock::{DefinitionSnapshot, InMemoryScheduler, RegisteredTask};
use task_sched::{FailOrigin, Hresult, SchedConfig, SchedulerConnection, TaskRegistrar};

/// Returns the scheduler, the reported origin and the live handle count
/// while the connection was still up.
fn run_with_failure_at(origin: FailOrigin) -> (InMemoryScheduler, FailOrigin, usize) {
    let scheduler = InMemoryScheduler::new();
    let mut connection = SchedulerConnection::new(scheduler.clone());
    connection.init().expect("connection should initialize");
    scheduler.inject_failure(Some(origin));

    let mut registrar = TaskRegistrar::new(&connection, SchedConfig::default());
    let err = registrar
        .create_task("C:\\tools\\run.exe", "--mode fast", "PMTask", 30)
        .expect_err("injected failure should surface");

    assert_eq!(err.code, Hresult::E_FAIL);
    assert_eq!(registrar.fail_origin(), err.origin);
    let live = scheduler.live_handles();
    (scheduler, err.origin, live)
}

#[test]
fn every_registration_step_reports_its_own_origin() {
    for origin in FailOrigin::REGISTRATION_STEPS {
        let (scheduler, reported, live) = run_with_failure_at(origin);

        assert_eq!(reported, origin);
        assert!(
            scheduler.task_names().is_empty(),
            "{origin} left a task registered"
        );
        // The connection's service is the only handle still alive.
        assert_eq!(live, 1, "{origin} leaked a handle");
        assert_eq!(scheduler.live_handles(), 0);
    }
}

#[test]
fn failing_step_is_the_last_one_attempted() {
    for origin in FailOrigin::REGISTRATION_STEPS {
        let (scheduler, _, _) = run_with_failure_at(origin);

        assert_eq!(scheduler.calls().last(), Some(&origin));
        let position = FailOrigin::REGISTRATION_STEPS
            .iter()
            .position(|step| *step == origin)
            .unwrap();
        let attempted = scheduler.calls().len() - FailOrigin::CONNECTION_STEPS.len();
        assert_eq!(attempted, position + 1, "{origin} did not short-circuit");
    }
}

#[test]
fn every_connection_step_reports_its_own_origin() {
    for origin in FailOrigin::CONNECTION_STEPS {
        let scheduler = InMemoryScheduler::failing_at(origin);
        let mut connection = SchedulerConnection::new(scheduler.clone());

        let err = connection.init().unwrap_err();
        assert_eq!(err.origin, origin);

        let mut registrar = TaskRegistrar::new(&connection, SchedConfig::default());
        let err = registrar.create_task("a.exe", "", "PMTask", 5).unwrap_err();
        assert_eq!(err.origin, FailOrigin::InvalidObject);
        assert_eq!(scheduler.live_handles(), 0);
        assert!(!scheduler.is_started());
    }
}

fn previous_task() -> RegisteredTask {
    RegisteredTask {
        name: "PMTask".to_string(),
        folder: "\\".to_string(),
        definition: DefinitionSnapshot {
            path: Some("old.exe".to_string()),
            ..DefinitionSnapshot::default()
        },
        logon_type: LogonType::InteractiveToken,
        password: String::new(),
    }
}

#[test]
fn delete_failure_keeps_existing_task() {
    let scheduler = InMemoryScheduler::new();
    let previous = previous_task();
    scheduler.seed_task(previous.clone());

    let mut connection = SchedulerConnection::new(scheduler.clone());
    connection.init().unwrap();
    scheduler.inject_failure(Some(FailOrigin::DeleteTask));

    let mut registrar = TaskRegistrar::new(&connection, SchedConfig::default());
    let err = registrar.create_task("new.exe", "", "PMTask", 5).unwrap_err();

    assert_eq!(err.origin, FailOrigin::DeleteTask);
    assert_eq!(scheduler.task("PMTask"), Some(previous));
}

#[test]
fn failure_after_delete_leaves_no_task_under_the_name() {
    let after_delete = FailOrigin::REGISTRATION_STEPS
        .iter()
        .skip_while(|step| **step != FailOrigin::DeleteTask)
        .skip(1);

    for &origin in after_delete {
        let scheduler = InMemoryScheduler::new();
        scheduler.seed_task(previous_task());
        let mut connection = SchedulerConnection::new(scheduler.clone());
        connection.init().unwrap();
        scheduler.inject_failure(Some(origin));

        let mut registrar = TaskRegistrar::new(&connection, SchedConfig::default());
        let err = registrar.create_task("new.exe", "", "PMTask", 5).unwrap_err();

        assert_eq!(err.origin, origin);
        assert_eq!(scheduler.task("PMTask"), None, "{origin} kept the old task");
        assert_eq!(scheduler.live_handles(), 1, "{origin} leaked a handle");
    }
}

#[test]
fn registrar_recovers_once_failure_is_cleared() {
    let scheduler = InMemoryScheduler::new();
    let mut connection = SchedulerConnection::new(scheduler.clone());
    connection.init().unwrap();
    let mut registrar = TaskRegistrar::new(&connection, SchedConfig::default());

    for origin in FailOrigin::REGISTRATION_STEPS {
        scheduler.inject_failure(Some(origin));
        assert!(registrar.create_task("a.exe", "", "PMTask", 5).is_err());
    }
    scheduler.inject_failure(None);
    registrar.create_task("a.exe", "", "PMTask", 5).unwrap();

    assert_eq!(registrar.fail_origin(), FailOrigin::NoError);
    assert_eq!(scheduler.task_names(), vec!["PMTask".to_string()]);
    assert_eq!(scheduler.live_handles(), 1);
}
