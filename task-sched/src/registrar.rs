use crate::backend::{
    Action, ActionCollection, ActionKind, ExecAction, IdleSettings, LogonType, Principal,
    RegistrationInfo, SchedulerSubsystem, TaskDefinition, TaskFolder, TaskService, TaskSettings,
    TimeTrigger, Trigger, TriggerCollection, TriggerKind,
};
use crate::config::SchedConfig;
use crate::connection::SchedulerConnection;
use crate::error::{at, SchedError};
use crate::fail_origin::FailOrigin;
use crate::window::TriggerWindow;
use chrono::Utc;
use log::{debug, info, warn};

/// Builds and registers one-shot tasks over a ready connection.
///
/// Every handle acquired during `create_task` lives in that call's stack
/// frame and is released before it returns, whatever the outcome.
pub struct TaskRegistrar<'c, S: SchedulerSubsystem> {
    connection: &'c SchedulerConnection<S>,
    config: SchedConfig,
    fail_origin: FailOrigin,
}

impl<'c, S: SchedulerSubsystem> TaskRegistrar<'c, S> {
    pub fn new(connection: &'c SchedulerConnection<S>, config: SchedConfig) -> Self {
        TaskRegistrar {
            connection,
            config,
            fail_origin: FailOrigin::NoError,
        }
    }

    /// Step at which the last `create_task` failed, or `NoError`.
    pub fn fail_origin(&self) -> FailOrigin {
        self.fail_origin
    }

    pub fn create_task(
        &mut self,
        executable: &str,
        arguments: &str,
        task_name: &str,
        delay_seconds: u32,
    ) -> Result<TriggerWindow, SchedError> {
        let result = self.register_task(executable, arguments, task_name, delay_seconds);

        self.fail_origin = match &result {
            Ok(window) => {
                info!(
                    "[SCHED] Registered task '{}' -> {} {} (window {} .. {})",
                    task_name,
                    executable,
                    arguments,
                    window.start_boundary(),
                    window.end_boundary()
                );
                FailOrigin::NoError
            }
            Err(err) => {
                warn!("[SCHED] Task '{}' not registered: {}", task_name, err);
                err.origin
            }
        };
        result
    }

    fn register_task(
        &self,
        executable: &str,
        arguments: &str,
        task_name: &str,
        delay_seconds: u32,
    ) -> Result<TriggerWindow, SchedError> {
        let service = self
            .connection
            .service()
            .ok_or_else(SchedError::invalid_object)?;

        if executable.is_empty() || task_name.is_empty() || delay_seconds == 0 {
            return Err(SchedError::invalid_args());
        }

        debug!("[SCHED] Connecting to task service");
        service.connect().map_err(at(FailOrigin::Connect))?;

        let folder = service
            .folder(&self.config.folder)
            .map_err(at(FailOrigin::GetFolder))?;

        match folder.delete_task(task_name) {
            Ok(()) => debug!("[SCHED] Removed previous task '{}'", task_name),
            Err(code) if code.is_not_found() => {
                warn!("[SCHED] No previous task '{}' to remove", task_name)
            }
            Err(code) => return Err(SchedError::new(FailOrigin::DeleteTask, code)),
        }

        let definition = service.new_task().map_err(at(FailOrigin::NewTask))?;

        let registration = definition
            .registration_info()
            .map_err(at(FailOrigin::GetRegistrationInfo))?;
        registration
            .set_author(&self.config.author)
            .map_err(at(FailOrigin::PutAuthor))?;

        let principal = definition
            .principal()
            .map_err(at(FailOrigin::GetPrincipal))?;
        principal
            .set_logon_type(LogonType::InteractiveToken)
            .map_err(at(FailOrigin::PutLogonType))?;

        let settings = definition.settings().map_err(at(FailOrigin::GetSettings))?;
        settings
            .set_start_when_available(true)
            .map_err(at(FailOrigin::PutStartWhenAvailable))?;

        // No effect on a time trigger, but part of the expected task layout.
        if let Some(timeout) = &self.config.idle_wait_timeout {
            let idle = settings
                .idle_settings()
                .map_err(at(FailOrigin::GetIdleSettings))?;
            idle.set_wait_timeout(timeout)
                .map_err(at(FailOrigin::PutWaitTimeout))?;
        }

        let triggers = definition.triggers().map_err(at(FailOrigin::GetTriggers))?;
        let trigger = triggers
            .create(TriggerKind::Time)
            .map_err(at(FailOrigin::CreateTrigger))?;
        let time_trigger = trigger
            .as_time_trigger()
            .map_err(at(FailOrigin::QueryInterfaceTT))?;
        time_trigger
            .set_id(&self.config.trigger_id)
            .map_err(at(FailOrigin::PutId))?;

        let window =
            TriggerWindow::starting_after(Utc::now(), delay_seconds, self.config.window_seconds);
        time_trigger
            .set_start_boundary(&window.start_boundary())
            .map_err(at(FailOrigin::PutStartBoundary))?;
        time_trigger
            .set_end_boundary(&window.end_boundary())
            .map_err(at(FailOrigin::PutEndBoundary))?;

        let actions = definition.actions().map_err(at(FailOrigin::GetActions))?;
        let action = actions
            .create(ActionKind::Exec)
            .map_err(at(FailOrigin::CreateAction))?;
        let exec = action
            .as_exec_action()
            .map_err(at(FailOrigin::QueryInterfaceEA))?;
        exec.set_path(executable).map_err(at(FailOrigin::PutPath))?;
        exec.set_arguments(arguments)
            .map_err(at(FailOrigin::PutArguments))?;

        let _registered = folder
            .register(task_name, &definition, LogonType::InteractiveToken, "")
            .map_err(at(FailOrigin::RegisterTask))?;

        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::InMemoryScheduler;
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use std::sync::{Mutex, Once};

    struct Captured;

    static RECORDS: Mutex<Vec<(Level, String)>> = Mutex::new(Vec::new());
    static CAPTURE: Captured = Captured;
    static INSTALL: Once = Once::new();

    impl Log for Captured {
        fn enabled(&self, _: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            if let Ok(mut records) = RECORDS.lock() {
                records.push((record.level(), record.args().to_string()));
            }
        }

        fn flush(&self) {}
    }

    fn capture_logs() {
        INSTALL.call_once(|| {
            log::set_logger(&CAPTURE).unwrap();
            log::set_max_level(LevelFilter::Trace);
        });
    }

    fn levels_mentioning(text: &str) -> Vec<Level> {
        RECORDS
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, message)| message.contains(text))
            .map(|(level, _)| *level)
            .collect()
    }

    fn ready(scheduler: &InMemoryScheduler) -> SchedulerConnection<InMemoryScheduler> {
        let mut connection = SchedulerConnection::new(scheduler.clone());
        connection.init().unwrap();
        connection
    }

    #[test]
    fn records_no_error_on_success() {
        let scheduler = InMemoryScheduler::new();
        let connection = ready(&scheduler);
        let mut registrar = TaskRegistrar::new(&connection, SchedConfig::default());

        registrar
            .create_task("C:\\tools\\run.exe", "", "PMTask", 5)
            .unwrap();

        assert_eq!(registrar.fail_origin(), FailOrigin::NoError);
        assert!(scheduler.task("PMTask").is_some());
    }

    #[test]
    fn missing_previous_task_is_tolerated_with_a_warning() {
        capture_logs();
        let scheduler = InMemoryScheduler::new();
        let connection = ready(&scheduler);
        let mut registrar = TaskRegistrar::new(&connection, SchedConfig::default());

        registrar
            .create_task("a.exe", "", "NeverRegisteredBefore", 5)
            .unwrap();

        assert!(scheduler.calls().contains(&FailOrigin::DeleteTask));
        assert_eq!(
            levels_mentioning("No previous task 'NeverRegisteredBefore'"),
            vec![Level::Warn]
        );
    }

    #[test]
    fn not_ready_connection_is_invalid_object() {
        let scheduler = InMemoryScheduler::new();
        let connection = SchedulerConnection::new(scheduler.clone());
        let mut registrar = TaskRegistrar::new(&connection, SchedConfig::default());

        let err = registrar
            .create_task("C:\\tools\\run.exe", "", "PMTask", 5)
            .unwrap_err();

        assert_eq!(err.origin, FailOrigin::InvalidObject);
        assert_eq!(registrar.fail_origin(), FailOrigin::InvalidObject);
        assert!(scheduler.calls().is_empty());
    }

    #[test]
    fn invalid_object_wins_over_invalid_args() {
        let scheduler = InMemoryScheduler::new();
        let connection = SchedulerConnection::new(scheduler);
        let mut registrar = TaskRegistrar::new(&connection, SchedConfig::default());

        let err = registrar.create_task("", "", "", 0).unwrap_err();
        assert_eq!(err.origin, FailOrigin::InvalidObject);
    }

    #[test]
    fn failure_then_success_resets_fail_origin() {
        let scheduler = InMemoryScheduler::failing_at(FailOrigin::PutPath);
        let connection = ready(&scheduler);
        let mut registrar = TaskRegistrar::new(&connection, SchedConfig::default());

        assert!(registrar.create_task("a.exe", "", "PMTask", 1).is_err());
        assert_eq!(registrar.fail_origin(), FailOrigin::PutPath);

        scheduler.inject_failure(None);
        registrar.create_task("a.exe", "", "PMTask", 1).unwrap();
        assert_eq!(registrar.fail_origin(), FailOrigin::NoError);
    }

    #[test]
    fn disabled_idle_wait_skips_idle_steps() {
        let scheduler = InMemoryScheduler::failing_at(FailOrigin::GetIdleSettings);
        let connection = ready(&scheduler);
        let config = SchedConfig {
            idle_wait_timeout: None,
            ..SchedConfig::default()
        };
        let mut registrar = TaskRegistrar::new(&connection, config);

        registrar.create_task("a.exe", "", "PMTask", 1).unwrap();

        let calls = scheduler.calls();
        assert!(!calls.contains(&FailOrigin::GetIdleSettings));
        assert!(!calls.contains(&FailOrigin::PutWaitTimeout));
        let task = scheduler.task("PMTask").unwrap();
        assert_eq!(task.definition.idle_wait_timeout, None);
    }

    #[test]
    fn configured_values_reach_the_definition() {
        let scheduler = InMemoryScheduler::new();
        let connection = ready(&scheduler);
        let config = SchedConfig {
            author: "ops".to_string(),
            trigger_id: "OpsTrigger".to_string(),
            window_seconds: 60,
            ..SchedConfig::default()
        };
        let mut registrar = TaskRegistrar::new(&connection, config);

        let window = registrar.create_task("a.exe", "-q", "Ops", 10).unwrap();

        let task = scheduler.task("Ops").unwrap();
        assert_eq!(task.definition.author.as_deref(), Some("ops"));
        assert_eq!(task.definition.trigger_id.as_deref(), Some("OpsTrigger"));
        assert_eq!((window.end - window.start).num_seconds(), 60);
    }
}
