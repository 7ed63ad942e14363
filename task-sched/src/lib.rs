//! One-shot program scheduling through the OS task scheduler.
//!
//! [`SchedulerConnection`] owns the link to the scheduling subsystem and
//! [`TaskRegistrar`] builds and registers a task with a single time
//! trigger and a single exec action. Both run against any
//! [`SchedulerSubsystem`]: [`com::ComSubsystem`] on Windows, or
//! [`mock::InMemoryScheduler`] for fault-injection tests.

pub mod backend;
#[cfg(windows)]
pub mod com;
pub mod config;
pub mod connection;
pub mod error;
pub mod fail_origin;
pub mod mock;
pub mod registrar;
pub mod request;
pub mod window;

pub use backend::SchedulerSubsystem;
pub use config::SchedConfig;
pub use connection::{ConnectionState, SchedulerConnection};
pub use error::{Hresult, SchedError, StepResult};
pub use fail_origin::FailOrigin;
pub use registrar::TaskRegistrar;
pub use request::{parse_delay, TaskRequest};
pub use window::TriggerWindow;

/// Connect, register `request`, and tear the connection down again.
pub fn schedule_once<S: SchedulerSubsystem>(
    subsystem: S,
    request: &TaskRequest,
    config: &SchedConfig,
) -> Result<TriggerWindow, SchedError> {
    let mut connection = SchedulerConnection::new(subsystem);
    connection.init()?;

    let result = TaskRegistrar::new(&connection, config.clone()).create_task(
        &request.executable,
        &request.arguments,
        &request.task_name,
        request.delay_seconds,
    );

    connection.term();
    result
}
