//! Step interface of the task scheduling subsystem.
//!
//! Each trait mirrors one scheduler object. Associated types are the
//! handles a call hands back; a handle releases its subsystem reference
//! when dropped, so whatever a caller acquired is released on every exit
//! path. `com` implements these traits against the Windows Task Scheduler,
//! `mock` against an in-memory registry with fault injection.

use crate::error::StepResult;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogonType {
    /// Run with the interactive logon token of the registering user.
    InteractiveToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TriggerKind {
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActionKind {
    Exec,
}

/// Process-wide subsystem setup: threading model, service object, security.
pub trait SchedulerSubsystem {
    type Service: TaskService;

    /// Select the multi-threaded apartment for this thread.
    fn start(&mut self) -> StepResult<()>;
    fn create_service(&mut self) -> StepResult<Self::Service>;
    fn init_security(&mut self) -> StepResult<()>;
    /// Undo a successful `start`.
    fn stop(&mut self);
}

pub trait TaskService {
    type Folder: TaskFolder<Definition = Self::Definition>;
    type Definition: TaskDefinition;

    fn connect(&self) -> StepResult<()>;
    fn folder(&self, path: &str) -> StepResult<Self::Folder>;
    fn new_task(&self) -> StepResult<Self::Definition>;
}

pub trait TaskFolder {
    type Definition;
    type Registered;

    fn delete_task(&self, name: &str) -> StepResult<()>;
    fn register(
        &self,
        name: &str,
        definition: &Self::Definition,
        logon: LogonType,
        password: &str,
    ) -> StepResult<Self::Registered>;
}

pub trait TaskDefinition {
    type RegistrationInfo: RegistrationInfo;
    type Principal: Principal;
    type Settings: TaskSettings;
    type Triggers: TriggerCollection;
    type Actions: ActionCollection;

    fn registration_info(&self) -> StepResult<Self::RegistrationInfo>;
    fn principal(&self) -> StepResult<Self::Principal>;
    fn settings(&self) -> StepResult<Self::Settings>;
    fn triggers(&self) -> StepResult<Self::Triggers>;
    fn actions(&self) -> StepResult<Self::Actions>;
}

pub trait RegistrationInfo {
    fn set_author(&self, author: &str) -> StepResult<()>;
}

pub trait Principal {
    fn set_logon_type(&self, logon: LogonType) -> StepResult<()>;
}

pub trait TaskSettings {
    type Idle: IdleSettings;

    fn set_start_when_available(&self, enabled: bool) -> StepResult<()>;
    fn idle_settings(&self) -> StepResult<Self::Idle>;
}

pub trait IdleSettings {
    /// ISO 8601 duration, e.g. `PT5M`.
    fn set_wait_timeout(&self, timeout: &str) -> StepResult<()>;
}

pub trait TriggerCollection {
    type Trigger: Trigger;

    fn create(&self, kind: TriggerKind) -> StepResult<Self::Trigger>;
}

pub trait Trigger {
    type Time: TimeTrigger;

    fn as_time_trigger(&self) -> StepResult<Self::Time>;
}

pub trait TimeTrigger {
    fn set_id(&self, id: &str) -> StepResult<()>;
    fn set_start_boundary(&self, boundary: &str) -> StepResult<()>;
    fn set_end_boundary(&self, boundary: &str) -> StepResult<()>;
}

pub trait ActionCollection {
    type Action: Action;

    fn create(&self, kind: ActionKind) -> StepResult<Self::Action>;
}

pub trait Action {
    type Exec: ExecAction;

    fn as_exec_action(&self) -> StepResult<Self::Exec>;
}

pub trait ExecAction {
    fn set_path(&self, path: &str) -> StepResult<()>;
    fn set_arguments(&self, arguments: &str) -> StepResult<()>;
}
