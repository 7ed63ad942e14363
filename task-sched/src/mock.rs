//! In-memory task scheduler.
//!
//! Implements the full step interface without touching the OS. Every call
//! is recorded under its `FailOrigin`, a failure can be injected at any
//! step, and every handle handed out is counted until it is dropped, so
//! tests can check that nothing leaks on any exit path.

use crate::backend::{
    Action, ActionCollection, ActionKind, ExecAction, IdleSettings, LogonType, Principal,
    RegistrationInfo, SchedulerSubsystem, TaskDefinition, TaskFolder, TaskService, TaskSettings,
    TimeTrigger, Trigger, TriggerCollection, TriggerKind,
};
use crate::error::{Hresult, StepResult};
use crate::fail_origin::FailOrigin;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::rc::Rc;

/// Properties set on a task definition while it is being built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DefinitionSnapshot {
    pub author: Option<String>,
    pub logon_type: Option<LogonType>,
    pub start_when_available: bool,
    pub idle_wait_timeout: Option<String>,
    pub trigger_kind: Option<TriggerKind>,
    pub trigger_id: Option<String>,
    pub start_boundary: Option<String>,
    pub end_boundary: Option<String>,
    pub action_kind: Option<ActionKind>,
    pub path: Option<String>,
    pub arguments: Option<String>,
}

/// A task as stored by the in-memory scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredTask {
    pub name: String,
    pub folder: String,
    pub definition: DefinitionSnapshot,
    pub logon_type: LogonType,
    pub password: String,
}

#[derive(Default)]
struct Ledger {
    fail_at: Option<FailOrigin>,
    calls: Vec<FailOrigin>,
    live_handles: usize,
    started: bool,
    stop_count: usize,
    connected: bool,
    tasks: BTreeMap<String, RegisteredTask>,
}

/// Shared view of the in-memory scheduler. Clones see the same state.
#[derive(Clone, Default)]
pub struct InMemoryScheduler {
    ledger: Rc<RefCell<Ledger>>,
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(origin: FailOrigin) -> Self {
        let scheduler = Self::new();
        scheduler.inject_failure(Some(origin));
        scheduler
    }

    /// Make the call for `origin` fail with `E_FAIL`. `None` clears it.
    pub fn inject_failure(&self, origin: Option<FailOrigin>) {
        self.ledger.borrow_mut().fail_at = origin;
    }

    /// Every step attempted so far, in order.
    pub fn calls(&self) -> Vec<FailOrigin> {
        self.ledger.borrow().calls.clone()
    }

    pub fn live_handles(&self) -> usize {
        self.ledger.borrow().live_handles
    }

    pub fn is_started(&self) -> bool {
        self.ledger.borrow().started
    }

    pub fn stop_count(&self) -> usize {
        self.ledger.borrow().stop_count
    }

    pub fn task(&self, name: &str) -> Option<RegisteredTask> {
        self.ledger.borrow().tasks.get(name).cloned()
    }

    pub fn task_names(&self) -> Vec<String> {
        self.ledger.borrow().tasks.keys().cloned().collect()
    }

    /// Place a task in the registry as if registered by someone else.
    pub fn seed_task(&self, task: RegisteredTask) {
        self.ledger.borrow_mut().tasks.insert(task.name.clone(), task);
    }

    fn step(&self, origin: FailOrigin) -> StepResult<()> {
        let mut ledger = self.ledger.borrow_mut();
        ledger.calls.push(origin);
        if ledger.fail_at == Some(origin) {
            Err(Hresult::E_FAIL)
        } else {
            Ok(())
        }
    }

    fn handle<K>(&self, draft: &Rc<RefCell<DefinitionSnapshot>>) -> MockHandle<K> {
        self.ledger.borrow_mut().live_handles += 1;
        MockHandle {
            scheduler: self.clone(),
            draft: Rc::clone(draft),
            _kind: PhantomData,
        }
    }

    fn acquire<K>(
        &self,
        origin: FailOrigin,
        draft: &Rc<RefCell<DefinitionSnapshot>>,
    ) -> StepResult<MockHandle<K>> {
        self.step(origin)?;
        Ok(self.handle(draft))
    }
}

impl SchedulerSubsystem for InMemoryScheduler {
    type Service = MockHandle<ServiceKind>;

    fn start(&mut self) -> StepResult<()> {
        self.step(FailOrigin::StartCom)?;
        self.ledger.borrow_mut().started = true;
        Ok(())
    }

    fn create_service(&mut self) -> StepResult<Self::Service> {
        self.acquire(FailOrigin::CoCreate, &Rc::default())
    }

    fn init_security(&mut self) -> StepResult<()> {
        self.step(FailOrigin::CoInitSecurity)
    }

    fn stop(&mut self) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.started = false;
        ledger.connected = false;
        ledger.stop_count += 1;
    }
}

// Handle kinds
pub enum ServiceKind {}
pub enum FolderKind {}
pub enum DefinitionKind {}
pub enum RegistrationInfoKind {}
pub enum PrincipalKind {}
pub enum SettingsKind {}
pub enum IdleSettingsKind {}
pub enum TriggersKind {}
pub enum TriggerKindHandle {}
pub enum TimeTriggerKind {}
pub enum ActionsKind {}
pub enum ActionKindHandle {}
pub enum ExecActionKind {}
pub enum RegisteredKind {}

/// A counted reference to an in-memory scheduler object.
pub struct MockHandle<K> {
    scheduler: InMemoryScheduler,
    draft: Rc<RefCell<DefinitionSnapshot>>,
    _kind: PhantomData<K>,
}

impl<K> MockHandle<K> {
    fn child<C>(&self, origin: FailOrigin) -> StepResult<MockHandle<C>> {
        self.scheduler.acquire(origin, &self.draft)
    }

    fn set(
        &self,
        origin: FailOrigin,
        apply: impl FnOnce(&mut DefinitionSnapshot),
    ) -> StepResult<()> {
        self.scheduler.step(origin)?;
        apply(&mut *self.draft.borrow_mut());
        Ok(())
    }
}

impl<K> Drop for MockHandle<K> {
    fn drop(&mut self) {
        self.scheduler.ledger.borrow_mut().live_handles -= 1;
    }
}

impl TaskService for MockHandle<ServiceKind> {
    type Folder = MockHandle<FolderKind>;
    type Definition = MockHandle<DefinitionKind>;

    fn connect(&self) -> StepResult<()> {
        self.scheduler.step(FailOrigin::Connect)?;
        self.scheduler.ledger.borrow_mut().connected = true;
        Ok(())
    }

    fn folder(&self, path: &str) -> StepResult<Self::Folder> {
        self.scheduler.step(FailOrigin::GetFolder)?;
        if !self.scheduler.ledger.borrow().connected {
            return Err(Hresult::E_FAIL);
        }
        if path != "\\" {
            return Err(Hresult::FILE_NOT_FOUND);
        }
        Ok(self.scheduler.handle(&self.draft))
    }

    fn new_task(&self) -> StepResult<Self::Definition> {
        // Each definition starts from an empty draft.
        self.scheduler.acquire(FailOrigin::NewTask, &Rc::default())
    }
}

impl TaskFolder for MockHandle<FolderKind> {
    type Definition = MockHandle<DefinitionKind>;
    type Registered = MockHandle<RegisteredKind>;

    fn delete_task(&self, name: &str) -> StepResult<()> {
        self.scheduler.step(FailOrigin::DeleteTask)?;
        match self.scheduler.ledger.borrow_mut().tasks.remove(name) {
            Some(_) => Ok(()),
            None => Err(Hresult::FILE_NOT_FOUND),
        }
    }

    fn register(
        &self,
        name: &str,
        definition: &Self::Definition,
        logon: LogonType,
        password: &str,
    ) -> StepResult<Self::Registered> {
        self.scheduler.step(FailOrigin::RegisterTask)?;

        let snapshot = definition.draft.borrow().clone();
        // The service rejects definitions without a trigger or action.
        if snapshot.trigger_kind.is_none() || snapshot.path.is_none() {
            return Err(Hresult::E_INVALIDARG);
        }

        let task = RegisteredTask {
            name: name.to_string(),
            folder: "\\".to_string(),
            definition: snapshot,
            logon_type: logon,
            password: password.to_string(),
        };
        self.scheduler.seed_task(task);
        Ok(self.scheduler.handle(&definition.draft))
    }
}

impl TaskDefinition for MockHandle<DefinitionKind> {
    type RegistrationInfo = MockHandle<RegistrationInfoKind>;
    type Principal = MockHandle<PrincipalKind>;
    type Settings = MockHandle<SettingsKind>;
    type Triggers = MockHandle<TriggersKind>;
    type Actions = MockHandle<ActionsKind>;

    fn registration_info(&self) -> StepResult<Self::RegistrationInfo> {
        self.child(FailOrigin::GetRegistrationInfo)
    }

    fn principal(&self) -> StepResult<Self::Principal> {
        self.child(FailOrigin::GetPrincipal)
    }

    fn settings(&self) -> StepResult<Self::Settings> {
        self.child(FailOrigin::GetSettings)
    }

    fn triggers(&self) -> StepResult<Self::Triggers> {
        self.child(FailOrigin::GetTriggers)
    }

    fn actions(&self) -> StepResult<Self::Actions> {
        self.child(FailOrigin::GetActions)
    }
}

impl RegistrationInfo for MockHandle<RegistrationInfoKind> {
    fn set_author(&self, author: &str) -> StepResult<()> {
        self.set(FailOrigin::PutAuthor, |d| d.author = Some(author.to_string()))
    }
}

impl Principal for MockHandle<PrincipalKind> {
    fn set_logon_type(&self, logon: LogonType) -> StepResult<()> {
        self.set(FailOrigin::PutLogonType, |d| d.logon_type = Some(logon))
    }
}

impl TaskSettings for MockHandle<SettingsKind> {
    type Idle = MockHandle<IdleSettingsKind>;

    fn set_start_when_available(&self, enabled: bool) -> StepResult<()> {
        self.set(FailOrigin::PutStartWhenAvailable, |d| {
            d.start_when_available = enabled
        })
    }

    fn idle_settings(&self) -> StepResult<Self::Idle> {
        self.child(FailOrigin::GetIdleSettings)
    }
}

impl IdleSettings for MockHandle<IdleSettingsKind> {
    fn set_wait_timeout(&self, timeout: &str) -> StepResult<()> {
        self.set(FailOrigin::PutWaitTimeout, |d| {
            d.idle_wait_timeout = Some(timeout.to_string())
        })
    }
}

impl TriggerCollection for MockHandle<TriggersKind> {
    type Trigger = MockHandle<TriggerKindHandle>;

    fn create(&self, kind: TriggerKind) -> StepResult<Self::Trigger> {
        let trigger = self.child(FailOrigin::CreateTrigger)?;
        self.draft.borrow_mut().trigger_kind = Some(kind);
        Ok(trigger)
    }
}

impl Trigger for MockHandle<TriggerKindHandle> {
    type Time = MockHandle<TimeTriggerKind>;

    fn as_time_trigger(&self) -> StepResult<Self::Time> {
        self.scheduler.step(FailOrigin::QueryInterfaceTT)?;
        if self.draft.borrow().trigger_kind != Some(TriggerKind::Time) {
            return Err(Hresult::E_NOINTERFACE);
        }
        Ok(self.scheduler.handle(&self.draft))
    }
}

impl TimeTrigger for MockHandle<TimeTriggerKind> {
    fn set_id(&self, id: &str) -> StepResult<()> {
        self.set(FailOrigin::PutId, |d| d.trigger_id = Some(id.to_string()))
    }

    fn set_start_boundary(&self, boundary: &str) -> StepResult<()> {
        self.set(FailOrigin::PutStartBoundary, |d| {
            d.start_boundary = Some(boundary.to_string())
        })
    }

    fn set_end_boundary(&self, boundary: &str) -> StepResult<()> {
        self.set(FailOrigin::PutEndBoundary, |d| {
            d.end_boundary = Some(boundary.to_string())
        })
    }
}

impl ActionCollection for MockHandle<ActionsKind> {
    type Action = MockHandle<ActionKindHandle>;

    fn create(&self, kind: ActionKind) -> StepResult<Self::Action> {
        let action = self.child(FailOrigin::CreateAction)?;
        self.draft.borrow_mut().action_kind = Some(kind);
        Ok(action)
    }
}

impl Action for MockHandle<ActionKindHandle> {
    type Exec = MockHandle<ExecActionKind>;

    fn as_exec_action(&self) -> StepResult<Self::Exec> {
        self.child(FailOrigin::QueryInterfaceEA)
    }
}

impl ExecAction for MockHandle<ExecActionKind> {
    fn set_path(&self, path: &str) -> StepResult<()> {
        self.set(FailOrigin::PutPath, |d| d.path = Some(path.to_string()))
    }

    fn set_arguments(&self, arguments: &str) -> StepResult<()> {
        self.set(FailOrigin::PutArguments, |d| {
            d.arguments = Some(arguments.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_counted_until_dropped() {
        let mut scheduler = InMemoryScheduler::new();
        let service = scheduler.create_service().unwrap();
        service.connect().unwrap();
        let folder = service.folder("\\").unwrap();
        assert_eq!(scheduler.live_handles(), 2);

        drop(folder);
        drop(service);
        assert_eq!(scheduler.live_handles(), 0);
    }

    #[test]
    fn folder_requires_connect() {
        let mut scheduler = InMemoryScheduler::new();
        let service = scheduler.create_service().unwrap();

        assert_eq!(service.folder("\\").err(), Some(Hresult::E_FAIL));
        assert_eq!(scheduler.live_handles(), 1);
    }

    #[test]
    fn deleting_a_missing_task_reports_not_found() {
        let mut scheduler = InMemoryScheduler::new();
        let service = scheduler.create_service().unwrap();
        service.connect().unwrap();
        let folder = service.folder("\\").unwrap();

        assert_eq!(folder.delete_task("nope"), Err(Hresult::FILE_NOT_FOUND));
    }

    #[test]
    fn injected_failure_hits_only_its_step() {
        let scheduler = InMemoryScheduler::failing_at(FailOrigin::Connect);
        let mut subsystem = scheduler.clone();

        subsystem.start().unwrap();
        let service = subsystem.create_service().unwrap();
        assert_eq!(service.connect(), Err(Hresult::E_FAIL));
        assert_eq!(
            scheduler.calls(),
            vec![FailOrigin::StartCom, FailOrigin::CoCreate, FailOrigin::Connect]
        );
    }

    #[test]
    fn incomplete_definitions_are_rejected() {
        let mut scheduler = InMemoryScheduler::new();
        let service = scheduler.create_service().unwrap();
        service.connect().unwrap();
        let folder = service.folder("\\").unwrap();
        let definition = service.new_task().unwrap();

        let result = folder.register("Empty", &definition, LogonType::InteractiveToken, "");
        assert_eq!(result.err(), Some(Hresult::E_INVALIDARG));
        assert!(scheduler.task_names().is_empty());
    }
}
