// Windows Task Scheduler 2.0 over COM.

use crate::backend::{
    Action, ActionCollection, ActionKind, ExecAction, IdleSettings, LogonType, Principal,
    RegistrationInfo, SchedulerSubsystem, TaskDefinition, TaskFolder, TaskService, TaskSettings,
    TimeTrigger, Trigger, TriggerCollection, TriggerKind,
};
use crate::error::{Hresult, StepResult};
use std::ffi::OsStr;
use std::ops::Deref;
use std::os::windows::ffi::OsStrExt;
use std::ptr::{self, NonNull};
use winapi::ctypes::c_void;
use winapi::shared::guiddef::GUID;
use winapi::shared::minwindef::LPVOID;
use winapi::shared::ntdef::{HRESULT, LONG};
use winapi::shared::rpcdce::{RPC_C_AUTHN_LEVEL_PKT_PRIVACY, RPC_C_IMP_LEVEL_IMPERSONATE};
use winapi::shared::wtypes::{BSTR, VARIANT_FALSE, VARIANT_TRUE, VARTYPE, VT_BSTR};
use winapi::shared::wtypesbase::CLSCTX_INPROC_SERVER;
use winapi::um::combaseapi::{
    CoCreateInstance, CoInitializeEx, CoInitializeSecurity, CoUninitialize,
};
use winapi::um::oaidl::VARIANT;
use winapi::um::objbase::COINIT_MULTITHREADED;
use winapi::um::oleauto::{SysAllocString, SysFreeString};
use winapi::um::taskschd::{
    IAction, IActionCollection, IExecAction, IIdleSettings, IPrincipal, IRegisteredTask,
    IRegistrationInfo, ITaskDefinition, ITaskFolder, ITaskService, ITaskSettings, ITimeTrigger,
    ITrigger, ITriggerCollection, TASK_ACTION_EXEC, TASK_CREATE_OR_UPDATE,
    TASK_LOGON_INTERACTIVE_TOKEN, TASK_LOGON_TYPE, TASK_TRIGGER_TIME,
};
use winapi::um::unknwnbase::IUnknown;
use winapi::Interface;

// CLSID_TaskScheduler {0F87369F-A4E5-4CFC-BD3E-73E6154572DD}
// Defined here since winapi only exposes the interfaces.
const CLSID_TASK_SCHEDULER: GUID = GUID {
    Data1: 0x0F87369F,
    Data2: 0xA4E5,
    Data3: 0x4CFC,
    Data4: [0xBD, 0x3E, 0x73, 0xE6, 0x15, 0x45, 0x72, 0xDD],
};

// dwCapabilities for CoInitializeSecurity
const EOAC_NONE: u32 = 0;

/// Owned COM interface pointer. Released on drop.
pub struct ComHandle<T: Interface> {
    ptr: NonNull<T>,
}

impl<T: Interface> ComHandle<T> {
    fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    fn unknown(&self) -> &IUnknown {
        unsafe { &*(self.ptr.as_ptr() as *const IUnknown) }
    }

    fn query<U: Interface>(&self) -> StepResult<ComHandle<U>> {
        acquire(|out: *mut *mut U| unsafe {
            self.unknown()
                .QueryInterface(&U::uuidof(), out as *mut *mut c_void)
        })
    }
}

impl<T: Interface> Deref for ComHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: Interface> Drop for ComHandle<T> {
    fn drop(&mut self) {
        unsafe {
            self.unknown().Release();
        }
    }
}

/// Run a call that hands back an interface through an out pointer.
fn acquire<T: Interface>(
    call: impl FnOnce(*mut *mut T) -> HRESULT,
) -> StepResult<ComHandle<T>> {
    let mut raw: *mut T = ptr::null_mut();
    Hresult(call(&mut raw)).check()?;
    NonNull::new(raw)
        .map(|ptr| ComHandle { ptr })
        .ok_or(Hresult::E_POINTER)
}

fn status(hr: HRESULT) -> StepResult<()> {
    Hresult(hr).check()
}

struct Bstr(BSTR);

impl Bstr {
    fn new(text: &str) -> StepResult<Self> {
        let wide: Vec<u16> = OsStr::new(text)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        let raw = unsafe { SysAllocString(wide.as_ptr()) };
        if raw.is_null() {
            Err(Hresult::E_OUTOFMEMORY)
        } else {
            Ok(Bstr(raw))
        }
    }
}

impl Drop for Bstr {
    fn drop(&mut self) {
        unsafe { SysFreeString(self.0) }
    }
}

fn empty_variant() -> VARIANT {
    // VT_EMPTY is all zeroes
    unsafe { std::mem::zeroed() }
}

// The variant borrows the string; `text` must outlive the call it is passed to.
fn bstr_variant(text: &Bstr) -> VARIANT {
    let mut variant = empty_variant();
    unsafe {
        let inner = variant.n1.n2_mut();
        inner.vt = VT_BSTR as VARTYPE;
        *inner.n3.bstrVal_mut() = text.0;
    }
    variant
}

fn logon_type(logon: LogonType) -> TASK_LOGON_TYPE {
    match logon {
        LogonType::InteractiveToken => TASK_LOGON_INTERACTIVE_TOKEN,
    }
}

/// COM runtime on the calling thread plus the Task Scheduler service.
#[derive(Debug, Default)]
pub struct ComSubsystem;

impl SchedulerSubsystem for ComSubsystem {
    type Service = ComHandle<ITaskService>;

    fn start(&mut self) -> StepResult<()> {
        status(unsafe { CoInitializeEx(ptr::null_mut(), COINIT_MULTITHREADED) })
    }

    fn create_service(&mut self) -> StepResult<Self::Service> {
        acquire(|out: *mut *mut ITaskService| unsafe {
            CoCreateInstance(
                &CLSID_TASK_SCHEDULER,
                ptr::null_mut(),
                CLSCTX_INPROC_SERVER,
                &ITaskService::uuidof(),
                out as *mut LPVOID,
            )
        })
    }

    fn init_security(&mut self) -> StepResult<()> {
        status(unsafe {
            CoInitializeSecurity(
                ptr::null_mut(),
                -1,
                ptr::null_mut(),
                ptr::null_mut(),
                RPC_C_AUTHN_LEVEL_PKT_PRIVACY,
                RPC_C_IMP_LEVEL_IMPERSONATE,
                ptr::null_mut(),
                EOAC_NONE,
                ptr::null_mut(),
            )
        })
    }

    fn stop(&mut self) {
        unsafe { CoUninitialize() }
    }
}

impl TaskService for ComHandle<ITaskService> {
    type Folder = ComHandle<ITaskFolder>;
    type Definition = ComHandle<ITaskDefinition>;

    fn connect(&self) -> StepResult<()> {
        // Local machine, current user
        status(unsafe {
            self.Connect(
                empty_variant(),
                empty_variant(),
                empty_variant(),
                empty_variant(),
            )
        })
    }

    fn folder(&self, path: &str) -> StepResult<Self::Folder> {
        let path = Bstr::new(path)?;
        acquire(|out| unsafe { self.GetFolder(path.0, out) })
    }

    fn new_task(&self) -> StepResult<Self::Definition> {
        acquire(|out| unsafe { self.NewTask(0, out) })
    }
}

impl TaskFolder for ComHandle<ITaskFolder> {
    type Definition = ComHandle<ITaskDefinition>;
    type Registered = ComHandle<IRegisteredTask>;

    fn delete_task(&self, name: &str) -> StepResult<()> {
        let name = Bstr::new(name)?;
        status(unsafe { self.DeleteTask(name.0, 0) })
    }

    fn register(
        &self,
        name: &str,
        definition: &Self::Definition,
        logon: LogonType,
        password: &str,
    ) -> StepResult<Self::Registered> {
        let name = Bstr::new(name)?;
        let password = Bstr::new(password)?;
        acquire(|out| unsafe {
            self.RegisterTaskDefinition(
                name.0,
                definition.as_ptr(),
                TASK_CREATE_OR_UPDATE as LONG,
                empty_variant(),
                bstr_variant(&password),
                logon_type(logon),
                empty_variant(),
                out,
            )
        })
    }
}

impl TaskDefinition for ComHandle<ITaskDefinition> {
    type RegistrationInfo = ComHandle<IRegistrationInfo>;
    type Principal = ComHandle<IPrincipal>;
    type Settings = ComHandle<ITaskSettings>;
    type Triggers = ComHandle<ITriggerCollection>;
    type Actions = ComHandle<IActionCollection>;

    fn registration_info(&self) -> StepResult<Self::RegistrationInfo> {
        acquire(|out| unsafe { self.get_RegistrationInfo(out) })
    }

    fn principal(&self) -> StepResult<Self::Principal> {
        acquire(|out| unsafe { self.get_Principal(out) })
    }

    fn settings(&self) -> StepResult<Self::Settings> {
        acquire(|out| unsafe { self.get_Settings(out) })
    }

    fn triggers(&self) -> StepResult<Self::Triggers> {
        acquire(|out| unsafe { self.get_Triggers(out) })
    }

    fn actions(&self) -> StepResult<Self::Actions> {
        acquire(|out| unsafe { self.get_Actions(out) })
    }
}

impl RegistrationInfo for ComHandle<IRegistrationInfo> {
    fn set_author(&self, author: &str) -> StepResult<()> {
        let author = Bstr::new(author)?;
        status(unsafe { self.put_Author(author.0) })
    }
}

impl Principal for ComHandle<IPrincipal> {
    fn set_logon_type(&self, logon: LogonType) -> StepResult<()> {
        status(unsafe { self.put_LogonType(logon_type(logon)) })
    }
}

impl TaskSettings for ComHandle<ITaskSettings> {
    type Idle = ComHandle<IIdleSettings>;

    fn set_start_when_available(&self, enabled: bool) -> StepResult<()> {
        let flag = if enabled { VARIANT_TRUE } else { VARIANT_FALSE };
        status(unsafe { self.put_StartWhenAvailable(flag) })
    }

    fn idle_settings(&self) -> StepResult<Self::Idle> {
        acquire(|out| unsafe { self.get_IdleSettings(out) })
    }
}

impl IdleSettings for ComHandle<IIdleSettings> {
    fn set_wait_timeout(&self, timeout: &str) -> StepResult<()> {
        let timeout = Bstr::new(timeout)?;
        status(unsafe { self.put_WaitTimeout(timeout.0) })
    }
}

impl TriggerCollection for ComHandle<ITriggerCollection> {
    type Trigger = ComHandle<ITrigger>;

    fn create(&self, kind: TriggerKind) -> StepResult<Self::Trigger> {
        let kind = match kind {
            TriggerKind::Time => TASK_TRIGGER_TIME,
        };
        acquire(|out| unsafe { self.Create(kind, out) })
    }
}

impl Trigger for ComHandle<ITrigger> {
    type Time = ComHandle<ITimeTrigger>;

    fn as_time_trigger(&self) -> StepResult<Self::Time> {
        self.query::<ITimeTrigger>()
    }
}

impl TimeTrigger for ComHandle<ITimeTrigger> {
    fn set_id(&self, id: &str) -> StepResult<()> {
        let id = Bstr::new(id)?;
        status(unsafe { self.put_Id(id.0) })
    }

    fn set_start_boundary(&self, boundary: &str) -> StepResult<()> {
        let boundary = Bstr::new(boundary)?;
        status(unsafe { self.put_StartBoundary(boundary.0) })
    }

    fn set_end_boundary(&self, boundary: &str) -> StepResult<()> {
        let boundary = Bstr::new(boundary)?;
        status(unsafe { self.put_EndBoundary(boundary.0) })
    }
}

impl ActionCollection for ComHandle<IActionCollection> {
    type Action = ComHandle<IAction>;

    fn create(&self, kind: ActionKind) -> StepResult<Self::Action> {
        let kind = match kind {
            ActionKind::Exec => TASK_ACTION_EXEC,
        };
        acquire(|out| unsafe { self.Create(kind, out) })
    }
}

impl Action for ComHandle<IAction> {
    type Exec = ComHandle<IExecAction>;

    fn as_exec_action(&self) -> StepResult<Self::Exec> {
        self.query::<IExecAction>()
    }
}

impl ExecAction for ComHandle<IExecAction> {
    fn set_path(&self, path: &str) -> StepResult<()> {
        let path = Bstr::new(path)?;
        status(unsafe { self.put_Path(path.0) })
    }

    fn set_arguments(&self, arguments: &str) -> StepResult<()> {
        let arguments = Bstr::new(arguments)?;
        status(unsafe { self.put_Arguments(arguments.0) })
    }
}
