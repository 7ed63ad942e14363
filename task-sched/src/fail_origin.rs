//! Step identifiers for connection setup and task registration.
//!
//! Every call made against the scheduling subsystem has exactly one
//! `FailOrigin`. Callers branch on it to tell which step broke without
//! decoding subsystem status codes.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum FailOrigin {
    NoError,
    // Connection setup
    StartCom,
    CoCreate,
    CoInitSecurity,
    // Preconditions
    InvalidObject,
    InvalidArgs,
    // Task building, in call order
    Connect,
    GetFolder,
    DeleteTask,
    NewTask,
    GetRegistrationInfo,
    PutAuthor,
    GetPrincipal,
    PutLogonType,
    GetSettings,
    PutStartWhenAvailable,
    GetIdleSettings,
    PutWaitTimeout,
    GetTriggers,
    CreateTrigger,
    QueryInterfaceTT,
    PutId,
    PutStartBoundary,
    PutEndBoundary,
    GetActions,
    CreateAction,
    QueryInterfaceEA,
    PutPath,
    PutArguments,
    RegisterTask,
}

impl FailOrigin {
    /// Steps performed by `SchedulerConnection::init`, in order.
    pub const CONNECTION_STEPS: [FailOrigin; 3] = [
        FailOrigin::StartCom,
        FailOrigin::CoCreate,
        FailOrigin::CoInitSecurity,
    ];

    /// Steps performed by `TaskRegistrar::create_task`, in order.
    pub const REGISTRATION_STEPS: [FailOrigin; 24] = [
        FailOrigin::Connect,
        FailOrigin::GetFolder,
        FailOrigin::DeleteTask,
        FailOrigin::NewTask,
        FailOrigin::GetRegistrationInfo,
        FailOrigin::PutAuthor,
        FailOrigin::GetPrincipal,
        FailOrigin::PutLogonType,
        FailOrigin::GetSettings,
        FailOrigin::PutStartWhenAvailable,
        FailOrigin::GetIdleSettings,
        FailOrigin::PutWaitTimeout,
        FailOrigin::GetTriggers,
        FailOrigin::CreateTrigger,
        FailOrigin::QueryInterfaceTT,
        FailOrigin::PutId,
        FailOrigin::PutStartBoundary,
        FailOrigin::PutEndBoundary,
        FailOrigin::GetActions,
        FailOrigin::CreateAction,
        FailOrigin::QueryInterfaceEA,
        FailOrigin::PutPath,
        FailOrigin::PutArguments,
        FailOrigin::RegisterTask,
    ];

    pub fn is_error(self) -> bool {
        self != FailOrigin::NoError
    }

    pub fn name(self) -> &'static str {
        match self {
            FailOrigin::NoError => "NoError",
            FailOrigin::StartCom => "StartCom",
            FailOrigin::CoCreate => "CoCreate",
            FailOrigin::CoInitSecurity => "CoInitSecurity",
            FailOrigin::InvalidObject => "InvalidObject",
            FailOrigin::InvalidArgs => "InvalidArgs",
            FailOrigin::Connect => "Connect",
            FailOrigin::GetFolder => "GetFolder",
            FailOrigin::DeleteTask => "DeleteTask",
            FailOrigin::NewTask => "NewTask",
            FailOrigin::GetRegistrationInfo => "GetRegistrationInfo",
            FailOrigin::PutAuthor => "PutAuthor",
            FailOrigin::GetPrincipal => "GetPrincipal",
            FailOrigin::PutLogonType => "PutLogonType",
            FailOrigin::GetSettings => "GetSettings",
            FailOrigin::PutStartWhenAvailable => "PutStartWhenAvailable",
            FailOrigin::GetIdleSettings => "GetIdleSettings",
            FailOrigin::PutWaitTimeout => "PutWaitTimeout",
            FailOrigin::GetTriggers => "GetTriggers",
            FailOrigin::CreateTrigger => "CreateTrigger",
            FailOrigin::QueryInterfaceTT => "QueryInterfaceTT",
            FailOrigin::PutId => "PutId",
            FailOrigin::PutStartBoundary => "PutStartBoundary",
            FailOrigin::PutEndBoundary => "PutEndBoundary",
            FailOrigin::GetActions => "GetActions",
            FailOrigin::CreateAction => "CreateAction",
            FailOrigin::QueryInterfaceEA => "QueryInterfaceEA",
            FailOrigin::PutPath => "PutPath",
            FailOrigin::PutArguments => "PutArguments",
            FailOrigin::RegisterTask => "RegisterTask",
        }
    }
}

impl fmt::Display for FailOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
