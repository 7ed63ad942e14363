use crate::fail_origin::FailOrigin;
use serde::Serialize;
use std::fmt;

/// Raw status returned by a scheduler call. Negative values are failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Hresult(pub i32);

impl Hresult {
    pub const S_OK: Hresult = Hresult(0);
    pub const E_FAIL: Hresult = Hresult(0x8000_4005_u32 as i32);
    pub const E_NOINTERFACE: Hresult = Hresult(0x8000_4002_u32 as i32);
    pub const E_POINTER: Hresult = Hresult(0x8000_4003_u32 as i32);
    pub const E_INVALIDARG: Hresult = Hresult(0x8007_0057_u32 as i32);
    pub const E_OUTOFMEMORY: Hresult = Hresult(0x8007_000E_u32 as i32);
    // HRESULT_FROM_WIN32(ERROR_FILE_NOT_FOUND)
    pub const FILE_NOT_FOUND: Hresult = Hresult(0x8007_0002_u32 as i32);

    pub fn failed(self) -> bool {
        self.0 < 0
    }

    pub fn is_not_found(self) -> bool {
        self == Hresult::FILE_NOT_FOUND
    }

    pub fn check(self) -> StepResult<()> {
        if self.failed() {
            Err(self)
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for Hresult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0 as u32)
    }
}

/// Outcome of a single subsystem call.
pub type StepResult<T> = Result<T, Hresult>;

/// First failure observed during connection setup or task registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{origin} failed with HRESULT {code}")]
pub struct SchedError {
    pub origin: FailOrigin,
    pub code: Hresult,
}

impl SchedError {
    pub fn new(origin: FailOrigin, code: Hresult) -> Self {
        SchedError { origin, code }
    }

    pub fn invalid_object() -> Self {
        SchedError::new(FailOrigin::InvalidObject, Hresult::E_FAIL)
    }

    pub fn invalid_args() -> Self {
        SchedError::new(FailOrigin::InvalidArgs, Hresult::E_INVALIDARG)
    }
}

/// Tags a failed step with the place it happened.
pub(crate) fn at(origin: FailOrigin) -> impl Fn(Hresult) -> SchedError {
    move |code| SchedError::new(origin, code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_codes_are_failures() {
        assert!(Hresult::E_FAIL.failed());
        assert!(Hresult::FILE_NOT_FOUND.failed());
        assert!(!Hresult::S_OK.failed());
        // S_FALSE still counts as success
        assert!(Hresult(1).check().is_ok());
    }

    #[test]
    fn only_file_not_found_is_not_found() {
        assert!(Hresult::FILE_NOT_FOUND.is_not_found());
        assert!(!Hresult::E_FAIL.is_not_found());
    }

    #[test]
    fn error_message_names_step_and_code() {
        let err = SchedError::new(FailOrigin::DeleteTask, Hresult::E_FAIL);
        assert_eq!(err.to_string(), "DeleteTask failed with HRESULT 0x80004005");
    }
}
