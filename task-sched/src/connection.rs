use crate::backend::SchedulerSubsystem;
use crate::error::{at, SchedError};
use crate::fail_origin::FailOrigin;
use log::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
    TornDown,
}

/// Link to the scheduling subsystem. Torn down on drop.
pub struct SchedulerConnection<S: SchedulerSubsystem> {
    subsystem: S,
    service: Option<S::Service>,
    started: bool,
    state: ConnectionState,
    fail_origin: FailOrigin,
}

impl<S: SchedulerSubsystem> SchedulerConnection<S> {
    pub fn new(subsystem: S) -> Self {
        // Nothing touches the subsystem until init(), so failures can be
        // arranged on the backend beforehand.
        SchedulerConnection {
            subsystem,
            service: None,
            started: false,
            state: ConnectionState::Uninitialized,
            fail_origin: FailOrigin::NoError,
        }
    }

    pub fn init(&mut self) -> Result<(), SchedError> {
        if self.state == ConnectionState::Ready {
            return Ok(());
        }

        self.state = ConnectionState::Initializing;
        match self.bring_up() {
            Ok(()) => {
                self.state = ConnectionState::Ready;
                self.fail_origin = FailOrigin::NoError;
                info!("[SCHED] Connected to task scheduler");
                Ok(())
            }
            Err(err) => {
                warn!("[SCHED] Connection setup failed: {}", err);
                self.fail_origin = err.origin;
                self.term();
                self.state = ConnectionState::Failed;
                Err(err)
            }
        }
    }

    fn bring_up(&mut self) -> Result<(), SchedError> {
        self.subsystem.start().map_err(at(FailOrigin::StartCom))?;
        self.started = true;

        let service = self
            .subsystem
            .create_service()
            .map_err(at(FailOrigin::CoCreate))?;
        self.service = Some(service);

        self.subsystem
            .init_security()
            .map_err(at(FailOrigin::CoInitSecurity))?;
        Ok(())
    }

    /// Release the service, then stop the subsystem. Safe to repeat.
    pub fn term(&mut self) {
        if let Some(service) = self.service.take() {
            debug!("[SCHED] Releasing task service");
            drop(service);
        }
        if self.started {
            debug!("[SCHED] Shutting down subsystem");
            self.subsystem.stop();
            self.started = false;
        }
        if self.state != ConnectionState::Uninitialized {
            self.state = ConnectionState::TornDown;
        }
    }

    pub fn is_valid(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn fail_origin(&self) -> FailOrigin {
        self.fail_origin
    }

    pub(crate) fn service(&self) -> Option<&S::Service> {
        if self.is_valid() {
            self.service.as_ref()
        } else {
            None
        }
    }
}

impl<S: SchedulerSubsystem> Drop for SchedulerConnection<S> {
    fn drop(&mut self) {
        self.term();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::InMemoryScheduler;

    #[test]
    fn init_reaches_ready_and_term_releases_everything() {
        let scheduler = InMemoryScheduler::new();
        let mut connection = SchedulerConnection::new(scheduler.clone());

        connection.init().unwrap();
        assert!(connection.is_valid());
        assert_eq!(connection.fail_origin(), FailOrigin::NoError);
        assert!(scheduler.is_started());
        assert_eq!(scheduler.live_handles(), 1);

        connection.term();
        assert_eq!(connection.state(), ConnectionState::TornDown);
        assert!(!scheduler.is_started());
        assert_eq!(scheduler.live_handles(), 0);
    }

    #[test]
    fn second_term_is_a_no_op() {
        let scheduler = InMemoryScheduler::new();
        let mut connection = SchedulerConnection::new(scheduler.clone());
        connection.init().unwrap();

        connection.term();
        let stops = scheduler.stop_count();
        connection.term();

        assert_eq!(scheduler.stop_count(), stops);
        assert_eq!(connection.state(), ConnectionState::TornDown);
    }

    #[test]
    fn term_on_fresh_connection_touches_nothing() {
        let scheduler = InMemoryScheduler::new();
        let mut connection = SchedulerConnection::new(scheduler.clone());

        connection.term();

        assert_eq!(connection.state(), ConnectionState::Uninitialized);
        assert_eq!(scheduler.stop_count(), 0);
        assert!(scheduler.calls().is_empty());
    }

    #[test]
    fn each_setup_failure_tears_down_and_records_origin() {
        for origin in FailOrigin::CONNECTION_STEPS {
            let scheduler = InMemoryScheduler::failing_at(origin);
            let mut connection = SchedulerConnection::new(scheduler.clone());

            let err = connection.init().unwrap_err();

            assert_eq!(err.origin, origin);
            assert_eq!(connection.fail_origin(), origin);
            assert_eq!(connection.state(), ConnectionState::Failed);
            assert!(!connection.is_valid());
            assert!(!scheduler.is_started(), "{origin} left the subsystem running");
            assert_eq!(scheduler.live_handles(), 0, "{origin} leaked the service");
            assert_eq!(scheduler.calls().last(), Some(&origin));
        }
    }

    #[test]
    fn drop_tears_down() {
        let scheduler = InMemoryScheduler::new();
        {
            let mut connection = SchedulerConnection::new(scheduler.clone());
            connection.init().unwrap();
        }
        assert!(!scheduler.is_started());
        assert_eq!(scheduler.live_handles(), 0);
    }
}
