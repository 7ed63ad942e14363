use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Boundary format expected by the time trigger (UTC, second precision).
pub const BOUNDARY_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Activation window of the single time trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TriggerWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TriggerWindow {
    pub fn starting_after(now: DateTime<Utc>, delay_seconds: u32, window_seconds: u32) -> Self {
        let start = now + Duration::seconds(i64::from(delay_seconds));
        let end = start + Duration::seconds(i64::from(window_seconds));
        TriggerWindow { start, end }
    }

    pub fn start_boundary(&self) -> String {
        self.start.format(BOUNDARY_FORMAT).to_string()
    }

    pub fn end_boundary(&self) -> String {
        self.end.format(BOUNDARY_FORMAT).to_string()
    }
}
