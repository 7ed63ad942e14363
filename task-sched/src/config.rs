use log::warn;

pub const DEFAULT_TASK_NAME: &str = "PMTask";
pub const DEFAULT_AUTHOR: &str = "TaskSched";
pub const DEFAULT_TRIGGER_ID: &str = "PMTaskSchedTrigger";
pub const ROOT_FOLDER: &str = "\\";
pub const DEFAULT_WINDOW_SECS: u32 = 600;
pub const DEFAULT_IDLE_WAIT: &str = "PT5M";

/// Fixed values written into every task definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedConfig {
    pub task_name: String,
    pub author: String,
    pub trigger_id: String,
    pub folder: String,
    pub window_seconds: u32,
    /// `None` skips the idle settings steps entirely.
    pub idle_wait_timeout: Option<String>,
}

impl Default for SchedConfig {
    fn default() -> Self {
        SchedConfig {
            task_name: DEFAULT_TASK_NAME.to_string(),
            author: DEFAULT_AUTHOR.to_string(),
            trigger_id: DEFAULT_TRIGGER_ID.to_string(),
            folder: ROOT_FOLDER.to_string(),
            window_seconds: DEFAULT_WINDOW_SECS,
            idle_wait_timeout: Some(DEFAULT_IDLE_WAIT.to_string()),
        }
    }
}

impl SchedConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = SchedConfig::default();

        if let Some(name) = lookup("PMTASK_NAME").filter(|v| !v.trim().is_empty()) {
            config.task_name = name;
        }
        if let Some(author) = lookup("PMTASK_AUTHOR").filter(|v| !v.trim().is_empty()) {
            config.author = author;
        }
        if let Some(id) = lookup("PMTASK_TRIGGER_ID").filter(|v| !v.trim().is_empty()) {
            config.trigger_id = id;
        }

        if let Some(raw) = lookup("PMTASK_WINDOW_SECS") {
            match raw.trim().parse::<u32>() {
                Ok(secs) if secs > 0 => config.window_seconds = secs,
                _ => warn!(
                    "Ignoring PMTASK_WINDOW_SECS={:?}, keeping {}s window",
                    raw, config.window_seconds
                ),
            }
        }

        if let Some(raw) = lookup("PMTASK_IDLE_WAIT") {
            let raw = raw.trim();
            config.idle_wait_timeout = if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(raw.to_string())
            };
        }

        config
    }
}
