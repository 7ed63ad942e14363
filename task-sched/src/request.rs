use crate::config::SchedConfig;

/// The three fields collected by the front end, plus the task name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub executable: String,
    pub arguments: String,
    pub task_name: String,
    pub delay_seconds: u32,
}

impl TaskRequest {
    pub fn from_fields(
        executable: &str,
        arguments: &str,
        delay: &str,
        config: &SchedConfig,
    ) -> Self {
        TaskRequest {
            executable: executable.to_string(),
            arguments: arguments.to_string(),
            task_name: config.task_name.clone(),
            delay_seconds: parse_delay(delay),
        }
    }
}

/// Leading-integer parse of the delay field.
///
/// Skips leading whitespace, accepts an optional sign and reads digits up
/// to the first non-digit. Anything unparseable or negative yields 0, which
/// the registrar rejects. Values past `u32::MAX` saturate.
pub fn parse_delay(text: &str) -> u32 {
    let trimmed = text.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let mut value: u32 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        value = value.saturating_mul(10).saturating_add(u32::from(b - b'0'));
    }

    if negative {
        0
    } else {
        value
    }
}
