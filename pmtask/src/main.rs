use chrono::{DateTime, Utc};
use clap::Parser;
use dotenv::dotenv;
use log::{error, info};
use serde::Serialize;
use std::process::ExitCode;
use task_sched::{FailOrigin, SchedConfig, SchedError, TaskRequest, TriggerWindow};

#[derive(Debug, Serialize)]
struct ScheduleReport {
    task_name: String,
    executable: String,
    arguments: String,
    delay_seconds: u32,
    fail_origin: FailOrigin,
    hresult: Option<String>,
    start_boundary: Option<DateTime<Utc>>,
    end_boundary: Option<DateTime<Utc>>,
}

impl ScheduleReport {
    fn new(request: &TaskRequest, outcome: &Result<TriggerWindow, SchedError>) -> Self {
        let (fail_origin, hresult, window) = match outcome {
            Ok(window) => (FailOrigin::NoError, None, Some(*window)),
            Err(err) => (err.origin, Some(err.code.to_string()), None),
        };
        ScheduleReport {
            task_name: request.task_name.clone(),
            executable: request.executable.clone(),
            arguments: request.arguments.clone(),
            delay_seconds: request.delay_seconds,
            fail_origin,
            hresult,
            start_boundary: window.map(|w| w.start),
            end_boundary: window.map(|w| w.end),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "pmtask")]
#[command(about = "Register a one-shot task that runs an executable after a delay.")]
struct Cli {
    /// Program the task starts.
    executable: String,

    /// Seconds from now until the trigger fires.
    #[arg(allow_hyphen_values = true)]
    delay: String,

    /// Command line handed to the program, passed through verbatim.
    #[arg(default_value = "", allow_hyphen_values = true)]
    arguments: String,
}

#[cfg(windows)]
fn run(request: &TaskRequest, config: &SchedConfig) -> Result<TriggerWindow, SchedError> {
    task_sched::schedule_once(task_sched::com::ComSubsystem, request, config)
}

#[cfg(not(windows))]
fn run(_request: &TaskRequest, _config: &SchedConfig) -> Result<TriggerWindow, SchedError> {
    error!("[PMTASK] The Windows Task Scheduler is not available on this platform");
    Err(SchedError::new(FailOrigin::CoCreate, task_sched::Hresult::E_FAIL))
}

fn main() -> ExitCode {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();

    let config = SchedConfig::from_env();
    let request = TaskRequest::from_fields(&cli.executable, &cli.arguments, &cli.delay, &config);
    info!(
        "[PMTASK] Scheduling '{}' to run {} in {}s",
        request.task_name, request.executable, request.delay_seconds
    );

    let outcome = run(&request, &config);
    let report = ScheduleReport::new(&request, &outcome);
    match serde_json::to_string(&report) {
        Ok(line) => println!("{}", line),
        Err(e) => error!("[PMTASK] Failed to serialize report: {}", e),
    }

    match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("[PMTASK] {}", e);
            ExitCode::FAILURE
        }
    }
}
