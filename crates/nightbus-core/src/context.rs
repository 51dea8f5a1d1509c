use crate::config::{default_message_marker, Settings};
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Source of time for a run.
pub trait Clock: Send + Sync {
    /// Monotonic time, used for task durations.
    fn now(&self) -> Instant;

    /// Wall-clock time, used for naming sessions.
    fn local_time(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn local_time(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Name for a run's log directory, e.g. `2017.06.01-22.00.05`.
pub fn session_name(clock: &dyn Clock) -> String {
    clock.local_time().format("%Y.%m.%d-%H.%M.%S").to_string()
}

/// Everything the scheduler and run engine need besides the executor and the tasks.
#[derive(Clone)]
pub struct RunContext {
    /// Directory receiving one log file per task run and host.
    pub log_directory: PathBuf,
    pub message_marker: String,
    /// Define `force=yes` for every task.
    pub force: bool,
    /// Keep running later tasks after a task fails on some host.
    pub continue_on_failure: bool,
    pub clock: Arc<dyn Clock>,
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(log_directory: impl Into<PathBuf>) -> Self {
        Self {
            log_directory: log_directory.into(),
            message_marker: default_message_marker(),
            force: false,
            continue_on_failure: false,
            clock: Arc::new(SystemClock),
            cancel: CancellationToken::new(),
        }
    }

    /// Context for `log_directory` taking marker and failure policy from settings.
    pub fn from_settings(settings: &Settings, log_directory: impl Into<PathBuf>) -> Self {
        Self::new(log_directory)
            .with_message_marker(settings.message_marker.clone())
            .with_continue_on_failure(settings.continue_on_failure)
    }

    pub fn with_message_marker(mut self, marker: impl Into<String>) -> Self {
        self.message_marker = marker.into();
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_continue_on_failure(mut self, continue_on_failure: bool) -> Self {
        self.continue_on_failure = continue_on_failure;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The prefix that marks a structured message line, marker plus one space.
    pub fn message_prefix(&self) -> String {
        format!("{} ", self.message_marker)
    }
}
