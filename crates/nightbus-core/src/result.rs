use crate::error::RunError;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Result of running one task on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRunResult {
    pub task_name: String,
    pub host: String,
    /// From submission to the executor until the host's output stream ended.
    pub duration: Duration,
    /// `None` if the exit code could not be determined.
    pub exit_code: Option<i32>,
    /// Structured messages found in the output, marker stripped.
    pub messages: Vec<String>,
}

impl TaskRunResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "exit_code": self.exit_code,
            "succeeded": self.succeeded(),
            "duration_secs": self.duration.as_secs_f64(),
            "messages": self.messages,
        })
    }
}

/// Results for one task run, keyed by host in ascending order.
pub type HostResults = BTreeMap<String, TaskRunResult>;

/// One executed task: its run name (e.g. `2.build`) and per-host results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRun {
    pub name: String,
    pub hosts: HostResults,
}

impl TaskRun {
    /// Hosts where the task did not exit with status 0.
    pub fn failed_hosts(&self) -> Vec<&str> {
        self.hosts
            .values()
            .filter(|r| !r.succeeded())
            .map(|r| r.host.as_str())
            .collect()
    }
}

/// Results of a whole run, in the order the tasks ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResults {
    runs: Vec<TaskRun>,
}

impl RunResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, hosts: HostResults) {
        self.runs.push(TaskRun {
            name: name.into(),
            hosts,
        });
    }

    pub fn get(&self, name: &str) -> Option<&HostResults> {
        self.runs.iter().find(|r| r.name == name).map(|r| &r.hosts)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskRun> {
        self.runs.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.runs.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Machine-readable summary of every task run.
    pub fn to_json(&self) -> serde_json::Value {
        let runs: Vec<serde_json::Value> = self
            .runs
            .iter()
            .map(|run| {
                let hosts: serde_json::Map<String, serde_json::Value> = run
                    .hosts
                    .iter()
                    .map(|(host, result)| (host.clone(), result.to_json()))
                    .collect();
                serde_json::json!({ "name": run.name, "hosts": hosts })
            })
            .collect();
        serde_json::json!({ "tasks": runs })
    }

    /// Write the summary to `results.json` in the given directory.
    pub fn write_json_to_dir(&self, dir: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(&self.to_json())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(dir.join("results.json"), json)
    }
}

/// Why a run stopped before reaching the end of the task list.
#[derive(Debug)]
pub enum StopReason {
    /// A task exited non-zero on some hosts and failures are not ignored.
    TaskFailed { run_name: String, hosts: Vec<String> },
    /// Cancelled by the user between tasks.
    Interrupted,
    /// The task run itself broke, e.g. a log file could not be written.
    Aborted { run_name: String, error: RunError },
}

/// What the scheduler hands back: everything that ran, and why it stopped early, if it did.
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub results: RunResults,
    pub stop: Option<StopReason>,
}

impl RunOutcome {
    /// True if every task ran and succeeded on every host.
    pub fn succeeded(&self) -> bool {
        self.stop.is_none() && self.results.iter().all(|run| run.failed_hosts().is_empty())
    }
}
