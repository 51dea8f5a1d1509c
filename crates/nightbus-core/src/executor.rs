use crate::error::ExecutorError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Lines buffered per host before the executor side waits for the watcher.
const LINE_BUFFER: usize = 1024;

/// A command to run on a set of hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub command: String,
    /// Interpreter override, e.g. `bash -l -c`. The command is passed as its last argument.
    pub shell: Option<String>,
    pub hosts: Vec<String>,
}

/// Core executor trait. Every transport implements this.
///
/// `run_command` returns as soon as the command has been submitted to every
/// host. If any host cannot be reached or cannot start the command, the
/// whole submission fails and no per-host output is returned.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    /// Executor type string ("ssh", "local").
    fn executor_type(&self) -> &str;

    async fn run_command(&self, request: CommandRequest) -> Result<CommandOutput, ExecutorError>;
}

/// Per-host output handles plus the executor's own completion signal.
pub struct CommandOutput {
    pub hosts: Vec<HostOutput>,
    pub completion: Completion,
}

/// Receiving side of one host's output: its lines, then its exit code.
pub struct HostOutput {
    pub host: String,
    lines: mpsc::Receiver<String>,
    exit_code: oneshot::Receiver<Option<i32>>,
}

/// Sending side of one host's output, held by the executor's driver for that host.
pub struct HostSender {
    lines: mpsc::Sender<String>,
    exit_code: oneshot::Sender<Option<i32>>,
}

impl HostOutput {
    pub fn channel(host: impl Into<String>) -> (HostOutput, HostSender) {
        let (line_tx, line_rx) = mpsc::channel(LINE_BUFFER);
        let (exit_tx, exit_rx) = oneshot::channel();
        (
            HostOutput {
                host: host.into(),
                lines: line_rx,
                exit_code: exit_rx,
            },
            HostSender {
                lines: line_tx,
                exit_code: exit_tx,
            },
        )
    }

    /// Next line of output, or `None` once the stream is exhausted.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Exit code of the remote command. Only meaningful after the stream is
    /// exhausted. `None` if the executor could not determine it.
    pub async fn exit_code(self) -> Option<i32> {
        self.exit_code.await.ok().flatten()
    }
}

impl HostSender {
    /// Returns false if the watcher has gone away.
    pub async fn send_line(&self, line: String) -> bool {
        self.lines.send(line).await.is_ok()
    }

    /// For drivers running on a blocking thread.
    pub fn blocking_send_line(&self, line: String) -> bool {
        self.lines.blocking_send(line).is_ok()
    }

    /// Close the line stream, then publish the exit code.
    pub fn finish(self, exit_code: Option<i32>) {
        let HostSender { lines, exit_code: exit_tx } = self;
        drop(lines);
        let _ = exit_tx.send(exit_code);
    }
}

/// Resolves once every per-host driver of a command has finished.
pub struct Completion {
    drivers: Vec<JoinHandle<Result<(), ExecutorError>>>,
}

impl Completion {
    pub fn new(drivers: Vec<JoinHandle<Result<(), ExecutorError>>>) -> Self {
        Self { drivers }
    }

    /// Wait for all drivers, returning the first error any of them reported.
    pub async fn join(self) -> Result<(), ExecutorError> {
        let mut first_error = None;
        for driver in self.drivers {
            let outcome = match driver.await {
                Ok(outcome) => outcome,
                Err(e) => Err(ExecutorError::Driver(e.to_string())),
            };
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
