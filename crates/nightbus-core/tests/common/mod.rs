use nightbus_core::error::ExecutorError;
use nightbus_core::executor::{CommandOutput, CommandRequest, Completion, Executor, HostOutput};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What one host prints and how it exits.
pub struct HostScript {
    pub lines: Vec<String>,
    pub exit_code: Option<i32>,
}

impl HostScript {
    pub fn new(lines: &[&str], exit_code: Option<i32>) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            exit_code,
        }
    }
}

type Script = Box<dyn Fn(&str, &str) -> HostScript + Send + Sync>;

/// In-memory executor: output per host is decided by a closure of (host, command).
pub struct ScriptedExecutor {
    script: Script,
    refuse_submission: bool,
    driver_delay: Duration,
    finished_drivers: Arc<AtomicUsize>,
    pub requests: Mutex<Vec<CommandRequest>>,
}

impl ScriptedExecutor {
    pub fn new(script: impl Fn(&str, &str) -> HostScript + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            refuse_submission: false,
            driver_delay: Duration::ZERO,
            finished_drivers: Arc::new(AtomicUsize::new(0)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Hold each host's driver open for `delay` after its output is sent.
    #[allow(dead_code)]
    pub fn with_driver_delay(mut self, delay: Duration) -> Self {
        self.driver_delay = delay;
        self
    }

    /// Number of per-host drivers that have run to completion.
    #[allow(dead_code)]
    pub fn finished_drivers(&self) -> usize {
        self.finished_drivers.load(Ordering::SeqCst)
    }

    /// An executor whose hosts are all unreachable.
    pub fn unreachable() -> Self {
        let mut executor = Self::new(|_, _| HostScript::new(&[], None));
        executor.refuse_submission = true;
        executor
    }

    pub fn commands(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.command.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl Executor for ScriptedExecutor {
    fn executor_type(&self) -> &str {
        "scripted"
    }

    async fn run_command(&self, request: CommandRequest) -> Result<CommandOutput, ExecutorError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.refuse_submission {
            return Err(ExecutorError::SshConnection {
                host: request.hosts.first().cloned().unwrap_or_default(),
                message: "connection refused".into(),
            });
        }

        let mut hosts = Vec::new();
        let mut drivers = Vec::new();
        for host in &request.hosts {
            let HostScript { lines, exit_code } = (self.script)(host, &request.command);
            let (output, sender) = HostOutput::channel(host.clone());
            let delay = self.driver_delay;
            let finished = Arc::clone(&self.finished_drivers);
            drivers.push(tokio::spawn(async move {
                for line in lines {
                    if !sender.send_line(line).await {
                        break;
                    }
                }
                tokio::time::sleep(delay).await;
                sender.finish(exit_code);
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));
            hosts.push(output);
        }
        Ok(CommandOutput {
            hosts,
            completion: Completion::new(drivers),
        })
    }
}

pub fn hosts(names: &[&str]) -> Vec<String> {
    names.iter().map(|h| h.to_string()).collect()
}
