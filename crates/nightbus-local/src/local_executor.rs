use nightbus_core::config::HostsConfig;
use nightbus_core::error::ExecutorError;
use nightbus_core::executor::{
    CommandOutput, CommandRequest, Completion, Executor, HostOutput, HostSender,
};
use std::io::{BufRead, BufReader, PipeReader};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Local executor: runs each host's command as a child process on this
/// machine. The host identifier is exported as `NIGHTBUS_HOST`, along with
/// the host's configured `env`.
pub struct LocalExecutor {
    hosts: HostsConfig,
    default_shell: String,
}

impl LocalExecutor {
    pub fn new(hosts: HostsConfig, default_shell: impl Into<String>) -> Self {
        Self {
            hosts,
            default_shell: default_shell.into(),
        }
    }

    /// Start the host's command with stdout and stderr sharing one pipe, so
    /// the host's lines keep the order they were written in.
    fn spawn(
        &self,
        host: &str,
        request: &CommandRequest,
    ) -> Result<(Child, PipeReader), ExecutorError> {
        let config = self
            .hosts
            .get(host)
            .ok_or_else(|| ExecutorError::UnknownHost(host.to_string()))?;

        let shell = request.shell.as_deref().unwrap_or(&self.default_shell);
        let mut words = shell.split_whitespace();
        let program = words.next().ok_or_else(|| {
            ExecutorError::Config(format!("empty shell command for host {}", host))
        })?;

        let process_error = |message: String| ExecutorError::Process {
            host: host.to_string(),
            message,
        };
        let (reader, writer) =
            std::io::pipe().map_err(|e| process_error(format!("Creating output pipe: {}", e)))?;
        let stderr = writer
            .try_clone()
            .map_err(|e| process_error(format!("Creating output pipe: {}", e)))?;

        debug!("Local exec on {}: {} <script>", host, shell);
        // The Command owns the write ends; dropping it at the end of this
        // statement leaves the child as the only writer.
        let child = Command::new(program)
            .args(words)
            .arg(&request.command)
            .env("NIGHTBUS_HOST", host)
            .envs(&config.env)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr)
            .spawn()
            .map_err(|e| process_error(format!("Failed to spawn {}: {}", program, e)))?;
        Ok((child, reader))
    }
}

#[async_trait::async_trait]
impl Executor for LocalExecutor {
    fn executor_type(&self) -> &str {
        "local"
    }

    async fn run_command(&self, request: CommandRequest) -> Result<CommandOutput, ExecutorError> {
        let mut children = Vec::with_capacity(request.hosts.len());
        for host in &request.hosts {
            match self.spawn(host, &request) {
                Ok((child, reader)) => children.push((host.clone(), child, reader)),
                Err(e) => {
                    for (started, child, _) in &mut children {
                        warn!("Stopping {} after failed submission", started);
                        let _ = child.start_kill();
                    }
                    return Err(e);
                }
            }
        }
        info!("Started command on {} local host(s)", children.len());

        let mut hosts = Vec::with_capacity(children.len());
        let mut drivers = Vec::with_capacity(children.len());
        for (host, child, reader) in children {
            let (output, sender) = HostOutput::channel(host.clone());
            hosts.push(output);
            drivers.push(tokio::spawn(drive(host, child, reader, sender)));
        }

        Ok(CommandOutput {
            hosts,
            completion: Completion::new(drivers),
        })
    }
}

/// Forward the child's combined output to its watcher, then report its exit code.
async fn drive(
    host: String,
    mut child: Child,
    reader: PipeReader,
    sender: HostSender,
) -> Result<(), ExecutorError> {
    let process_error = |message: String| ExecutorError::Process {
        host: host.clone(),
        message,
    };

    let (sender, read_result) = tokio::task::spawn_blocking(move || {
        let result = forward(reader, &sender);
        (sender, result)
    })
    .await
    .map_err(|e| ExecutorError::Driver(e.to_string()))?;

    let status = child.wait().await;
    let exit_code = status.as_ref().ok().and_then(|s| s.code());
    sender.finish(exit_code);

    read_result.map_err(|e| process_error(format!("Reading output: {}", e)))?;
    status.map_err(|e| process_error(format!("Waiting for exit: {}", e)))?;
    Ok(())
}

/// Forward lines until every writer has closed the pipe. If the watcher goes
/// away the rest is drained and discarded so the child never blocks on a
/// full pipe. Runs on a blocking thread.
fn forward(reader: PipeReader, sender: &HostSender) -> std::io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut watching = true;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        if watching {
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
            watching = sender.blocking_send_line(line.to_string());
        }
    }
}
