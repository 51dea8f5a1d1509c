use crate::context::{Clock, RunContext};
use crate::error::RunError;
use crate::executor::{CommandRequest, Executor, HostOutput};
use crate::result::{HostResults, TaskRunResult};
use crate::task::TaskSpec;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

/// The text submitted to the executor for a task.
pub fn build_command(task: &TaskSpec, force: bool) -> String {
    let mut cmd = format!("task_name={}\n", task.name);
    if force {
        cmd.push_str("force=yes\n");
    }
    cmd.push_str(&task.script);
    cmd
}

/// Log file name for one host's output in one task run. Path separators
/// are replaced so the name stays a single path component.
pub fn log_file_name(run_name: &str, host: &str) -> String {
    format!("{}.{}.log", run_name, host).replace('/', "_")
}

/// Run a single task on all the given hosts and wait for every host to finish.
///
/// One watcher per host drains that host's output into its log file and
/// collects structured messages. All watchers are joined before the
/// executor's own completion, so no buffered output is lost. A non-zero
/// exit code is recorded, not treated as an error.
pub async fn run_task(
    executor: &dyn Executor,
    hosts: &[String],
    task: &TaskSpec,
    run_name: &str,
    ctx: &RunContext,
) -> Result<HostResults, RunError> {
    info!("{}: Starting task run", run_name);

    let start = ctx.clock.now();
    let request = CommandRequest {
        command: build_command(task, ctx.force),
        shell: task.shell.clone(),
        hosts: hosts.to_vec(),
    };
    debug!("{}: Submitting to {} executor", run_name, executor.executor_type());
    let output = executor.run_command(request).await?;

    let prefix = ctx.message_prefix();
    let watchers: Vec<_> = output
        .hosts
        .into_iter()
        .map(|host_output| {
            let log_path = ctx
                .log_directory
                .join(log_file_name(run_name, &host_output.host));
            let watch = Watch {
                run_name: run_name.to_string(),
                log_path,
                prefix: prefix.clone(),
                clock: Arc::clone(&ctx.clock),
                start,
            };
            let host = host_output.host.clone();
            (host, tokio::spawn(watch.run(host_output)))
        })
        .collect();

    let mut results = HostResults::new();
    let mut first_error = None;
    for (host, watcher) in watchers {
        match watcher.await {
            Ok(Ok(result)) => {
                results.insert(result.host.clone(), result);
            }
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(e) => {
                first_error.get_or_insert(RunError::Watcher {
                    host,
                    message: e.to_string(),
                });
            }
        }
    }
    if let Some(e) = first_error {
        // The drivers drain the rest of the output once their watcher is gone.
        if let Err(join_error) = output.completion.join().await {
            debug!("{}: executor also failed: {}", run_name, join_error);
        }
        return Err(e);
    }

    info!("{}: Output collected from all hosts, waiting for them to finish", run_name);
    output.completion.join().await?;
    info!("{}: All jobs finished", run_name);

    Ok(results)
}

/// State for one host's watcher.
struct Watch {
    run_name: String,
    log_path: PathBuf,
    prefix: String,
    clock: Arc<dyn Clock>,
    start: Instant,
}

impl Watch {
    async fn run(self, mut output: HostOutput) -> Result<TaskRunResult, RunError> {
        let file = File::create(&self.log_path)
            .await
            .map_err(|e| log_error(&self.log_path, e))?;
        let mut log = BufWriter::new(file);

        let mut messages = Vec::new();
        while let Some(line) = output.next_line().await {
            log.write_all(line.as_bytes())
                .await
                .map_err(|e| log_error(&self.log_path, e))?;
            log.write_all(b"\n")
                .await
                .map_err(|e| log_error(&self.log_path, e))?;
            if let Some(message) = line.strip_prefix(&self.prefix) {
                messages.push(message.to_string());
            }
        }
        log.flush().await.map_err(|e| log_error(&self.log_path, e))?;

        let duration = self.clock.now().saturating_duration_since(self.start);
        let host = output.host.clone();
        let exit_code = output.exit_code().await;
        debug!("{}: {} exited with {:?}", self.run_name, host, exit_code);

        Ok(TaskRunResult {
            task_name: self.run_name,
            host,
            duration,
            exit_code,
            messages,
        })
    }
}

fn log_error(path: &Path, source: std::io::Error) -> RunError {
    RunError::LogArtifact {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_command() {
        let task = TaskSpec {
            name: "build".into(),
            script: "make".into(),
            shell: None,
        };
        assert_eq!(build_command(&task, false), "task_name=build\nmake");
        assert_eq!(build_command(&task, true), "task_name=build\nforce=yes\nmake");
    }

    #[test]
    fn test_log_file_name_is_single_component() {
        assert_eq!(log_file_name("1.print-hello", "127.0.0.1"), "1.print-hello.127.0.0.1.log");
        assert_eq!(
            log_file_name("2.build.linux/arm", "rack/host-3"),
            "2.build.linux_arm.rack_host-3.log"
        );
    }
}
