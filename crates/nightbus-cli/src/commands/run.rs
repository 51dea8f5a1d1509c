use crate::dispatch;
use anyhow::{bail, Context};
use nightbus_core::context::session_name;
use nightbus_core::report::write_report;
use nightbus_core::scheduler::run_all_tasks;
use nightbus_core::{
    HostsConfig, RunContext, RunResults, Settings, StopReason, SystemClock, TaskList,
};
use std::fs::File;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct RunArgs {
    pub force: bool,
    pub hosts: Vec<String>,
    pub tasks: Vec<String>,
    pub log_directory: Option<PathBuf>,
    pub continue_on_failure: bool,
}

pub async fn run(
    settings: &Settings,
    task_list: &TaskList,
    hosts_config: &HostsConfig,
    args: RunArgs,
) -> anyhow::Result<()> {
    let hosts = hosts_config.select(&args.hosts)?;
    let tasks = task_list.select(&args.tasks)?;
    let task_names: Vec<&str> = tasks.iter().map(|t| t.name.as_str()).collect();
    info!("Selected tasks: {}", task_names.join(","));
    info!("Selected hosts: {}", hosts.join(","));

    let base_directory = args
        .log_directory
        .unwrap_or_else(|| settings.log_directory.clone());
    check_log_directory(&base_directory)?;

    let executor = dispatch::create_executor(settings, hosts_config, &hosts)?;

    let clock = Arc::new(SystemClock);
    let log_directory = create_session_directory(&base_directory, &session_name(clock.as_ref()))?;
    info!("Created log directory: {}", log_directory.display());

    let cancel = CancellationToken::new();
    watch_for_interrupt(cancel.clone());

    let ctx = RunContext::from_settings(settings, &log_directory)
        .with_force(args.force)
        .with_continue_on_failure(args.continue_on_failure || settings.continue_on_failure)
        .with_clock(clock)
        .with_cancel(cancel);

    let outcome = run_all_tasks(executor.as_ref(), &hosts, &tasks, &ctx).await;

    if !outcome.results.is_empty() {
        let report_path = write_artifacts(&log_directory, &outcome.results)?;
        println!("{}", report_path.display());
    }

    match outcome.stop {
        Some(StopReason::TaskFailed { run_name, hosts }) => {
            bail!("Task {} failed on: {}", run_name, hosts.join(", "))
        }
        Some(StopReason::Aborted { run_name, error }) => {
            Err(anyhow::Error::new(error).context(format!("Task {} aborted", run_name)))
        }
        Some(StopReason::Interrupted) => {
            warn!("Run interrupted, later tasks were skipped");
            Ok(())
        }
        None if !outcome.succeeded() => bail!("Some tasks failed, see the report"),
        None => Ok(()),
    }
}

fn check_log_directory(path: &Path) -> anyhow::Result<()> {
    if !path.is_dir() {
        bail!(
            "Log directory {} doesn't seem to exist. Use --log-directory to change where logs are stored.",
            path.display()
        );
    }
    Ok(())
}

/// Create `<base>/<name>`. Creating it is also the writability check.
fn create_session_directory(base: &Path, name: &str) -> anyhow::Result<PathBuf> {
    let path = base.join(name);
    match std::fs::create_dir(&path) {
        Ok(()) => Ok(path),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => bail!(
            "Log directory {} is not writable. Use --log-directory to change where logs are stored.",
            base.display()
        ),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            bail!("Session directory {} already exists", path.display())
        }
        Err(e) => {
            Err(e).with_context(|| format!("Failed to create log directory {}", path.display()))
        }
    }
}

/// Write `report` and `results.json` into the session directory.
fn write_artifacts(log_directory: &Path, results: &RunResults) -> anyhow::Result<PathBuf> {
    let report_path = log_directory.join("report");
    info!("Writing report to: {}", report_path.display());
    let mut writer = BufWriter::new(File::create(&report_path)?);
    write_report(&mut writer, results)?;
    writer.flush()?;
    results.write_json_to_dir(log_directory)?;
    Ok(report_path)
}

/// First Ctrl-C lets the current task finish and skips the rest; a second
/// one exits immediately.
fn watch_for_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupted, finishing the current task. Press Ctrl-C again to quit now.");
        cancel.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}
