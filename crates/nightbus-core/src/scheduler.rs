use crate::context::RunContext;
use crate::engine::run_task;
use crate::executor::Executor;
use crate::result::{RunOutcome, StopReason};
use crate::task::TaskSpec;
use tracing::{error, info, warn};

/// Run each task in turn on all hosts.
///
/// Only one task runs at a time: a single task is assumed to saturate at
/// least one of a host's CPU, RAM or IO, so fast hosts never move on to the
/// next task while slow hosts are still busy with the current one.
///
/// Tasks are named `<n>.<task name>` counting from 1. The loop stops after
/// a task fails on any host (unless `continue_on_failure` is set), when the
/// run is cancelled, or when a task run breaks. In every case the results
/// gathered so far are returned.
pub async fn run_all_tasks(
    executor: &dyn Executor,
    hosts: &[String],
    tasks: &[TaskSpec],
    ctx: &RunContext,
) -> RunOutcome {
    let mut outcome = RunOutcome::default();

    for (index, task) in tasks.iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            info!("Run cancelled, not starting {}", task.name);
            outcome.stop = Some(StopReason::Interrupted);
            break;
        }

        let run_name = format!("{}.{}", index + 1, task.name);

        let host_results = match run_task(executor, hosts, task, &run_name, ctx).await {
            Ok(results) => results,
            Err(e) => {
                error!("Task {} aborted: {}", run_name, e);
                outcome.stop = Some(StopReason::Aborted { run_name, error: e });
                break;
            }
        };

        let failed_hosts: Vec<String> = host_results
            .values()
            .filter(|r| !r.succeeded())
            .map(|r| r.host.clone())
            .collect();
        outcome.results.insert(run_name.clone(), host_results);

        if !failed_hosts.is_empty() {
            let msg = format!("Task {} failed on: {}", run_name, failed_hosts.join(", "));
            if ctx.continue_on_failure {
                warn!("{}", msg);
            } else {
                error!("{}", msg);
                outcome.stop = Some(StopReason::TaskFailed {
                    run_name,
                    hosts: failed_hosts,
                });
                break;
            }
        }
    }

    // Cancelled while the last task was running.
    if outcome.stop.is_none() && ctx.cancel.is_cancelled() {
        info!("Run cancelled during the final task");
        outcome.stop = Some(StopReason::Interrupted);
    }

    outcome
}
