use crate::result::{HostResults, RunResults};
use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;
use std::time::Duration;

/// Format a duration as `H:MM:SS`. Hours are not capped.
pub fn duration_as_string(duration: Duration) -> String {
    let seconds = duration.as_secs();
    let (m, s) = (seconds / 60, seconds % 60);
    let (h, m) = (m / 60, m % 60);
    format!("{}:{:02}:{:02}", h, m, s)
}

/// Separate out messages which occurred on every host.
///
/// Returns `(global_messages, host_messages)`: messages that appeared in the
/// output of every host, and per host the messages that did not.
///
/// The first host's messages are taken in order and each one is searched
/// for in what remains of every other host's messages. If every other host
/// has it, it is global, and anything before it on the other hosts is
/// specific to those hosts. This is greedy: messages that appear in a
/// different order on different hosts may be attributed to single hosts.
pub fn filter_messages_for_task(
    task_results: &HostResults,
) -> (Vec<String>, BTreeMap<String, Vec<String>>) {
    let mut hosts = task_results.iter();
    let Some((first_host, first_result)) = hosts.next() else {
        return (Vec::new(), BTreeMap::new());
    };

    if task_results.len() == 1 {
        let messages = first_result.messages.clone();
        let host_messages = BTreeMap::from([(first_host.clone(), messages.clone())]);
        return (messages, host_messages);
    }

    let mut unprocessed: BTreeMap<&str, VecDeque<&str>> = hosts
        .map(|(host, result)| {
            (
                host.as_str(),
                result.messages.iter().map(String::as_str).collect(),
            )
        })
        .collect();

    let mut global_messages = Vec::new();
    let mut host_messages: BTreeMap<String, Vec<String>> = task_results
        .keys()
        .map(|host| (host.clone(), Vec::new()))
        .collect();

    for message in &first_result.messages {
        let is_global = unprocessed
            .values()
            .all(|queue| queue.iter().any(|m| m == message));

        if is_global {
            global_messages.push(message.clone());
            for (host, queue) in unprocessed.iter_mut() {
                while let Some(host_message) = queue.pop_front() {
                    if host_message == message {
                        break;
                    }
                    push_message(&mut host_messages, host, host_message);
                }
            }
        } else {
            push_message(&mut host_messages, first_host, message);
        }
    }

    for (host, queue) in unprocessed {
        for message in queue {
            push_message(&mut host_messages, host, message);
        }
    }

    (global_messages, host_messages)
}

fn push_message(host_messages: &mut BTreeMap<String, Vec<String>>, host: &str, message: &str) {
    if let Some(list) = host_messages.get_mut(host) {
        list.push(message.to_string());
    }
}

/// Render a report of task results, durations and messages.
///
/// ```text
/// 1.build:
///   message seen on every host
///   - host-a: succeeded in 0:01:05
///     message seen only on host-a
///   - host-b: failed in 0:00:12
/// ```
pub fn render_report(all_results: &RunResults) -> String {
    let mut out = String::new();
    for (i, run) in all_results.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "{}:", run.name);

        let (global_messages, host_messages) = filter_messages_for_task(&run.hosts);
        for message in &global_messages {
            let _ = writeln!(out, "  {}", message);
        }

        for (host, result) in &run.hosts {
            let status = if result.succeeded() { "succeeded" } else { "failed" };
            let _ = writeln!(
                out,
                "  - {}: {} in {}",
                host,
                status,
                duration_as_string(result.duration)
            );
            for message in host_messages.get(host).into_iter().flatten() {
                let _ = writeln!(out, "    {}", message);
            }
        }
    }
    out
}

/// Write the rendered report to `writer`.
pub fn write_report<W: std::io::Write>(
    writer: &mut W,
    all_results: &RunResults,
) -> std::io::Result<()> {
    writer.write_all(render_report(all_results).as_bytes())
}
