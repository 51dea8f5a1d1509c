use crate::dispatch;
use nightbus_core::{CommandRequest, HostsConfig, Settings};
use std::collections::BTreeMap;
use tracing::info;

/// Run an ad-hoc command on the hosts and print each host's output once
/// every host has finished.
pub async fn run(
    settings: &Settings,
    hosts_config: &HostsConfig,
    hosts: &[String],
    command: String,
) -> anyhow::Result<()> {
    let hosts = hosts_config.select(hosts)?;
    let executor = dispatch::create_executor(settings, hosts_config, &hosts)?;

    info!("Running on {}: {}", hosts.join(","), command);
    let output = executor
        .run_command(CommandRequest {
            command,
            shell: None,
            hosts,
        })
        .await?;

    let collectors: Vec<_> = output
        .hosts
        .into_iter()
        .map(|mut host_output| {
            tokio::spawn(async move {
                let mut lines = Vec::new();
                while let Some(line) = host_output.next_line().await {
                    lines.push(line);
                }
                let host = host_output.host.clone();
                let exit_code = host_output.exit_code().await;
                (host, lines, exit_code)
            })
        })
        .collect();

    let mut collected = BTreeMap::new();
    for collector in collectors {
        let (host, lines, exit_code) = collector.await?;
        collected.insert(host, (lines, exit_code));
    }
    output.completion.join().await?;

    for (host, (lines, exit_code)) in &collected {
        for line in lines {
            println!("[{}] {}", host, line);
        }
        match exit_code {
            Some(code) => println!("[{}] Exit code: {}", host, code),
            None => println!("[{}] Exit code: unknown", host),
        }
    }

    Ok(())
}
