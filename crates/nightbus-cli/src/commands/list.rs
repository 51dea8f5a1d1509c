use nightbus_core::{HostsConfig, TaskList};

pub async fn run(tasks: &TaskList, hosts: &HostsConfig, json: bool) -> anyhow::Result<()> {
    if json {
        let json_tasks: Vec<_> = tasks
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "shell": t.shell,
                })
            })
            .collect();
        let out = serde_json::json!({
            "hosts": hosts.names(),
            "tasks": json_tasks,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Available hosts:");
    println!();
    if hosts.is_empty() {
        println!("  (none)");
    }
    for host in hosts.names() {
        println!("  * {}", host);
    }
    println!();

    println!("Available tasks:");
    println!();
    if tasks.is_empty() {
        println!("  (none)");
    }
    for task in tasks.iter() {
        match &task.shell {
            Some(shell) => println!("  * {} ({})", task.name, shell),
            None => println!("  * {}", task.name),
        }
    }

    Ok(())
}
