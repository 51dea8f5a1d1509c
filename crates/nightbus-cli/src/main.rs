use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod dispatch;

#[derive(Parser)]
#[command(name = "nightbus")]
#[command(about = "Simple SSH automation for build, test, deployment, etc.", long_about = None)]
struct Cli {
    /// Settings file (default: ~/.config/nightbus/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Task list file (default from settings: ./tasks)
    #[arg(long, global = true)]
    tasks_file: Option<PathBuf>,

    /// Host configuration file (default from settings: ./hosts)
    #[arg(long, global = true)]
    hosts_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run tasks on the selected hosts, one task at a time
    Run {
        /// Define 'force=yes' in environment for each task
        #[arg(long)]
        force: bool,

        /// Select hosts to run on (default: all hosts)
        #[arg(long, alias = "host", value_delimiter = ',')]
        hosts: Vec<String>,

        /// Select tasks to run (default: all tasks)
        #[arg(short = 't', long, alias = "task", value_delimiter = ',')]
        tasks: Vec<String>,

        /// Base directory for log files
        #[arg(short, long)]
        log_directory: Option<PathBuf>,

        /// Keep running later tasks after a task fails
        #[arg(long)]
        continue_on_failure: bool,
    },

    /// List the available tasks and hosts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a command on the hosts instead of any of the tasks, for debugging tasks
    Exec {
        /// Shell command to run
        command: String,

        /// Select hosts to run on (default: all hosts)
        #[arg(long, alias = "host", value_delimiter = ',')]
        hosts: Vec<String>,
    },

    /// Show or create the settings file
    Config {
        /// Print the settings file path
        #[arg(long)]
        path: bool,

        /// Write a sample settings file
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let inputs = commands::Inputs {
        config: cli.config,
        tasks_file: cli.tasks_file,
        hosts_file: cli.hosts_file,
    };

    use Commands::*;

    match cli.command {
        Run {
            force,
            hosts,
            tasks,
            log_directory,
            continue_on_failure,
        } => {
            let settings = inputs.settings()?;
            let hosts_config = inputs.hosts(&settings)?;
            let task_list = inputs.tasks(&settings)?;
            let args = commands::run::RunArgs {
                force,
                hosts,
                tasks,
                log_directory,
                continue_on_failure,
            };
            commands::run::run(&settings, &task_list, &hosts_config, args).await?;
        }
        List { json } => {
            let settings = inputs.settings()?;
            let hosts_config = inputs.hosts(&settings)?;
            let task_list = inputs.tasks(&settings)?;
            commands::list::run(&task_list, &hosts_config, json).await?;
        }
        Exec { command, hosts } => {
            let settings = inputs.settings()?;
            let hosts_config = inputs.hosts(&settings)?;
            commands::exec::run(&settings, &hosts_config, &hosts, command).await?;
        }
        Config { path, init } => {
            commands::config::run(inputs.config.as_deref(), path, init).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_selection_lists() {
        let cli = Cli::parse_from([
            "nightbus", "run", "--hosts", "a,b", "-t", "build", "--task", "test", "--force",
        ]);
        match cli.command {
            Commands::Run {
                hosts, tasks, force, ..
            } => {
                assert_eq!(hosts, vec!["a", "b"]);
                assert_eq!(tasks, vec!["build", "test"]);
                assert!(force);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_config_accepts_global_options() {
        let cli = Cli::parse_from(["nightbus", "config", "--path", "--config", "/tmp/n.yaml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/n.yaml")));
        assert!(matches!(cli.command, Commands::Config { path: true, init: false }));
    }
}
