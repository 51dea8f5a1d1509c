use std::path::PathBuf;
use thiserror::Error;

/// Problems with the task document. Raised before any host is contacted.
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("Tasks file is invalid: {0}")]
    Malformed(String),

    #[error("Task '{task}': cannot read include file {}: {source}", path.display())]
    TaskDefinition {
        task: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Task '{task}': {reason}")]
    InvalidTask { task: String, reason: String },

    #[error("Duplicate task name: {0}")]
    DuplicateTaskName(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_yaml::Error> for SpecError {
    fn from(e: serde_yaml::Error) -> Self {
        SpecError::Malformed(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("SSH connection to {host} failed: {message}")]
    SshConnection { host: String, message: String },

    #[error("SSH command on {host} failed: {message}")]
    SshCommand { host: String, message: String },

    #[error("Process error on {host}: {message}")]
    Process { host: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Executor driver failed: {0}")]
    Driver(String),

    #[error("Unknown host: {0}")]
    UnknownHost(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort a task run as a whole.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Cannot write log file {}: {source}", path.display())]
    LogArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Output watcher for {host} failed: {message}")]
    Watcher { host: String, message: String },

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}
