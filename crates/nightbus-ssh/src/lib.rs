mod ssh_executor;

pub use ssh_executor::{shell_command, SshExecutor};
