use nightbus_core::config::{ConnectionType, HostsConfig, Settings};
use nightbus_core::error::ExecutorError;
use nightbus_core::Executor;

/// Create the executor for a host selection. All selected hosts must share
/// one connection type.
pub fn create_executor(
    settings: &Settings,
    hosts_config: &HostsConfig,
    hosts: &[String],
) -> Result<Box<dyn Executor>, ExecutorError> {
    let shell = settings.default_shell.clone();
    match hosts_config.connection_type(hosts)? {
        ConnectionType::Ssh => Ok(Box::new(nightbus_ssh::SshExecutor::new(
            hosts_config.clone(),
            shell,
        ))),
        ConnectionType::Local => Ok(Box::new(nightbus_local::LocalExecutor::new(
            hosts_config.clone(),
            shell,
        ))),
    }
}
