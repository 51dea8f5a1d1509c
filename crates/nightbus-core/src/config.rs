use crate::error::ExecutorError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Tool settings. Loaded from ~/.config/nightbus/config.yaml when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,
    #[serde(default = "default_tasks_file")]
    pub tasks_file: PathBuf,
    #[serde(default = "default_hosts_file")]
    pub hosts_file: PathBuf,
    /// Output lines starting with this marker and a space are report messages.
    #[serde(default = "default_message_marker")]
    pub message_marker: String,
    #[serde(default = "default_shell")]
    pub default_shell: String,
    #[serde(default)]
    pub continue_on_failure: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_directory: default_log_directory(),
            tasks_file: default_tasks_file(),
            hosts_file: default_hosts_file(),
            message_marker: default_message_marker(),
            default_shell: default_shell(),
            continue_on_failure: false,
        }
    }
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("/var/log/ci")
}

fn default_tasks_file() -> PathBuf {
    PathBuf::from("tasks")
}

fn default_hosts_file() -> PathBuf {
    PathBuf::from("hosts")
}

pub fn default_message_marker() -> String {
    "##nightbus".to_string()
}

pub fn default_shell() -> String {
    "sh -c".to_string()
}

impl Settings {
    /// Load settings from the default path, or defaults if there is no file.
    pub fn load_default() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&contents)?;
        Ok(settings)
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("nightbus")
            .join("config.yaml")
    }
}

/// How a host is reached.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    #[default]
    Ssh,
    Local,
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionType::Ssh => write!(f, "ssh"),
            ConnectionType::Local => write!(f, "local"),
        }
    }
}

/// Connection parameters for one host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    #[serde(rename = "type", default)]
    pub connection: ConnectionType,
    /// Address to connect to, if different from the host identifier.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key: Option<PathBuf>,
    /// Extra environment for local hosts.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl HostConfig {
    pub fn address<'a>(&'a self, host_id: &'a str) -> &'a str {
        self.host.as_deref().unwrap_or(host_id)
    }

    /// Get the SSH port, falling back to 22.
    pub fn ssh_port(&self) -> u16 {
        self.port.unwrap_or(22)
    }
}

/// Mapping of host identifier to connection parameters, from the hosts file.
#[derive(Debug, Clone, Default)]
pub struct HostsConfig {
    hosts: BTreeMap<String, HostConfig>,
}

impl HostsConfig {
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse a hosts document. A host may be listed with no parameters at all.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let raw: Option<BTreeMap<String, Option<HostConfig>>> = serde_yaml::from_str(text)?;
        let hosts = raw
            .unwrap_or_default()
            .into_iter()
            .map(|(id, config)| (id, config.unwrap_or_default()))
            .collect();
        Ok(Self { hosts })
    }

    pub fn names(&self) -> Vec<&str> {
        self.hosts.keys().map(|h| h.as_str()).collect()
    }

    pub fn get(&self, host: &str) -> Option<&HostConfig> {
        self.hosts.get(host)
    }

    pub fn insert(&mut self, host: impl Into<String>, config: HostConfig) {
        self.hosts.insert(host.into(), config);
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Validate a host selection. An empty selection means every host.
    pub fn select(&self, hosts: &[String]) -> Result<Vec<String>, ExecutorError> {
        if hosts.is_empty() {
            return Ok(self.hosts.keys().cloned().collect());
        }
        for host in hosts {
            if !self.hosts.contains_key(host) {
                return Err(ExecutorError::UnknownHost(host.clone()));
            }
        }
        Ok(hosts.to_vec())
    }

    /// The single connection type shared by `hosts`.
    pub fn connection_type(&self, hosts: &[String]) -> Result<ConnectionType, ExecutorError> {
        let mut kinds = hosts
            .iter()
            .map(|h| {
                self.get(h)
                    .map(|c| c.connection)
                    .ok_or_else(|| ExecutorError::UnknownHost(h.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        kinds.dedup();
        match kinds.as_slice() {
            [] => Err(ExecutorError::Config("no hosts selected".into())),
            [kind] => Ok(*kind),
            _ => Err(ExecutorError::Config(
                "selected hosts mix ssh and local connections".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings: Settings = serde_yaml::from_str("continue_on_failure: true").unwrap();
        assert_eq!(settings.log_directory, PathBuf::from("/var/log/ci"));
        assert_eq!(settings.message_marker, "##nightbus");
        assert_eq!(settings.default_shell, "sh -c");
        assert!(settings.continue_on_failure);
    }

    #[test]
    fn test_hosts_parse() {
        let hosts = HostsConfig::parse(
            r#"
build-1: { host: 10.0.0.5, port: 2222, user: ci }
build-2:
local-runner: { type: local, env: { CC: clang } }
"#,
        )
        .unwrap();

        assert_eq!(hosts.names(), vec!["build-1", "build-2", "local-runner"]);
        let b1 = hosts.get("build-1").unwrap();
        assert_eq!(b1.address("build-1"), "10.0.0.5");
        assert_eq!(b1.ssh_port(), 2222);
        let b2 = hosts.get("build-2").unwrap();
        assert_eq!(b2.address("build-2"), "build-2");
        assert_eq!(b2.ssh_port(), 22);
        assert_eq!(b2.connection, ConnectionType::Ssh);
        assert_eq!(
            hosts.get("local-runner").unwrap().connection,
            ConnectionType::Local
        );
    }

    #[test]
    fn test_host_selection() {
        let hosts = HostsConfig::parse("a:\nb:\nc: { type: local }\n").unwrap();
        assert_eq!(hosts.select(&[]).unwrap(), vec!["a", "b", "c"]);
        assert!(matches!(
            hosts.select(&["zz".to_string()]),
            Err(ExecutorError::UnknownHost(_))
        ));

        let ab = vec!["a".to_string(), "b".to_string()];
        assert_eq!(hosts.connection_type(&ab).unwrap(), ConnectionType::Ssh);
        let ac = vec!["a".to_string(), "c".to_string()];
        assert!(matches!(
            hosts.connection_type(&ac),
            Err(ExecutorError::Config(_))
        ));
    }
}
