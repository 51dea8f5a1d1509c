pub mod config;
pub mod exec;
pub mod list;
pub mod run;

use anyhow::Context;
use nightbus_core::{HostsConfig, Settings, TaskList};
use std::path::PathBuf;

/// File locations given on the command line; unset ones come from settings.
pub struct Inputs {
    pub config: Option<PathBuf>,
    pub tasks_file: Option<PathBuf>,
    pub hosts_file: Option<PathBuf>,
}

impl Inputs {
    /// Load settings from `--config`, or from the default location when it exists.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        match &self.config {
            Some(path) => Settings::load_from(path)
                .with_context(|| format!("Failed to load settings from {}", path.display())),
            None => Settings::load_default(),
        }
    }

    pub fn tasks(&self, settings: &Settings) -> anyhow::Result<TaskList> {
        let path = self.tasks_file.as_ref().unwrap_or(&settings.tasks_file);
        TaskList::load(path)
            .with_context(|| format!("Failed to load tasks from {}", path.display()))
    }

    pub fn hosts(&self, settings: &Settings) -> anyhow::Result<HostsConfig> {
        let path = self.hosts_file.as_ref().unwrap_or(&settings.hosts_file);
        HostsConfig::load_from(path)
            .with_context(|| format!("Failed to load hosts from {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_paths_override_settings() {
        let dir = tempfile::tempdir().unwrap();
        let tasks_file = dir.path().join("nightly.yaml");
        let hosts_file = dir.path().join("fleet.yaml");
        std::fs::write(&tasks_file, "- {name: build, commands: make}\n").unwrap();
        std::fs::write(&hosts_file, "builder:\n").unwrap();

        let inputs = Inputs {
            config: None,
            tasks_file: Some(tasks_file),
            hosts_file: Some(hosts_file),
        };
        let settings = Settings::default();
        assert_eq!(inputs.tasks(&settings).unwrap().names(), vec!["build"]);
        assert_eq!(inputs.hosts(&settings).unwrap().names(), vec!["builder"]);
    }

    #[test]
    fn test_missing_settings_file_names_path() {
        let inputs = Inputs {
            config: Some(PathBuf::from("/nonexistent/nightbus.yaml")),
            tasks_file: None,
            hosts_file: None,
        };
        let err = inputs.settings().unwrap_err();
        assert!(err.to_string().contains("/nonexistent/nightbus.yaml"), "{err}");
    }
}
