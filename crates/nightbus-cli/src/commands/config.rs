use nightbus_core::Settings;
use std::path::Path;

const SAMPLE_CONFIG: &str = r###"# nightbus settings

# Each run creates a timestamped session directory in here.
log_directory: /var/log/ci

# Relative paths are resolved from the working directory.
tasks_file: tasks
hosts_file: hosts

# Output lines starting with this marker and a space appear in the report.
message_marker: "##nightbus"

# Shell used for tasks that don't set one.
default_shell: sh -c

continue_on_failure: false
"###;

pub async fn run(config: Option<&Path>, path: bool, init: bool) -> anyhow::Result<()> {
    let config_path = config
        .map(Path::to_path_buf)
        .unwrap_or_else(Settings::default_path);

    if path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Settings already exist at: {}", config_path.display());
            println!("Remove the file first if you want to reinitialize.");
            return Ok(());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&config_path, SAMPLE_CONFIG)?;
        println!("Sample settings written to: {}", config_path.display());
        return Ok(());
    }

    println!("Settings path: {}", config_path.display());
    let settings = if config_path.exists() {
        Settings::load_from(&config_path)?
    } else {
        println!("Status:        not found, using defaults");
        println!("Run `nightbus config --init` to create one.");
        Settings::default()
    };
    println!("Log directory: {}", settings.log_directory.display());
    println!("Tasks file:    {}", settings.tasks_file.display());
    println!("Hosts file:    {}", settings.hosts_file.display());
    println!("Marker:        {}", settings.message_marker);
    println!("Shell:         {}", settings.default_shell);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_config_matches_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, SAMPLE_CONFIG).unwrap();

        let sample = Settings::load_from(&path).unwrap();
        let defaults = Settings::default();
        assert_eq!(sample.log_directory, defaults.log_directory);
        assert_eq!(sample.tasks_file, defaults.tasks_file);
        assert_eq!(sample.hosts_file, defaults.hosts_file);
        assert_eq!(sample.message_marker, defaults.message_marker);
        assert_eq!(sample.default_shell, defaults.default_shell);
        assert!(!sample.continue_on_failure);
    }

    #[tokio::test]
    async fn test_init_writes_sample_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nightbus").join("config.yaml");

        run(Some(&path), false, true).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), SAMPLE_CONFIG);

        std::fs::write(&path, "continue_on_failure: true\n").unwrap();
        run(Some(&path), false, true).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "continue_on_failure: true\n"
        );
    }
}
