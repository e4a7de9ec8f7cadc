use serde::{Deserialize, Serialize};
use sprig_compiler::DEFAULT_DEBOUNCE_MS;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_NAME: &str = "sprig.config.json";

/// Sprig configuration file format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Directory template and package URLs resolve against
    #[serde(default = "default_template_dir")]
    pub template_dir: String,

    /// Delay of `:model` writes and `:lazy` checks, in milliseconds
    #[serde(default = "default_debounce")]
    pub debounce: f64,

    /// Tracing filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Location the router starts at
    #[serde(default = "default_location")]
    pub location: String,
}

fn default_template_dir() -> String {
    "templates".to_string()
}

fn default_debounce() -> f64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_location() -> String {
    "/".to_string()
}

impl Config {
    /// Load `path`, or `sprig.config.json` in `cwd`; defaults when neither exists
    pub fn load(cwd: &Path, path: Option<&Path>) -> anyhow::Result<Self> {
        let config_path = match path {
            Some(path) => cwd.join(path),
            None => cwd.join(DEFAULT_CONFIG_NAME),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|err| anyhow::anyhow!("Invalid {}: {}", config_path.display(), err))?;
            Ok(config)
        } else if path.is_some() {
            Err(anyhow::anyhow!("Config file not found: {}", config_path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Absolute template directory
    pub fn template_dir(&self, cwd: &Path) -> PathBuf {
        cwd.join(&self.template_dir)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            template_dir: default_template_dir(),
            debounce: default_debounce(),
            log_level: default_log_level(),
            location: default_location(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "templateDir": "views",
            "debounce": 120,
            "logLevel": "sprig_compiler=debug",
            "location": "/users"
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.template_dir, "views");
        assert_eq!(config.debounce, 120.0);
        assert_eq!(config.log_level, "sprig_compiler=debug");
        assert_eq!(config.location, "/users");
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: Config = serde_json::from_str(r#"{ "templateDir": "views" }"#).unwrap();
        assert_eq!(config.debounce, DEFAULT_DEBOUNCE_MS);
        assert_eq!(config.location, "/");
    }

    #[test]
    fn test_load_without_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load(dir.path(), None).unwrap(), Config::default());
        assert!(Config::load(dir.path(), Some(Path::new("other.json"))).is_err());
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_CONFIG_NAME), r#"{ "location": "/start" }"#).unwrap();
        let config = Config::load(dir.path(), None).unwrap();
        assert_eq!(config.location, "/start");
        assert_eq!(config.template_dir(dir.path()), dir.path().join("templates"));
    }
}
