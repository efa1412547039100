use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

mod directory_config;

pub use directory_config::{BindMode, DirectoryConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            console: true,
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.directory.validate()?;

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(anyhow!("Invalid log level: {}", self.logging.level));
        }

        if !self.logging.console && self.logging.file.is_none() {
            return Err(anyhow!("Logging needs at least one of console or file"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn save_and_load() {
        let path = std::env::temp_dir().join(format!("dirauth-config-{}.yml", std::process::id()));
        let mut config = Config::default();
        config.directory.hosts = vec!["ldap1".to_string(), "ldap2:1389".to_string()];
        config.logging.level = "debug".to_string();
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.directory.hosts, config.directory.hosts);
        assert_eq!(loaded.logging.level, "debug");
    }

    #[test]
    fn logging_section_is_optional() {
        let yaml = r#"
directory:
  hosts: [ldap1]
  mode:
    type: search_bind
    base_dn: dc=example,dc=com
    user_filter: (uid=%u)
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.console);
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Config::load_from_file("/nonexistent/dirauth.yml").is_err());
    }
}
