use crate::auth::{BindConfiguration, DirectoryAuthenticator};
use crate::backend::{HostAddress, Timeouts};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    pub hosts: Vec<String>,
    pub mode: BindMode,
    #[serde(default)]
    pub attrib_filter: String,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BindMode {
    #[serde(rename = "direct_bind")]
    DirectBind {
        base_dn: String,
        bind_template: String,
    },
    #[serde(rename = "search_bind")]
    SearchBind {
        base_dn: String,
        user_filter: String,
    },
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_operation_timeout() -> Option<u64> {
    Some(30)
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["ldap://localhost:389".to_string()],
            mode: BindMode::SearchBind {
                base_dn: "dc=example,dc=com".to_string(),
                user_filter: "(uid=%u)".to_string(),
            },
            attrib_filter: String::new(),
            probe_timeout_secs: default_probe_timeout(),
            operation_timeout_secs: default_operation_timeout(),
        }
    }
}

impl DirectoryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(anyhow!("At least one directory host must be configured"));
        }

        for host in &self.hosts {
            HostAddress::parse(host)?;
        }

        match &self.mode {
            BindMode::DirectBind { bind_template, .. } => {
                if bind_template.is_empty() {
                    return Err(anyhow!("bind_template cannot be empty"));
                }
            }
            BindMode::SearchBind { base_dn, user_filter } => {
                if base_dn.is_empty() {
                    return Err(anyhow!("base_dn is required for search_bind"));
                }
                if user_filter.is_empty() {
                    return Err(anyhow!("user_filter cannot be empty"));
                }
            }
        }

        if self.probe_timeout_secs == 0 {
            return Err(anyhow!("probe_timeout_secs must be greater than 0"));
        }

        if self.operation_timeout_secs == Some(0) {
            return Err(anyhow!("operation_timeout_secs must be greater than 0"));
        }

        Ok(())
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            probe: Duration::from_secs(self.probe_timeout_secs),
            operation: self.operation_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn bind_configuration(&self) -> BindConfiguration {
        match &self.mode {
            BindMode::DirectBind { base_dn, bind_template } => BindConfiguration::DirectBind {
                base_dn: base_dn.clone(),
                bind_template: bind_template.clone(),
                attrib_filter: self.attrib_filter.clone(),
            },
            BindMode::SearchBind { base_dn, user_filter } => BindConfiguration::SearchBind {
                base_dn: base_dn.clone(),
                user_filter: user_filter.clone(),
                attrib_filter: self.attrib_filter.clone(),
            },
        }
    }

    /// Build an authenticator for one credential.
    pub fn authenticator(&self, identity: &str, secret: &str) -> Result<DirectoryAuthenticator> {
        let auth = DirectoryAuthenticator::new(identity, secret, &self.hosts, self.bind_configuration())?
            .with_timeouts(self.timeouts());
        Ok(auth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Authenticator;

    #[test]
    fn parses_search_bind_yaml() {
        let yaml = r#"
hosts:
  - ldap1.example.com
  - ldaps://ldap2.example.com
mode:
  type: search_bind
  base_dn: dc=example,dc=com
  user_filter: (uid=%u)
attrib_filter: (uid=%u)
"#;
        let config: DirectoryConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.probe_timeout_secs, 5);
        assert_eq!(config.operation_timeout_secs, Some(30));

        let auth = config.authenticator("bob", "pw").unwrap();
        assert_eq!(auth.hosts().len(), 2);
        assert!(auth.hosts()[1].is_secure());
        assert_eq!(auth.bind_configuration().attrib_filter(), "(uid=%u)");
        assert!(auth.post_auth_attributes().is_empty());
    }

    #[test]
    fn parses_direct_bind_yaml_with_timeouts() {
        let yaml = r#"
hosts: [ldap1]
mode:
  type: direct_bind
  base_dn: ou=People,dc=example,dc=com
  bind_template: uid=%u,ou=People,dc=example,dc=com
probe_timeout_secs: 2
operation_timeout_secs: ~
"#;
        let config: DirectoryConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        let timeouts = config.timeouts();
        assert_eq!(timeouts.probe, Duration::from_secs(2));
        assert_eq!(timeouts.operation, None);
        assert!(matches!(
            config.bind_configuration(),
            BindConfiguration::DirectBind { ref bind_template, .. } if bind_template == "uid=%u,ou=People,dc=example,dc=com"
        ));
    }

    #[test]
    fn rejects_invalid_configs() {
        let mut config = DirectoryConfig::default();
        config.hosts.clear();
        assert!(config.validate().is_err());

        let mut config = DirectoryConfig::default();
        config.hosts = vec!["gopher://ldap1".to_string()];
        assert!(config.validate().is_err());

        let mut config = DirectoryConfig::default();
        config.mode = BindMode::DirectBind {
            base_dn: String::new(),
            bind_template: String::new(),
        };
        assert!(config.validate().is_err());

        let mut config = DirectoryConfig::default();
        config.probe_timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
