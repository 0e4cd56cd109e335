//! Mirror configuration.

use repligit::Credentials;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("environment variable {0} is not set")]
    MissingEnv(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// One side of a mirror.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Remote {
    /// Repository URL, e.g. `https://github.com/org/repo.git`.
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Name of the environment variable holding the password or token.
    #[serde(default)]
    pub password_env: Option<String>,
}

impl Remote {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password_env: None,
        }
    }

    /// Resolves credentials, reading the password from the environment.
    pub fn credentials(&self) -> Result<Option<Credentials>> {
        self.credentials_with(|var| std::env::var(var).ok())
    }

    fn credentials_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Credentials>> {
        let password = match &self.password_env {
            Some(var) => Some(lookup(var).ok_or_else(|| ConfigError::MissingEnv(var.clone()))?),
            None => None,
        };
        let credentials = Credentials::new(self.username.clone(), password);
        Ok((!credentials.is_empty()).then_some(credentials))
    }

    fn validate(&self, side: &str) -> Result<()> {
        if self.url.is_empty() {
            return Err(ConfigError::Invalid(format!("{side} url is empty")));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "{side} url must be http or https, got {}",
                self.url
            )));
        }
        Ok(())
    }
}

/// What to mirror and where.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MirrorConfig {
    pub source: Remote,
    pub destination: Remote,
    /// Full ref names to mirror.
    pub refs: Vec<String>,
}

impl MirrorConfig {
    /// Loads a configuration from a YAML file.
    pub fn load_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Parses and validates a YAML configuration.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: MirrorConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        self.source.validate("source")?;
        self.destination.validate("destination")?;

        if self.refs.is_empty() {
            return Err(ConfigError::Invalid("no refs to mirror".into()));
        }
        if let Some(bad) = self.refs.iter().find(|r| !r.starts_with("refs/")) {
            return Err(ConfigError::Invalid(format!(
                "ref {bad} must be a full name starting with refs/"
            )));
        }
        Ok(())
    }
}
