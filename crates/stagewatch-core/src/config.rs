//! Configuration
//!
//! Loaded from `~/.config/stagewatch/config.toml` (or an explicit path).
//! Every field has a default, so a missing file is not an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::stages::{CatalogError, StageCatalog, DONE_STAGE, PIPELINE_STAGES};

/// Environment variable overriding the backend endpoint
pub const ENDPOINT_ENV: &str = "STAGEWATCH_ENDPOINT";

/// Default pipeline backend locator
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000/query";

/// Errors loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("query parameter name must not be empty")]
    EmptyQueryParam,
    #[error("invalid stage catalog: {0}")]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend URL that streams pipeline events
    pub endpoint: String,
    /// Query-string parameter carrying the question
    pub query_param: String,
    pub connect_timeout_secs: u64,
    /// Ordered stage names the backend emits
    pub stages: Vec<String>,
    /// Stage that ends a query
    pub terminal_stage: String,
    /// Fallback log filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            query_param: "query".to_string(),
            connect_timeout_secs: 10,
            stages: PIPELINE_STAGES.iter().map(|s| s.to_string()).collect(),
            terminal_stage: DONE_STAGE.to_string(),
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("stagewatch").join("config.toml"))
    }

    /// Config file that [`Config::load`] reads, or `None` when defaults apply.
    ///
    /// An explicit path is always returned, existing or not.
    pub fn source_path(path: Option<&Path>) -> Option<PathBuf> {
        match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path().filter(|p| p.exists()),
        }
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the default location is
    /// used if present and defaults otherwise. Nothing is logged here since
    /// the log level itself comes from the loaded config.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = Self::source_path(path) else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `STAGEWATCH_ENDPOINT` if set
    pub fn apply_env(self) -> Self {
        self.with_endpoint_override(std::env::var(ENDPOINT_ENV).ok())
    }

    pub fn with_endpoint_override(mut self, endpoint: Option<String>) -> Self {
        if let Some(endpoint) = endpoint.filter(|e| !e.trim().is_empty()) {
            self.endpoint = endpoint.trim().to_string();
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_url()?;
        if self.query_param.trim().is_empty() {
            return Err(ConfigError::EmptyQueryParam);
        }
        self.catalog()?;
        Ok(())
    }

    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.endpoint).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: self.endpoint.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }
        Ok(url)
    }

    pub fn catalog(&self) -> Result<StageCatalog, ConfigError> {
        Ok(StageCatalog::new(
            self.stages.iter().cloned(),
            &self.terminal_stage,
        )?)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_pipeline() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.catalog().unwrap(), StageCatalog::pipeline());
        assert_eq!(
            config.endpoint_url().unwrap().as_str(),
            "http://127.0.0.1:8000/query"
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            endpoint = "https://pipeline.example.org/query"
            connect_timeout_secs = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.endpoint, "https://pipeline.example.org/query");
        assert_eq!(config.connect_timeout(), Duration::from_secs(3));
        assert_eq!(config.query_param, "query");
        assert_eq!(config.stages.len(), PIPELINE_STAGES.len());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "stages = [\"fetch\", \"rank\"]\nterminal_stage = \"finished\"\nlog_level = \"debug\""
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.terminal(), &"finished");
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_source_path_prefers_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert_eq!(
            Config::source_path(Some(missing.as_path())),
            Some(missing)
        );
        // Without an explicit path only an existing default file is reported
        if let Some(found) = Config::source_path(None) {
            assert!(found.exists());
        }
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let result = Config::load(Some(missing.as_path()));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_invalid_values() {
        let config = Config {
            endpoint: "not a url".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEndpoint { .. })
        ));

        let config = Config {
            endpoint: "ws://127.0.0.1:8000/query".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEndpoint { .. })
        ));

        let config = Config {
            query_param: " ".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::EmptyQueryParam)));

        let config = Config {
            stages: vec!["a".to_string(), "a".to_string()],
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Catalog(_))));
    }

    #[test]
    fn test_endpoint_override() {
        let config = Config::default()
            .with_endpoint_override(Some(" http://10.0.0.2:9000/query ".to_string()));
        assert_eq!(config.endpoint, "http://10.0.0.2:9000/query");

        let config = Config::default().with_endpoint_override(Some("  ".to_string()));
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
    }
}
