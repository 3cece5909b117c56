//! Gateway configuration module
//!
//! Provides configuration for reaching the remote data gateway: the base
//! URL of its REST surface, an already-established bearer token, and the
//! push dispatch endpoint. Values can be set programmatically through the
//! builder, read from the environment, or loaded from a TOML file under
//! the user config directory with environment overrides.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

const ENV_BASE_URL: &str = "MARKETCHAT_GATEWAY_URL";
const ENV_TOKEN: &str = "MARKETCHAT_GATEWAY_TOKEN";
const ENV_PUSH_URL: &str = "MARKETCHAT_PUSH_URL";

/// Remote gateway connection configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    base_url: String,
    bearer_token: Option<String>,
    push_url: Option<String>,
}

impl GatewayConfig {
    /// Create a new GatewayConfigBuilder
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    /// Build a configuration from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = GatewayConfigBuilder::default();
        if let Ok(url) = std::env::var(ENV_BASE_URL) {
            builder = builder.base_url(url);
        }
        if let Ok(token) = std::env::var(ENV_TOKEN) {
            builder = builder.bearer_token(token);
        }
        if let Ok(push) = std::env::var(ENV_PUSH_URL) {
            builder = builder.push_url(push);
        }
        builder.build()
    }

    /// Load configuration from the default config file, then apply
    /// environment overrides. Falls back to environment-only when no
    /// file exists.
    pub fn load() -> Result<Self, ConfigError> {
        let path = dirs::config_dir().map(|dir| dir.join("marketchat").join("config.toml"));
        match path {
            Some(path) if path.exists() => Self::load_from_path(&path),
            _ => Self::from_env(),
        }
    }

    /// Load configuration from a specific TOML file, then apply
    /// environment overrides
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let file: ConfigFile = toml::from_str(&raw)?;

        let mut builder = GatewayConfigBuilder::default();
        if let Some(url) = file.gateway.base_url {
            builder = builder.base_url(url);
        }
        if let Some(token) = file.gateway.bearer_token {
            builder = builder.bearer_token(token);
        }
        if let Some(push) = file.gateway.push_url {
            builder = builder.push_url(push);
        }

        // Environment wins over the file
        if let Ok(url) = std::env::var(ENV_BASE_URL) {
            builder = builder.base_url(url);
        }
        if let Ok(token) = std::env::var(ENV_TOKEN) {
            builder = builder.bearer_token(token);
        }
        if let Ok(push) = std::env::var(ENV_PUSH_URL) {
            builder = builder.push_url(push);
        }
        builder.build()
    }

    /// Base URL of the gateway REST surface, without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Bearer token presented on every gateway call, if configured
    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }

    /// Build a full URL for an API path
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Endpoint push messages are dispatched to
    pub fn push_url(&self) -> String {
        self.push_url
            .clone()
            .unwrap_or_else(|| self.api_url("/push/send"))
    }
}

/// Builder for GatewayConfig
#[derive(Debug, Default)]
pub struct GatewayConfigBuilder {
    base_url: Option<String>,
    bearer_token: Option<String>,
    push_url: Option<String>,
}

impl GatewayConfigBuilder {
    /// Set the gateway base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the bearer token
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Set the push dispatch endpoint
    pub fn push_url(mut self, url: impl Into<String>) -> Self {
        self.push_url = Some(url.into());
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<GatewayConfig, ConfigError> {
        let base_url = self.base_url.ok_or(ConfigError::MissingValue("base_url"))?;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::InvalidUrl(base_url));
        }
        Ok(GatewayConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token: self.bearer_token,
            push_url: self.push_url,
        })
    }
}

/// On-disk configuration file shape
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    gateway: ConfigFileGateway,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFileGateway {
    base_url: Option<String>,
    bearer_token: Option<String>,
    push_url: Option<String>,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("config file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_base_url() {
        let err = GatewayConfig::builder().build().unwrap_err();
        assert!(matches!(err, ConfigError::MissingValue("base_url")));
    }

    #[test]
    fn test_builder_rejects_bad_scheme() {
        let err = GatewayConfig::builder().base_url("ftp://nope").build().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl(_)));
    }

    #[test]
    fn test_api_url_and_trailing_slash() {
        let config = GatewayConfig::builder()
            .base_url("https://gateway.example.com/")
            .build()
            .unwrap();
        assert_eq!(config.base_url(), "https://gateway.example.com");
        assert_eq!(
            config.api_url("/conversations"),
            "https://gateway.example.com/conversations"
        );
    }

    #[test]
    fn test_push_url_default() {
        let config = GatewayConfig::builder()
            .base_url("https://gateway.example.com")
            .build()
            .unwrap();
        assert_eq!(config.push_url(), "https://gateway.example.com/push/send");

        let config = GatewayConfig::builder()
            .base_url("https://gateway.example.com")
            .push_url("https://push.example.com/send")
            .build()
            .unwrap();
        assert_eq!(config.push_url(), "https://push.example.com/send");
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[gateway]\nbase_url = \"https://gateway.example.com\"\nbearer_token = \"tok\"\n",
        )
        .unwrap();

        let config = GatewayConfig::load_from_path(&path).unwrap();
        assert_eq!(config.base_url(), "https://gateway.example.com");
        assert_eq!(config.bearer_token(), Some("tok"));
    }
}
