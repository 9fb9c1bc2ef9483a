//! Engine configuration

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backend origin, e.g. `https://lis.example.org`
    pub base_url: String,
    /// Path prefix every REST endpoint lives under
    pub api_prefix: String,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
    /// Role names that grant the cascade-delete path
    pub admin_roles: Vec<String>,
    /// Default `EnvFilter` directive for the binary
    pub log_level: String,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With backend origin
    #[inline]
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// With API prefix
    #[inline]
    #[must_use]
    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    /// With request timeout
    #[inline]
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// With admin role names
    #[must_use]
    pub fn with_admin_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.admin_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// With log level directive
    #[inline]
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Request timeout as a `Duration`
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Absolute URL for an endpoint path such as `/storage/rooms`
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let prefix = self.api_prefix.trim_matches('/');
        let path = path.trim_start_matches('/');
        if prefix.is_empty() {
            format!("{base}/{path}")
        } else {
            format!("{base}/{prefix}/{path}")
        }
    }

    /// Parse from TOML text; missing keys keep their defaults
    ///
    /// # Errors
    /// `EngineError::Config` on malformed TOML or invalid values
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// `EngineError::Config` if the file is unreadable or invalid
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Check values are usable
    ///
    /// # Errors
    /// `EngineError::Config` naming the offending key
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.request_timeout_secs == 0 {
            return Err(EngineError::Config("request_timeout_secs must be positive".into()));
        }
        if !self.base_url.is_empty()
            && !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://"))
        {
            return Err(EngineError::Config(format!(
                "base_url must be an http(s) URL, got {}",
                self.base_url
            )));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_prefix: "/rest".to_string(),
            request_timeout_secs: 30,
            admin_roles: vec!["Global Administrator".to_string(), "Admin".to_string()],
            log_level: "info".to_string(),
        }
    }
}

/// The operator on whose behalf the engine acts
///
/// Role resolution happens outside the engine; only the resolved role names
/// are carried here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actor {
    pub roles: Vec<String>,
}

impl Actor {
    /// Actor with the given roles
    #[must_use]
    pub fn with_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether any role is listed in `config.admin_roles`
    #[must_use]
    pub fn is_admin(&self, config: &EngineConfig) -> bool {
        self.roles
            .iter()
            .any(|role| config.admin_roles.iter().any(|admin| admin == role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.api_prefix, "/rest");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn endpoint_joins_cleanly() {
        let config = EngineConfig::new().with_base_url("http://lis:8080/");
        assert_eq!(
            config.endpoint("/storage/shelves/20/can-delete"),
            "http://lis:8080/rest/storage/shelves/20/can-delete"
        );

        let bare = config.with_api_prefix("");
        assert_eq!(bare.endpoint("storage/rooms"), "http://lis:8080/storage/rooms");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            base_url = "https://lis.example.org"
            request_timeout_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.base_url, "https://lis.example.org");
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(config.admin_roles.len(), 2);
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = EngineConfig::from_toml_str("request_timeout_secs = 0").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn admin_detection_uses_configured_roles() {
        let config = EngineConfig::default();
        assert!(Actor::with_roles(["Reception", "Global Administrator"]).is_admin(&config));
        assert!(!Actor::with_roles(["Reception"]).is_admin(&config));

        let custom = config.with_admin_roles(["Storage Manager"]);
        assert!(Actor::with_roles(["Storage Manager"]).is_admin(&custom));
        assert!(!Actor::with_roles(["Admin"]).is_admin(&custom));
    }
}
