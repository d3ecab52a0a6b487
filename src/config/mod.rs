//! Application configuration loaded from a TOML file.
//!
//! Every field has a serde default so a minimal config file (or none at all)
//! produces a working development setup. Production deployments are expected
//! to set `server.public_url`, `auth.session.secure`, and a persistent
//! database path.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Startup sanity checks that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.session.duration_secs == 0 {
            return Err(ConfigError::Validation(
                "auth.session.duration_secs must be greater than zero".to_string(),
            ));
        }
        if self.auth.state.ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "auth.state.ttl_secs must be greater than zero".to_string(),
            ));
        }
        url::Url::parse(&self.server.public_url).map_err(|e| {
            ConfigError::Validation(format!("server.public_url is not a valid URL: {}", e))
        })?;
        Ok(())
    }

    /// The Assertion Consumer Service URL IdPs post responses to.
    pub fn acs_url(&self) -> String {
        format!(
            "{}/auth/sso/callback",
            self.server.public_url.trim_end_matches('/')
        )
    }

    /// The SP entity ID presented to IdPs. Defaults to the metadata URL.
    pub fn sp_entity_id(&self) -> String {
        self.auth.saml.sp_entity_id.clone().unwrap_or_else(|| {
            format!(
                "{}/saml/metadata",
                self.server.public_url.trim_end_matches('/')
            )
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to bind.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Externally visible base URL (scheme + authority). Used to derive the
    /// ACS URL and default SP entity ID; in containerized deployments this
    /// differs from the bind address.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            public_url: default_public_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite database file path.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_true")]
    pub create_if_missing: bool,

    /// Use WAL journaling (recommended for concurrent readers).
    #[serde(default = "default_true")]
    pub wal_mode: bool,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
            create_if_missing: true,
            wal_mode: true,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub state: StateCookieConfig,
    #[serde(default)]
    pub saml: SamlConfig,
    /// Capacity of the in-process identity-config cache (entries, keyed by
    /// team ID). The cache is invalidated on upsert/delete.
    #[serde(default = "default_config_cache_capacity")]
    pub config_cache_capacity: usize,
}

/// Session cookie configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Cookie name.
    #[serde(default = "default_session_cookie")]
    pub cookie_name: String,

    /// Session duration in seconds.
    #[serde(default = "default_session_duration")]
    pub duration_secs: u64,

    /// Secure cookie (HTTPS only).
    #[serde(default = "default_true")]
    pub secure: bool,

    /// SameSite cookie attribute.
    #[serde(default)]
    pub same_site: SameSite,

    /// Minimum interval between last_active_at touches, in seconds. Touches
    /// inside the interval are skipped to keep validation write-free.
    #[serde(default = "default_touch_interval")]
    pub touch_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_session_cookie(),
            duration_secs: default_session_duration(),
            secure: true,
            same_site: SameSite::default(),
            touch_interval_secs: default_touch_interval(),
        }
    }
}

/// Login-state (`sso_state`) cookie configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateCookieConfig {
    #[serde(default = "default_state_cookie")]
    pub cookie_name: String,

    /// How long a login round trip may take before the state expires.
    #[serde(default = "default_state_ttl")]
    pub ttl_secs: u64,
}

impl Default for StateCookieConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_state_cookie(),
            ttl_secs: default_state_ttl(),
        }
    }
}

/// SAML service-provider configuration shared across teams.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamlConfig {
    /// SP entity ID override. Defaults to `<public_url>/saml/metadata`.
    #[serde(default)]
    pub sp_entity_id: Option<String>,

    /// Sign AuthnRequests and LogoutRequests. Requires `sp_private_key`.
    #[serde(default)]
    pub sign_requests: bool,

    /// SP private key for request signing (PEM).
    #[serde(default)]
    pub sp_private_key: Option<String>,

    /// SP certificate published in SP metadata (PEM). Include when request
    /// signing is enabled so IdPs can verify signatures.
    #[serde(default)]
    pub sp_certificate: Option<String>,

    /// `InResponseTo` validation policy for IdP responses.
    #[serde(default)]
    pub in_response_to: InResponseToPolicy,
}

/// SameSite cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

/// Policy for validating a Response's `InResponseTo` against the
/// AuthnRequest ID issued at login initiation.
///
/// `Never` exists for IdPs that rewrite or drop the attribute; it is NOT the
/// default. `IfPresent` (the default) rejects any mismatch but tolerates
/// absence. `Always` additionally rejects responses that omit the attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InResponseToPolicy {
    Never,
    #[default]
    IfPresent,
    Always,
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_db_path() -> String {
    "quillgate.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_session_cookie() -> String {
    "session".to_string()
}

fn default_session_duration() -> u64 {
    7 * 24 * 60 * 60
}

fn default_touch_interval() -> u64 {
    60
}

fn default_state_cookie() -> String {
    "sso_state".to_string()
}

fn default_state_ttl() -> u64 {
    600
}

fn default_config_cache_capacity() -> usize {
    256
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.listen, "127.0.0.1:8080");
        assert_eq!(config.auth.session.duration_secs, 7 * 24 * 60 * 60);
        assert_eq!(config.auth.state.ttl_secs, 600);
        assert_eq!(config.auth.session.same_site, SameSite::Lax);
        assert_eq!(
            config.auth.saml.in_response_to,
            InResponseToPolicy::IfPresent
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_derived_urls() {
        let mut config = AppConfig::default();
        config.server.public_url = "https://docs.example.com/".to_string();

        assert_eq!(config.acs_url(), "https://docs.example.com/auth/sso/callback");
        assert_eq!(config.sp_entity_id(), "https://docs.example.com/saml/metadata");

        config.auth.saml.sp_entity_id = Some("urn:quillgate:sp".to_string());
        assert_eq!(config.sp_entity_id(), "urn:quillgate:sp");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [server]
            listen = "0.0.0.0:9000"
            public_url = "https://docs.example.com"

            [auth.session]
            duration_secs = 3600
            secure = true
            same_site = "strict"

            [auth.saml]
            in_response_to = "always"
            "#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:9000");
        assert_eq!(config.auth.session.duration_secs, 3600);
        assert_eq!(config.auth.session.same_site, SameSite::Strict);
        assert_eq!(config.auth.saml.in_response_to, InResponseToPolicy::Always);
        // Unset sections fall back to defaults
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_zero_session_duration_rejected() {
        let mut config = AppConfig::default();
        config.auth.session.duration_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_public_url_rejected() {
        let mut config = AppConfig::default();
        config.server.public_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }
}
