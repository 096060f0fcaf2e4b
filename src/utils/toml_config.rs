//! TOML-based configuration for tokengate
//!
//! Server and authentication settings live in `tokengate.toml`. The secret
//! itself is never written to the file; the file names the environment
//! variable that holds it.
//!
//! # Hot Reloading
//!
//! `ConfigManager` can watch the file and, when it changes, push the new
//! `token_expiration` into an attached [`AuthMiddleware`].

use crate::auth::{AuthMiddleware, TokenExpiration};
use arc_swap::ArcSwap;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Root configuration structure loaded from tokengate.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenGateConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

// ============= Server Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

// ============= Authentication Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Environment variable name containing the token secret
    #[serde(default = "default_jwt_secret_env")]
    pub jwt_secret_env: String,

    /// Lifetime of newly issued tokens, e.g. "24h" or 3600 (seconds)
    #[serde(default)]
    pub token_expiration: TokenExpiration,

    /// Largest request body searched for a token, in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
}

fn default_jwt_secret_env() -> String {
    "JWT_SECRET".to_string()
}

fn default_body_limit() -> usize {
    crate::auth::middleware::DEFAULT_BODY_LIMIT
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret_env: default_jwt_secret_env(),
            token_expiration: TokenExpiration::default(),
            body_limit: default_body_limit(),
        }
    }
}

// ============= Configuration Loading & Validation =============

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),
}

impl TokenGateConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: TokenGateConfig = toml::from_str(&content)?;

        config.validate()?;

        Ok(config)
    }

    /// Check values that serde cannot check on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret_env.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.jwt_secret_env must name an environment variable".to_string(),
            ));
        }
        if self.auth.body_limit == 0 {
            return Err(ConfigError::ValidationError(
                "auth.body_limit must be greater than zero".to_string(),
            ));
        }
        if self.auth.token_expiration.as_millis() <= 0 {
            return Err(ConfigError::ValidationError(format!(
                "auth.token_expiration must be positive, got '{}'",
                self.auth.token_expiration
            )));
        }
        Ok(())
    }

    /// Get the token secret from the environment
    pub fn jwt_secret(&self) -> Result<String, ConfigError> {
        std::env::var(&self.auth.jwt_secret_env)
            .ok()
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(self.auth.jwt_secret_env.clone()))
    }

    /// Build a middleware from this configuration
    pub fn build_auth(&self) -> Result<AuthMiddleware, ConfigError> {
        let auth = AuthMiddleware::new(self.jwt_secret()?).with_body_limit(self.auth.body_limit);
        auth.set_token_expiration(self.auth.token_expiration.clone());
        Ok(auth)
    }

    /// Socket address string for the server
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

// ============= Hot Reloading Configuration Manager =============

/// Thread-safe configuration manager with hot reloading support
pub struct ConfigManager {
    config: Arc<ArcSwap<TokenGateConfig>>,
    config_path: PathBuf,
    watcher: RwLock<Option<RecommendedWatcher>>,
    auth: Option<AuthMiddleware>,
}

impl ConfigManager {
    /// Create a new configuration manager and load the initial config
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        // Convert to absolute path for reliable file watching
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(ConfigError::ReadError)?
                .join(path)
        };

        let config = TokenGateConfig::load(&path)?;

        Ok(Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: path,
            watcher: RwLock::new(None),
            auth: None,
        })
    }

    /// Create a config manager directly from a config (useful for testing)
    /// This won't have file watching capabilities.
    pub fn from_config(config: TokenGateConfig) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: PathBuf::from("tokengate.toml"),
            watcher: RwLock::new(None),
            auth: None,
        }
    }

    /// Keep `auth`'s token expiration in step with the file
    pub fn attach(&mut self, auth: AuthMiddleware) {
        self.auth = Some(auth);
    }

    /// Get the current configuration (lockless read)
    pub fn config(&self) -> Arc<TokenGateConfig> {
        self.config.load_full()
    }

    /// Manually reload the configuration from disk
    pub fn reload(&self) -> Result<(), ConfigError> {
        info!("Reloading configuration from {:?}", self.config_path);

        let new_config = TokenGateConfig::load(&self.config_path)?;
        apply(&self.config, self.auth.as_ref(), new_config);

        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Start watching for configuration file changes
    pub fn start_watching(&self) -> Result<(), ConfigError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        let config_path = self.config_path.clone();
        let config_arc = Arc::clone(&self.config);
        let auth = self.auth.clone();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        // Debounced in the receiver
                        let _ = tx.send(());
                    }
                }
                Err(e) => {
                    error!("Config watcher error: {:?}", e);
                }
            }
        })?;

        // Editors often replace the file, so watch the directory
        if let Some(parent) = self.config_path.parent() {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
        }

        *self.watcher.write() = Some(watcher);

        tokio::spawn(async move {
            let mut last_reload: Option<std::time::Instant> = None;
            let debounce_duration = Duration::from_millis(500);

            while rx.recv().await.is_some() {
                if last_reload.is_some_and(|at| at.elapsed() < debounce_duration) {
                    continue;
                }

                // Wait a bit for file write to complete
                tokio::time::sleep(Duration::from_millis(100)).await;

                match TokenGateConfig::load(&config_path) {
                    Ok(new_config) => {
                        apply(&config_arc, auth.as_ref(), new_config);
                        info!("Configuration hot-reloaded successfully");
                        last_reload = Some(std::time::Instant::now());
                    }
                    Err(e) => {
                        warn!(
                            "Failed to hot-reload config: {}. Keeping previous config.",
                            e
                        );
                    }
                }
            }
        });

        info!("Configuration hot-reload watcher started");
        Ok(())
    }

    /// Stop watching for configuration changes
    pub fn stop_watching(&self) {
        *self.watcher.write() = None;
        info!("Configuration hot-reload watcher stopped");
    }
}

fn apply(
    config: &ArcSwap<TokenGateConfig>,
    auth: Option<&AuthMiddleware>,
    new_config: TokenGateConfig,
) {
    if let Some(auth) = auth {
        if auth.token_expiration() != new_config.auth.token_expiration {
            info!(
                token_expiration = %new_config.auth.token_expiration,
                "Applying new token expiration"
            );
            auth.set_token_expiration(new_config.auth.token_expiration.clone());
        }
    }
    config.store(Arc::new(new_config));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn create_test_config() -> String {
        r#"
[server]
host = "0.0.0.0"
port = 8080
log_level = "debug"

[auth]
jwt_secret_env = "TOKENGATE_TEST_SECRET"
token_expiration = "2h"
"#
        .to_string()
    }

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(content.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn test_parse_config() {
        let config: TokenGateConfig =
            toml::from_str(&create_test_config()).expect("Failed to parse config");

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.auth.jwt_secret_env, "TOKENGATE_TEST_SECRET");
        assert_eq!(config.auth.token_expiration.as_millis(), 7_200_000);
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: TokenGateConfig = toml::from_str("").expect("empty config is valid");

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.auth.jwt_secret_env, "JWT_SECRET");
        assert_eq!(config.auth.token_expiration.as_str(), "24h");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_numeric_expiration_is_seconds() {
        let config: TokenGateConfig =
            toml::from_str("[auth]\ntoken_expiration = 900\n").expect("should parse");
        assert_eq!(config.auth.token_expiration.as_millis(), 900_000);
    }

    #[test]
    fn test_bad_expiration_fails_to_parse() {
        let result = toml::from_str::<TokenGateConfig>("[auth]\ntoken_expiration = \"later\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_non_positive_expiration() {
        let config: TokenGateConfig =
            toml::from_str("[auth]\ntoken_expiration = \"-5m\"\n").expect("should parse");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let result = TokenGateConfig::load("/definitely/not/here/tokengate.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(&create_test_config());
        let config = TokenGateConfig::load(file.path()).expect("should load");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_missing_secret_env() {
        let mut config = TokenGateConfig::default();
        config.auth.jwt_secret_env = "TOKENGATE_TEST_SECRET_THAT_IS_NEVER_SET".to_string();
        assert!(matches!(
            config.jwt_secret(),
            Err(ConfigError::MissingEnvVar(_))
        ));
        assert!(config.build_auth().is_err());
    }

    #[test]
    fn test_build_auth_applies_expiration() {
        std::env::set_var("TOKENGATE_TEST_BUILD_SECRET", "secret-value");
        let mut config = TokenGateConfig::default();
        config.auth.jwt_secret_env = "TOKENGATE_TEST_BUILD_SECRET".to_string();
        config.auth.token_expiration = TokenExpiration::parse("15m").unwrap();

        let auth = config.build_auth().expect("should build");
        assert_eq!(auth.token_expiration().as_str(), "15m");
    }

    #[test]
    fn test_reload_pushes_expiration_to_attached_middleware() {
        let file = write_config("[auth]\ntoken_expiration = \"1h\"\n");
        let mut manager = ConfigManager::new(file.path()).expect("should load");
        let auth = AuthMiddleware::new("secret");
        manager.attach(auth.clone());

        fs::write(file.path(), "[auth]\ntoken_expiration = \"3h\"\n").unwrap();
        manager.reload().expect("should reload");

        assert_eq!(manager.config().auth.token_expiration.as_str(), "3h");
        assert_eq!(auth.token_expiration().as_str(), "3h");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_watcher_applies_changes_until_stopped() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tokengate.toml");
        fs::write(&path, "[auth]\ntoken_expiration = \"1h\"\n").unwrap();

        let mut manager = ConfigManager::new(&path).expect("should load");
        let auth = AuthMiddleware::new("secret");
        manager.attach(auth.clone());
        manager.start_watching().expect("should watch");

        fs::write(&path, "[auth]\ntoken_expiration = \"3h\"\n").unwrap();
        let mut applied = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if auth.token_expiration().as_str() == "3h" {
                applied = true;
                break;
            }
        }
        assert!(applied, "watcher should apply the new expiration");
        assert_eq!(manager.config().auth.token_expiration.as_str(), "3h");

        // Let events from the first write drain past the debounce window.
        tokio::time::sleep(Duration::from_millis(700)).await;
        manager.stop_watching();

        fs::write(&path, "[auth]\ntoken_expiration = \"9h\"\n").unwrap();
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(auth.token_expiration().as_str(), "3h");
        assert_eq!(manager.config().auth.token_expiration.as_str(), "3h");
    }

    #[test]
    fn test_failed_reload_keeps_previous_config() {
        let file = write_config("[auth]\ntoken_expiration = \"1h\"\n");
        let manager = ConfigManager::new(file.path()).expect("should load");

        fs::write(file.path(), "[auth]\ntoken_expiration = \"never\"\n").unwrap();
        assert!(manager.reload().is_err());
        assert_eq!(manager.config().auth.token_expiration.as_str(), "1h");
    }
}
