//! Layered, thread-safe and optionally auto-reloading configuration.
//!
//! Sources are merged from lowest to highest precedence: registered defaults,
//! an optional YAML file, prefixed environment variables and finally
//! explicit environment aliases (plain variable names such as
//! `SESSION_SECRET` mapped onto a dotted key).

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, mpsc};
use std::thread;
use std::time::Duration;

use config::{Config as RawConfig, Environment, File, Value};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load or parse configuration")]
    Load(#[from] config::ConfigError),

    #[error("Failed to initialize file watcher")]
    Watch(#[from] notify::Error),

    #[error("Required configuration value `{0}` is missing or empty")]
    Missing(String),

    #[error("Configuration lock was poisoned, indicating a panic in another thread")]
    LockPoisoned,
}

#[derive(Debug)]
pub struct Config {
    // Readers share the lock; the reload thread takes it exclusively.
    inner: Arc<RwLock<RawConfig>>,
    // Dropping the watcher stops the reload thread.
    _watcher: Option<RecommendedWatcher>,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    #[cfg(any(test, feature = "testing"))]
    pub fn builder_test() -> test_utils::TestConfigBuilder {
        test_utils::TestConfigBuilder::new()
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        let guard = self.inner.read().map_err(|_| ConfigError::LockPoisoned)?;
        guard.get(key).map_err(ConfigError::from)
    }

    /// Returns `default` when the key is absent. Present but malformed values
    /// are still reported as errors.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            Ok(value) => Ok(value),
            Err(ConfigError::Load(config::ConfigError::NotFound(_))) => Ok(default),
            Err(err) => Err(err),
        }
    }

    /// Fetches a string that must be present and non-blank.
    pub fn require(&self, key: &str) -> Result<String, ConfigError> {
        match self.get::<String>(key) {
            Ok(value) if !value.trim().is_empty() => Ok(value),
            Ok(_) | Err(ConfigError::Load(config::ConfigError::NotFound(_))) => {
                Err(ConfigError::Missing(key.to_string()))
            },
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Sources {
    defaults: Vec<(String, Value)>,
    file: Option<PathBuf>,
    env_prefix: Option<String>,
    list_keys: Vec<String>,
    aliases: Vec<(String, String)>,
}

impl Sources {
    fn load(&self) -> Result<RawConfig, config::ConfigError> {
        let mut builder = RawConfig::builder();

        for (key, value) in &self.defaults {
            builder = builder.set_default(key.as_str(), value.clone())?;
        }

        if let Some(path) = &self.file {
            builder = builder.add_source(File::from(path.as_path()).required(false));
        }

        if let Some(prefix) = &self.env_prefix {
            let mut env = Environment::with_prefix(prefix).separator("__").try_parsing(true);
            if !self.list_keys.is_empty() {
                env = env.list_separator(",");
                for key in &self.list_keys {
                    env = env.with_list_parse_key(key);
                }
            }
            builder = builder.add_source(env);
        }

        for (var, key) in &self.aliases {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    builder = builder.set_override(key.as_str(), value)?;
                }
            }
        }

        builder.build()
    }
}

pub struct ConfigBuilder {
    sources: Sources,
    watch: bool,
    watch_interval: Duration,
}

impl ConfigBuilder {
    fn new() -> Self {
        Self { sources: Sources::default(), watch: false, watch_interval: Duration::from_secs(2) }
    }

    /// Adds an optional YAML file. A missing file is not an error.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.sources.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Reads `PREFIX__SECTION__KEY` environment variables.
    pub fn env_prefix(mut self, prefix: &str) -> Self {
        self.sources.env_prefix = Some(prefix.to_string());
        self
    }

    /// Marks a key whose environment value is a comma separated list.
    pub fn env_list_key(mut self, key: &str) -> Self {
        self.sources.list_keys.push(key.to_string());
        self
    }

    /// Maps a plain environment variable onto a configuration key.
    pub fn env_alias(mut self, var: &str, key: &str) -> Self {
        self.sources.aliases.push((var.to_string(), key.to_string()));
        self
    }

    pub fn default<T: Into<Value>>(mut self, key: &str, value: T) -> Self {
        self.sources.defaults.push((key.to_string(), value.into()));
        self
    }

    pub fn watch(mut self) -> Self {
        self.watch = true;
        self
    }

    pub fn watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        let raw_config = self.sources.load()?;
        let config_arc = Arc::new(RwLock::new(raw_config));
        let mut watcher = None;

        let watched_file = self.sources.file.clone().filter(|path| path.exists());
        if let (true, Some(path)) = (self.watch, watched_file) {
            let sources = self.sources.clone();
            let config_clone = Arc::clone(&config_arc);
            let (tx, rx) = mpsc::channel();

            let mut w = RecommendedWatcher::new(tx, notify::Config::default().with_poll_interval(self.watch_interval))?;
            w.watch(&path, RecursiveMode::NonRecursive)?;

            thread::spawn(move || {
                tracing::info!(path = %path.to_string_lossy(), "Watching configuration file for changes");
                while let Ok(event_result) = rx.recv() {
                    match event_result {
                        Ok(Event { kind: notify::EventKind::Modify(_), .. }) => {
                            tracing::info!("Configuration file changed. Reloading...");
                            match sources.load() {
                                Ok(new_config) => {
                                    if let Ok(mut guard) = config_clone.write() {
                                        *guard = new_config;
                                        tracing::info!("Configuration reloaded successfully.");
                                    } else {
                                        tracing::error!("Failed to acquire write lock for reloading config.");
                                    }
                                },
                                Err(e) => {
                                    tracing::error!("Failed to reload configuration file: {}", e);
                                },
                            }
                        },
                        Err(e) => tracing::error!("File watcher error: {:?}", e),
                        _ => {},
                    }
                }
            });
            watcher = Some(w);
        }

        Ok(Config { inner: config_arc, _watcher: watcher })
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod test_utils {
    use std::collections::HashMap;

    use config::Value;

    use super::*;

    #[derive(Default)]
    pub struct TestConfigBuilder {
        values: HashMap<String, Value>,
    }

    impl TestConfigBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with<T: Into<Value>>(mut self, key: &str, value: T) -> Self {
            self.values.insert(key.to_string(), value.into());
            self
        }

        pub fn build(self) -> Config {
            let mut builder = RawConfig::builder();

            for (key, value) in self.values {
                builder = builder.set_override(key, value).unwrap();
            }

            let raw_config = builder.build().expect("Failed to create config from test values");

            Config { inner: Arc::new(RwLock::new(raw_config)), _watcher: None }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Write;

    use serde::Deserialize;
    use tempfile::NamedTempFile;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct ServerSettings {
        address: String,
        timeout_secs: u64,
    }

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut temp_file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("Failed to create temp file");

        temp_file.write_all(content.as_bytes()).expect("Failed to write to temp file");
        temp_file.flush().expect("Failed to flush temp file");
        temp_file
    }

    #[test]
    fn test_file_values_override_defaults() {
        let temp_file = create_temp_config(
            r#"
            server:
                address: "127.0.0.1:8080"
            "#,
        );

        let config = Config::builder()
            .default("server.address", "0.0.0.0:3000")
            .default("server.timeout_secs", 30)
            .file(temp_file.path())
            .build()
            .expect("Failed to build config");

        let server: ServerSettings = config.get("server").expect("Failed to get server section");
        assert_eq!(server, ServerSettings { address: "127.0.0.1:8080".to_string(), timeout_secs: 30 });
    }

    #[test]
    fn test_missing_file_is_optional() {
        let config = Config::builder()
            .default("server.address", "0.0.0.0:3000")
            .file("/nonexistent/path/config.yaml")
            .build()
            .expect("A missing optional file must not fail");

        assert_eq!(config.get::<String>("server.address").unwrap(), "0.0.0.0:3000");
    }

    #[test]
    fn test_invalid_yaml() {
        let temp_file = create_temp_config(
            r#"
            app_name: "test
            port: [invalid: yaml
            "#,
        );

        let result = Config::builder().file(temp_file.path()).build();

        match result.unwrap_err() {
            ConfigError::Load(_) => {},
            other => panic!("Expected ConfigError::Load, got {:?}", other),
        }
    }

    #[test]
    fn test_env_prefix_overrides_file() {
        let temp_file = create_temp_config(
            r#"
            server:
                address: "127.0.0.1:8080"
            "#,
        );
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("CFGTESTPREFIX__SERVER__ADDRESS", "10.0.0.1:9000") };

        let config = Config::builder()
            .file(temp_file.path())
            .env_prefix("CFGTESTPREFIX")
            .build()
            .expect("Failed to build config");

        assert_eq!(config.get::<String>("server.address").unwrap(), "10.0.0.1:9000");
    }

    #[test]
    fn test_env_list_key() {
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("CFGTESTLIST__OAUTH__GOOGLE__SCOPES", "openid,email") };

        let config = Config::builder()
            .env_prefix("CFGTESTLIST")
            .env_list_key("oauth.google.scopes")
            .build()
            .expect("Failed to build config");

        let scopes: Vec<String> = config.get("oauth.google.scopes").unwrap();
        assert_eq!(scopes, vec!["openid".to_string(), "email".to_string()]);
    }

    #[test]
    fn test_env_alias_has_highest_precedence() {
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("CFGTEST_ALIAS_SECRET", "from-alias") };

        let config = Config::builder()
            .default("session.secret", "from-default")
            .env_alias("CFGTEST_ALIAS_SECRET", "session.secret")
            .env_alias("CFGTEST_ALIAS_UNSET", "session.salt")
            .build()
            .expect("Failed to build config");

        assert_eq!(config.require("session.secret").unwrap(), "from-alias");
        assert!(matches!(config.require("session.salt"), Err(ConfigError::Missing(key)) if key == "session.salt"));
    }

    #[test]
    fn test_get_or_and_require() {
        let config = Config::builder_test()
            .with("server.timeout_secs", 12)
            .with("oauth.google.client_id", "   ")
            .build();

        assert_eq!(config.get_or("server.timeout_secs", 30u64).unwrap(), 12);
        assert_eq!(config.get_or("server.missing_secs", 30u64).unwrap(), 30);
        assert!(matches!(config.require("oauth.google.client_id"), Err(ConfigError::Missing(_))));
        assert!(matches!(config.require("oauth.google.client_secret"), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_get_or_reports_malformed_values() {
        let config = Config::builder_test().with("server.timeout_secs", "soon").build();

        assert!(config.get_or("server.timeout_secs", 30u64).is_err());
    }

    #[test]
    fn test_auto_reload() {
        let temp_file = create_temp_config(
            r#"
            server:
                address: "127.0.0.1:8000"
            "#,
        );

        let config = Config::builder()
            .file(temp_file.path())
            .watch()
            .watch_interval(Duration::from_millis(100))
            .build()
            .expect("Failed to build config with watch");

        assert_eq!(config.get::<String>("server.address").unwrap(), "127.0.0.1:8000");

        fs::write(
            temp_file.path(),
            r#"
            server:
                address: "127.0.0.1:8001"
            "#,
        )
        .expect("Failed to update config file");

        thread::sleep(Duration::from_millis(500));

        assert_eq!(config.get::<String>("server.address").unwrap(), "127.0.0.1:8001");
    }
}
