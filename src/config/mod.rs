pub mod project;

use crate::error::{M365Error, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "M365_CLI_CONFIG_DIR";

/// How command results are written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Json,
    Text,
    Csv,
    None,
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputMode::Json => "json",
            OutputMode::Text => "text",
            OutputMode::Csv => "csv",
            OutputMode::None => "none",
        };
        f.write_str(name)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub current_connection: Option<String>,

    #[serde(default)]
    pub output: OutputMode,

    /// Ask for missing choices instead of failing
    #[serde(default = "default_prompt")]
    pub prompt: bool,

    #[serde(default)]
    pub log_level: Option<String>,
}

fn default_prompt() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            current_connection: None,
            output: OutputMode::default(),
            prompt: default_prompt(),
            log_level: None,
        }
    }
}

/// Keys accepted by `m365 cli config`
pub const SETTING_KEYS: &[&str] = &["output", "prompt", "log_level"];

impl Config {
    pub fn get_setting(&self, key: &str) -> Result<String> {
        match key {
            "output" => Ok(self.output.to_string()),
            "prompt" => Ok(self.prompt.to_string()),
            "log_level" => Ok(self.log_level.clone().unwrap_or_default()),
            _ => Err(unknown_setting(key)),
        }
    }

    pub fn set_setting(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "output" => {
                self.output = OutputMode::from_str(value, true).map_err(|_| {
                    M365Error::ValidationError(format!(
                        "{} is not a valid output mode. Allowed values are json, text, csv, none",
                        value
                    ))
                })?;
            }
            "prompt" => {
                self.prompt = value.parse().map_err(|_| {
                    M365Error::ValidationError(format!("{} is not a valid boolean", value))
                })?;
            }
            "log_level" => {
                self.log_level = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            _ => return Err(unknown_setting(key)),
        }
        Ok(())
    }
}

fn unknown_setting(key: &str) -> M365Error {
    M365Error::ValidationError(format!(
        "{} is not a valid setting. Allowed values: {}",
        key,
        SETTING_KEYS.join(", ")
    ))
}

/// A stored tenant + app registration used to sign in
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConnectionConfig {
    pub name: String,
    pub tenant_id: String,
    pub app_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(default)]
    pub auth_type: AuthType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// SharePoint root site, e.g. https://contoso.sharepoint.com
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spo_url: Option<String>,

    /// CSOM identity of the tenant object, cached after first lookup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spo_tenant_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    #[default]
    DeviceCode,
    Secret,
}

/// An access token issued for one resource
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Tokens are treated as expired a minute early to absorb clock skew
    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now() + chrono::Duration::seconds(60)
    }
}

/// Token cache structure, one file per connection
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct TokenCache {
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Keyed by resource, e.g. https://graph.microsoft.com
    #[serde(default)]
    pub tokens: HashMap<String, CachedToken>,
}

/// Configuration manager
#[derive(Clone, Debug)]
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            return Self::with_dir(PathBuf::from(dir));
        }

        let project_dirs = ProjectDirs::from("com", "m365-cli", "m365").ok_or_else(|| {
            M365Error::ConfigError("Failed to determine config directory".into())
        })?;

        Self::with_dir(project_dirs.config_dir().to_path_buf())
    }

    /// Use an explicit directory, creating it when missing
    pub fn with_dir(config_dir: PathBuf) -> Result<Self> {
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)?;
        }

        Ok(Self { config_dir })
    }

    pub fn config_dir(&self) -> &PathBuf {
        &self.config_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn connections_file(&self) -> PathBuf {
        self.config_dir.join("connections.toml")
    }

    pub fn token_cache_file(&self, connection_name: &str) -> PathBuf {
        self.config_dir
            .join("cache")
            .join(format!("{}.json", connection_name))
    }

    /// Load main config
    pub fn load_config(&self) -> Result<Config> {
        let config_path = self.config_file();

        if !config_path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(config_path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save main config
    pub fn save_config(&self, config: &Config) -> Result<()> {
        let contents = toml::to_string_pretty(config)
            .map_err(|e| M365Error::ConfigError(format!("Failed to serialize config: {}", e)))?;
        fs::write(self.config_file(), contents)?;
        Ok(())
    }

    pub fn load_connections(&self) -> Result<Vec<ConnectionConfig>> {
        let path = self.connections_file();

        if !path.exists() {
            return Ok(Vec::new());
        }

        #[derive(Deserialize)]
        struct ConnectionsFile {
            #[serde(default)]
            connections: Vec<ConnectionConfig>,
        }

        let contents = fs::read_to_string(path)?;
        let file: ConnectionsFile = toml::from_str(&contents)?;
        Ok(file.connections)
    }

    pub fn save_connections(&self, connections: &[ConnectionConfig]) -> Result<()> {
        #[derive(Serialize)]
        struct ConnectionsFile<'a> {
            connections: &'a [ConnectionConfig],
        }

        let contents = toml::to_string_pretty(&ConnectionsFile { connections }).map_err(|e| {
            M365Error::ConfigError(format!("Failed to serialize connections: {}", e))
        })?;
        fs::write(self.connections_file(), contents)?;
        Ok(())
    }

    /// Add or replace a connection with the same name
    pub fn add_connection(&self, connection: ConnectionConfig) -> Result<()> {
        let mut connections = self.load_connections()?;
        connections.retain(|c| c.name != connection.name);
        connections.push(connection);
        self.save_connections(&connections)
    }

    pub fn get_connection(&self, name: &str) -> Result<ConnectionConfig> {
        self.load_connections()?
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| M365Error::ConnectionNotFound(name.to_string()))
    }

    /// Apply `update` to a stored connection and persist it
    pub fn update_connection<F>(&self, name: &str, update: F) -> Result<ConnectionConfig>
    where
        F: FnOnce(&mut ConnectionConfig),
    {
        let mut connections = self.load_connections()?;
        let connection = connections
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| M365Error::ConnectionNotFound(name.to_string()))?;
        update(connection);
        let updated = connection.clone();
        self.save_connections(&connections)?;
        Ok(updated)
    }

    pub fn get_active_connection(&self) -> Result<Option<ConnectionConfig>> {
        match self.load_config()?.current_connection {
            Some(name) => Ok(Some(self.get_connection(&name)?)),
            None => Ok(None),
        }
    }

    pub fn set_active_connection(&self, name: &str) -> Result<()> {
        self.get_connection(name)?;

        let mut config = self.load_config()?;
        config.current_connection = Some(name.to_string());
        self.save_config(&config)
    }

    /// Remove a connection, its tokens, and the active marker if it pointed here
    pub fn remove_connection(&self, name: &str) -> Result<()> {
        let mut connections = self.load_connections()?;
        let original_len = connections.len();
        connections.retain(|c| c.name != name);

        if connections.len() == original_len {
            return Err(M365Error::ConnectionNotFound(name.to_string()));
        }

        self.save_connections(&connections)?;
        self.delete_token(name)?;

        let mut config = self.load_config()?;
        if config.current_connection.as_deref() == Some(name) {
            config.current_connection = None;
            self.save_config(&config)?;
        }

        Ok(())
    }

    pub fn save_token(&self, connection_name: &str, cache: &TokenCache) -> Result<()> {
        let cache_dir = self.config_dir.join("cache");
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir)?;
        }

        let contents = serde_json::to_string_pretty(cache)?;
        fs::write(self.token_cache_file(connection_name), contents)?;
        Ok(())
    }

    /// Load token cache; a missing file yields an empty cache
    pub fn load_token(&self, connection_name: &str) -> Result<TokenCache> {
        let token_path = self.token_cache_file(connection_name);

        if !token_path.exists() {
            return Ok(TokenCache::default());
        }

        let contents = fs::read_to_string(token_path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn delete_token(&self, connection_name: &str) -> Result<()> {
        let token_path = self.token_cache_file(connection_name);

        if token_path.exists() {
            fs::remove_file(token_path)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(name: &str) -> ConnectionConfig {
        ConnectionConfig {
            name: name.to_string(),
            tenant_id: "contoso.onmicrosoft.com".to_string(),
            app_id: "31359c7f-bd7e-475c-86db-fdb8c937548e".to_string(),
            client_secret: None,
            auth_type: AuthType::DeviceCode,
            description: None,
            spo_url: None,
            spo_tenant_id: None,
        }
    }

    #[test]
    fn test_defaults_when_nothing_saved() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_dir(dir.path().to_path_buf()).unwrap();

        let config = manager.load_config().unwrap();
        assert_eq!(config.output, OutputMode::Json);
        assert!(config.prompt);
        assert!(manager.load_connections().unwrap().is_empty());
        assert!(manager.load_token("contoso").unwrap().tokens.is_empty());
    }

    #[test]
    fn test_remove_active_connection_clears_marker() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_dir(dir.path().to_path_buf()).unwrap();

        manager.add_connection(connection("contoso")).unwrap();
        manager.add_connection(connection("fabrikam")).unwrap();
        manager.set_active_connection("contoso").unwrap();
        manager
            .save_token("contoso", &TokenCache::default())
            .unwrap();

        manager.remove_connection("contoso").unwrap();

        assert!(manager.load_config().unwrap().current_connection.is_none());
        assert!(!manager.token_cache_file("contoso").exists());
        assert_eq!(manager.load_connections().unwrap().len(), 1);
    }

    #[test]
    fn test_update_connection_persists() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_dir(dir.path().to_path_buf()).unwrap();
        manager.add_connection(connection("contoso")).unwrap();

        manager
            .update_connection("contoso", |c| {
                c.spo_url = Some("https://contoso.sharepoint.com".into())
            })
            .unwrap();

        let stored = manager.get_connection("contoso").unwrap();
        assert_eq!(stored.spo_url.as_deref(), Some("https://contoso.sharepoint.com"));
    }

    #[test]
    fn test_unknown_connection() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_dir(dir.path().to_path_buf()).unwrap();

        let err = manager.set_active_connection("nope").unwrap_err();
        assert_eq!(err.to_string(), "Connection 'nope' not found");
    }

    #[test]
    fn test_settings_round_through_keys() {
        let mut config = Config::default();
        config.set_setting("output", "TEXT").unwrap();
        config.set_setting("prompt", "false").unwrap();

        assert_eq!(config.get_setting("output").unwrap(), "text");
        assert_eq!(config.get_setting("prompt").unwrap(), "false");
        assert!(config.set_setting("colour", "red").is_err());
        assert!(config.set_setting("output", "yaml").is_err());
    }
}
