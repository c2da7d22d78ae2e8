use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// GitHub's ceiling for the lifetime of an app JWT.
pub const MAX_JWT_TTL_MINUTES: u32 = 10;

/// Installation tokens live for one hour upstream.
const INSTALLATION_TOKEN_LIFETIME_MINUTES: u32 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

#[derive(Clone, Deserialize)]
pub struct GitHubConfig {
    /// GitHub App ID (found in the app settings page)
    pub app_id: Option<i64>,
    /// The single installation this deployment acts for
    pub installation_id: Option<i64>,
    /// Inline PEM private key; takes precedence over `private_key_path`
    pub private_key: Option<String>,
    /// Path to the PEM private key downloaded from GitHub
    pub private_key_path: Option<PathBuf>,
    /// Shared secret used to sign webhook deliveries
    pub webhook_secret: Option<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// App slug; comments and commits by the app are authored as `<bot_name>[bot]`
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
    #[serde(default = "default_jwt_ttl_minutes")]
    pub jwt_ttl_minutes: u32,
    #[serde(default = "default_token_cache_buffer_minutes")]
    pub token_cache_buffer_minutes: u32,
    /// Timeout applied to every outbound GitHub request
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("GitHubConfig")
            .field("app_id", &self.app_id)
            .field("installation_id", &self.installation_id)
            .field("private_key", &redact(&self.private_key))
            .field("private_key_path", &self.private_key_path)
            .field("webhook_secret", &redact(&self.webhook_secret))
            .field("api_base_url", &self.api_base_url)
            .field("bot_name", &self.bot_name)
            .field("jwt_ttl_minutes", &self.jwt_ttl_minutes)
            .field("token_cache_buffer_minutes", &self.token_cache_buffer_minutes)
            .field("http_timeout_seconds", &self.http_timeout_seconds)
            .finish()
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            installation_id: None,
            private_key: None,
            private_key_path: None,
            webhook_secret: None,
            api_base_url: default_api_base_url(),
            bot_name: default_bot_name(),
            jwt_ttl_minutes: default_jwt_ttl_minutes(),
            token_cache_buffer_minutes: default_token_cache_buffer_minutes(),
            http_timeout_seconds: default_http_timeout_seconds(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_bot_name() -> String {
    "pr-review-bot".to_string()
}

fn default_jwt_ttl_minutes() -> u32 {
    MAX_JWT_TTL_MINUTES
}

fn default_token_cache_buffer_minutes() -> u32 {
    5
}

fn default_http_timeout_seconds() -> u64 {
    30
}

impl GitHubConfig {
    /// App ID, validated to be present.
    pub fn app_id(&self) -> Result<i64, ConfigError> {
        self.app_id.ok_or(ConfigError::Missing("github.app_id"))
    }

    pub fn installation_id(&self) -> Result<i64, ConfigError> {
        self.installation_id
            .ok_or(ConfigError::Missing("github.installation_id"))
    }

    pub fn webhook_secret(&self) -> Result<&str, ConfigError> {
        match self.webhook_secret.as_deref() {
            Some(secret) if !secret.is_empty() => Ok(secret),
            _ => Err(ConfigError::Missing("github.webhook_secret")),
        }
    }

    /// Resolve the private key, preferring the inline value over the file.
    ///
    /// Escaped newlines (`\n` as two characters) are normalized, since keys
    /// passed through environment variables usually arrive that way.
    pub fn private_key_pem(&self) -> Result<String, ConfigError> {
        let raw = match (&self.private_key, &self.private_key_path) {
            (Some(inline), _) if !inline.trim().is_empty() => inline.clone(),
            (_, Some(path)) => {
                info!("Loading private key from {}", path.display());
                std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?
            }
            _ => {
                return Err(ConfigError::Missing(
                    "github.private_key or github.private_key_path",
                ))
            }
        };
        Ok(raw.replace("\\n", "\n"))
    }

    /// Login GitHub uses for commits and comments made by this app.
    pub fn bot_login(&self) -> String {
        format!("{}[bot]", self.bot_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Idle time after which workers above `min_workers` exit
    #[serde(default = "default_keep_alive_seconds")]
    pub keep_alive_seconds: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            min_workers: default_min_workers(),
            max_workers: default_max_workers(),
            queue_capacity: default_queue_capacity(),
            keep_alive_seconds: default_keep_alive_seconds(),
        }
    }
}

fn default_min_workers() -> usize {
    5
}

fn default_max_workers() -> usize {
    10
}

fn default_queue_capacity() -> usize {
    100
}

fn default_keep_alive_seconds() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file (if it exists), apply environment
    /// overrides and validate the result.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            Self::from_toml(&content)?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `GITHUB_*` overrides. The lookup is injected so tests don't have
    /// to touch the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let gh = &mut self.github;
        if let Some(id) = parse_env_id(&lookup, "GITHUB_APP_ID")? {
            gh.app_id = Some(id);
        }
        if let Some(id) = parse_env_id(&lookup, "GITHUB_INSTALLATION_ID")? {
            gh.installation_id = Some(id);
        }
        if let Some(key) = lookup("GITHUB_PRIVATE_KEY") {
            gh.private_key = Some(key);
        }
        if let Some(path) = lookup("GITHUB_PRIVATE_KEY_PATH") {
            gh.private_key_path = Some(PathBuf::from(path));
        }
        if let Some(secret) = lookup("GITHUB_WEBHOOK_SECRET") {
            gh.webhook_secret = Some(secret);
        }
        if let Some(url) = lookup("GITHUB_API_BASE_URL") {
            gh.api_base_url = url;
        }
        if let Some(name) = lookup("GITHUB_BOT_NAME") {
            gh.bot_name = name;
        }
        Ok(())
    }

    /// Check required settings and bounds. Also normalizes `bot_name` and
    /// the API base URL.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let gh = &mut self.github;
        gh.app_id()?;
        gh.installation_id()?;
        gh.webhook_secret()?;
        if gh.private_key.as_deref().map_or(true, |k| k.trim().is_empty())
            && gh.private_key_path.is_none()
        {
            return Err(ConfigError::Missing(
                "github.private_key or github.private_key_path",
            ));
        }

        if gh.jwt_ttl_minutes == 0 || gh.jwt_ttl_minutes > MAX_JWT_TTL_MINUTES {
            return Err(ConfigError::invalid(
                "github.jwt_ttl_minutes",
                format!("must be between 1 and {}", MAX_JWT_TTL_MINUTES),
            ));
        }
        if gh.token_cache_buffer_minutes == 0
            || gh.token_cache_buffer_minutes >= INSTALLATION_TOKEN_LIFETIME_MINUTES
        {
            return Err(ConfigError::invalid(
                "github.token_cache_buffer_minutes",
                format!(
                    "must be greater than 0 and less than {}",
                    INSTALLATION_TOKEN_LIFETIME_MINUTES
                ),
            ));
        }
        if gh.http_timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "github.http_timeout_seconds",
                "must be greater than 0",
            ));
        }

        let base = gh.api_base_url.trim().trim_end_matches('/');
        if !(base.starts_with("https://") || base.starts_with("http://")) {
            return Err(ConfigError::invalid(
                "github.api_base_url",
                "must be an http(s) URL",
            ));
        }
        gh.api_base_url = base.to_string();

        let bot = gh.bot_name.trim();
        let bot = bot.strip_suffix("[bot]").unwrap_or(bot);
        if bot.is_empty() {
            return Err(ConfigError::invalid("github.bot_name", "must not be empty"));
        }
        gh.bot_name = bot.to_string();

        let dispatch = &self.dispatch;
        if dispatch.min_workers == 0 {
            return Err(ConfigError::invalid(
                "dispatch.min_workers",
                "must be at least 1",
            ));
        }
        if dispatch.max_workers < dispatch.min_workers {
            return Err(ConfigError::invalid(
                "dispatch.max_workers",
                "must be greater than or equal to dispatch.min_workers",
            ));
        }
        if dispatch.queue_capacity == 0 {
            return Err(ConfigError::invalid(
                "dispatch.queue_capacity",
                "must be at least 1",
            ));
        }

        Ok(())
    }
}

fn parse_env_id<F>(lookup: &F, key: &'static str) -> Result<Option<i64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::invalid(key, format!("expected an integer, got {:?}", value))),
        None => Ok(None),
    }
}
