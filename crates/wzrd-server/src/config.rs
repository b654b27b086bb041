//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;
use wzrd_context::DEFAULT_SYSTEM_PROMPT;
use wzrd_voice::{BotConfig, GeminiConfig, LiveKitConfig, DEFAULT_BOT_NAME};

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// LiveKit credentials. Rooms are disabled when `url` is empty.
    #[serde(default)]
    pub livekit: LiveKitConfig,

    /// Multimodal model settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    #[serde(default)]
    pub prompt: PromptConfig,

    #[serde(default)]
    pub bot: BotSection,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "wzrd_voice=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// System prompt settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptConfig {
    /// Prompt used when a conversation has no usable twin persona.
    /// An empty string seeds such conversations without a system message.
    #[serde(default = "default_prompt")]
    pub default: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotSection {
    /// Display name of the bot participant.
    #[serde(default = "default_bot_name")]
    pub name: String,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    7860
}

fn default_db_path() -> String {
    "wzrd.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    wzrd_db::DbRuntimeSettings::default().busy_timeout_ms
}

fn default_pool_max_size() -> u32 {
    wzrd_db::DbRuntimeSettings::default().pool_max_size
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_bot_name() -> String {
    DEFAULT_BOT_NAME.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            default: default_prompt(),
        }
    }
}

impl Default for BotSection {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
        }
    }
}

impl Config {
    pub fn db_settings(&self) -> wzrd_db::DbRuntimeSettings {
        wzrd_db::DbRuntimeSettings {
            busy_timeout_ms: self.database.busy_timeout_ms,
            pool_max_size: self.database.pool_max_size,
        }
    }

    /// Settings shared by every bot session started by this server.
    pub fn bot_config(&self) -> BotConfig {
        BotConfig {
            bot_name: self.bot.name.clone(),
            llm: self.gemini.clone(),
            fallback_prompt: self.prompt.default.clone(),
            ..BotConfig::default()
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `WZRD_HOST` overrides `server.host`
/// - `WZRD_PORT` overrides `server.port`
/// - `WZRD_DB_PATH` overrides `database.path`
/// - `WZRD_LOG_LEVEL` overrides `logging.level`
/// - `WZRD_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `LIVEKIT_URL`, `LIVEKIT_API_KEY`, `LIVEKIT_API_SECRET` override `livekit.*`
/// - `GEMINI_API_KEY` overrides `gemini.api_key`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("WZRD_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("WZRD_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(db_path) = var("WZRD_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = var("WZRD_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("WZRD_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(url) = var("LIVEKIT_URL") {
        config.livekit.url = url;
    }
    if let Some(key) = var("LIVEKIT_API_KEY") {
        config.livekit.api_key = key;
    }
    if let Some(secret) = var("LIVEKIT_API_SECRET") {
        config.livekit.api_secret = secret;
    }
    if let Some(key) = var("GEMINI_API_KEY") {
        config.gemini.api_key = key;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wzrd_types::voice::GeminiVoice;

    #[test]
    fn defaults_apply_without_file() {
        let config = load_config(Some("/nonexistent/wzrd-config.toml")).unwrap();
        assert_eq!(config.database.path, "wzrd.db");
        assert_eq!(config.database.busy_timeout_ms, 5000);
        assert_eq!(config.gemini.model, "gemini-2.0-flash");
        assert_eq!(config.gemini.voice_id, GeminiVoice::Aoede);
        assert_eq!(config.prompt.default, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(config.bot.name, "Gemini Bot");
    }

    #[test]
    fn sections_parse_from_toml() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9000

            [gemini]
            voice_id = "Kore"

            [prompt]
            default = ""
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.gemini.voice_id, GeminiVoice::Kore);
        assert_eq!(config.bot_config().fallback_prompt, "");
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("WZRD_PORT", "8080"),
            ("WZRD_LOG_JSON", "1"),
            ("LIVEKIT_URL", "wss://rooms.example"),
            ("LIVEKIT_API_SECRET", "s3cret"),
            ("GEMINI_API_KEY", "g-key"),
            ("WZRD_HOST", "not-an-ip"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 8080);
        assert!(config.logging.json);
        assert_eq!(config.livekit.url, "wss://rooms.example");
        assert_eq!(config.livekit.api_secret, "s3cret");
        assert_eq!(config.gemini.api_key, "g-key");
        assert_eq!(config.server.host, default_host());
    }
}
