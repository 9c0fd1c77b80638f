use secrecy::SecretString;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub access_token: SecretString,
    pub bot_agent_id: String,
    pub rtm_url: String,
    pub web_api_url: String,
    pub trigger_word: String,
    pub trigger_reply: String,
    pub ping_interval: Duration,
    pub request_timeout: Duration,
    pub reconnect_max_attempts: u32,
    pub log_level: Level,
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address = parse_or::<SocketAddr>("BIND_ADDRESS", ([0, 0, 0, 0], 8000).into())?;

        let access_token = SecretString::from(required("LIVECHAT_ACCESS_TOKEN")?);
        let bot_agent_id = required("BOT_AGENT_ID")?;

        let rtm_url = std::env::var("RTM_URL")
            .unwrap_or_else(|_| "wss://api.livechatinc.com/v3.0/agent/rtm/ws".to_string());
        let web_api_url = std::env::var("WEB_API_URL")
            .unwrap_or_else(|_| livechat_rtm::web_api::DEFAULT_BASE_URL.to_string());

        let trigger_word = std::env::var("TRIGGER_WORD").unwrap_or_else(|_| "pizza".to_string());
        let trigger_reply = std::env::var("TRIGGER_REPLY")
            .unwrap_or_else(|_| "Someone said pizza? Our menu is on its way!".to_string());
        if trigger_word.is_empty() {
            return Err(ConfigError::InvalidValue(
                "TRIGGER_WORD".to_string(),
                "must not be empty".to_string(),
            ));
        }

        let ping_interval = Duration::from_secs(parse_or("PING_INTERVAL_SECS", 15u64)?);
        if ping_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "PING_INTERVAL_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let request_timeout = Duration::from_secs(parse_or("REQUEST_TIMEOUT_SECS", 15u64)?);
        let reconnect_max_attempts = parse_or("RECONNECT_MAX_ATTEMPTS", 5u32)?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            access_token,
            bot_agent_id,
            rtm_url,
            web_api_url,
            trigger_word,
            trigger_reply,
            ping_interval,
            request_timeout,
            reconnect_max_attempts,
            log_level,
        })
    }
}
