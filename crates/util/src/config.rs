use std::{env, fmt, net::SocketAddr, time::Duration};

use line_relay_core::{CandidateSelection, CompletionApi};
use url::Url;

use super::server_bind_address;

pub const DEFAULT_LINE_API_BASE_URL: &str = "https://api.line.me/";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1/";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_LEGACY_MODEL: &str = "gpt-3.5-turbo-instruct";
pub const MAX_COMPLETION_CANDIDATES: u8 = 8;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Credentials and endpoint for the LINE Messaging API.
#[derive(Clone)]
pub struct LineConfig {
    pub channel_access_token: String,
    pub channel_secret: String,
    pub api_base_url: Url,
}

impl fmt::Debug for LineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineConfig")
            .field("channel_access_token", &"<redacted>")
            .field("channel_secret", &"<redacted>")
            .field("api_base_url", &self.api_base_url.as_str())
            .finish()
    }
}

/// Completion provider settings.
#[derive(Clone)]
pub struct CompletionConfig {
    pub api_key: String,
    pub base_url: Url,
    pub model: String,
    pub api: CompletionApi,
    pub candidates: u8,
    pub selection: CandidateSelection,
}

impl fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url.as_str())
            .field("model", &self.model)
            .field("api", &self.api)
            .field("candidates", &self.candidates)
            .field("selection", &self.selection)
            .finish()
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub line: LineConfig,
    pub completion: CompletionConfig,
    pub http_timeout: Option<Duration>,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;

        let line = LineConfig {
            channel_access_token: required(&["LINE_CHANNEL_ACCESS_TOKEN", "CHANNEL_ACCESS_TOKEN"])?,
            channel_secret: required(&["LINE_CHANNEL_SECRET", "CHANNEL_SECRET"])?,
            api_base_url: base_url("LINE_API_BASE_URL", DEFAULT_LINE_API_BASE_URL)?,
        };

        let api: CompletionApi = parsed("OPENAI_API_MODE")?.unwrap_or_default();
        let completion = CompletionConfig {
            api_key: required(&["OPENAI_API_KEY"])?,
            base_url: base_url("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL)?,
            model: optional("OPENAI_MODEL").unwrap_or_else(|| default_model(api).to_string()),
            api,
            candidates: candidate_count()?,
            selection: parsed("COMPLETION_CANDIDATE_SELECTION")?.unwrap_or_default(),
        };

        let http_timeout = parsed::<u64>("HTTP_TIMEOUT_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            bind_addr,
            environment,
            line,
            completion,
            http_timeout,
        })
    }
}

/// Chat models are rejected by `/completions`, so each endpoint gets its own default.
fn default_model(api: CompletionApi) -> &'static str {
    match api {
        CompletionApi::Chat => DEFAULT_CHAT_MODEL,
        CompletionApi::Legacy => DEFAULT_LEGACY_MODEL,
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Reads the first non-empty variable among `names`.
fn required(names: &[&'static str]) -> Result<String, ConfigError> {
    names
        .iter()
        .find_map(|name| optional(name))
        .ok_or(ConfigError::Missing(names[0]))
}

fn parsed<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    optional(name)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue { name, value })
        })
        .transpose()
}

fn base_url(name: &'static str, default: &str) -> Result<Url, ConfigError> {
    let mut value = optional(name).unwrap_or_else(|| default.to_string());
    if !value.ends_with('/') {
        value.push('/');
    }
    Url::parse(&value).map_err(|source| ConfigError::InvalidUrl { name, source })
}

fn candidate_count() -> Result<u8, ConfigError> {
    const NAME: &str = "COMPLETION_CANDIDATES";
    match parsed::<u8>(NAME)? {
        None => Ok(1),
        Some(count) if (1..=MAX_COMPLETION_CANDIDATES).contains(&count) => Ok(count),
        Some(count) => Err(ConfigError::InvalidValue {
            name: NAME,
            value: count.to_string(),
        }),
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    Missing(&'static str),
    InvalidValue { name: &'static str, value: String },
    InvalidUrl {
        name: &'static str,
        source: url::ParseError,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR/PORT value: {err}"),
            Self::Missing(name) => write!(f, "{name} must be set"),
            Self::InvalidValue { name, value } => write!(f, "invalid {name} value: {value}"),
            Self::InvalidUrl { name, source } => write!(f, "invalid {name} url: {source}"),
        }
    }
}

impl std::error::Error for ConfigError {}
