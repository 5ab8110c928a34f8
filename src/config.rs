use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone)]
pub struct Config {
    // Redis
    pub redis_url: String,

    // Server
    pub bind_addr: SocketAddr,

    // TTLs (in seconds)
    pub nonce_ttl_secs: u64,
    pub session_ttl_secs: u64,

    // Rate limiting
    pub rate_limit_auth_per_min: u32,

    // Cookies
    pub cookie_secure: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("redis_url", &"[REDACTED]")
            .field("bind_addr", &self.bind_addr)
            .field("nonce_ttl_secs", &self.nonce_ttl_secs)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("rate_limit_auth_per_min", &self.rate_limit_auth_per_min)
            .field("cookie_secure", &self.cookie_secure)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // .env is optional; production sets variables directly
        let _ = dotenvy::dotenv();

        // Redis is required to prevent silent unauthenticated connections
        let redis_url =
            env::var("REDIS_URL").map_err(|_| ConfigError::MissingVar("REDIS_URL".to_string()))?;

        let bind_addr_str = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::ParseError("BIND_ADDR".to_string(), e.to_string()))?;

        let nonce_ttl_secs = parse_env_or_default("NONCE_TTL_SECS", 300)?;
        let session_ttl_secs = parse_env_or_default("SESSION_TTL_SECS", 43_200)?;
        if nonce_ttl_secs == 0 || session_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "NONCE_TTL_SECS/SESSION_TTL_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let rate_limit_auth_per_min = parse_env_or_default("RATE_LIMIT_AUTH_PER_MIN", 10)?;
        let cookie_secure = parse_env_or_default("COOKIE_SECURE", true)?;

        Ok(Config {
            redis_url,
            bind_addr,
            nonce_ttl_secs,
            session_ttl_secs,
            rate_limit_auth_per_min,
            cookie_secure,
        })
    }
}

/// Client-side configuration for the sign-in controller and CLI.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Directory holding the persistent session cache.
    pub state_dir: PathBuf,
    pub cache_ttl_secs: u64,
    pub http_timeout_secs: u64,
    pub nonce_retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            state_dir: PathBuf::from(".predikt"),
            cache_ttl_secs: 43_200,
            http_timeout_secs: 30,
            nonce_retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Load client configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let base_url = env::var("PREDIKT_BASE_URL").unwrap_or(defaults.base_url);
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue(
                "PREDIKT_BASE_URL".to_string(),
                "must start with http:// or https://".to_string(),
            ));
        }

        let state_dir = env::var("PREDIKT_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.state_dir);

        let max_attempts = parse_env_or_default("NONCE_RETRY_ATTEMPTS", 1u32)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "NONCE_RETRY_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let backoff_ms = parse_env_or_default("NONCE_RETRY_BACKOFF_MS", 250u64)?;

        Ok(ClientConfig {
            base_url,
            state_dir,
            cache_ttl_secs: parse_env_or_default("CACHE_TTL_SECS", defaults.cache_ttl_secs)?,
            http_timeout_secs: parse_env_or_default(
                "HTTP_TIMEOUT_SECS",
                defaults.http_timeout_secs,
            )?,
            nonce_retry: RetryPolicy {
                max_attempts,
                initial_backoff: Duration::from_millis(backoff_ms),
                ..RetryPolicy::default()
            },
        })
    }
}

/// Bounded retry for the nonce request. `max_attempts == 1` means no retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry (1-based), doubling each time and capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        std::cmp::min(self.initial_backoff.saturating_mul(factor), self.max_backoff)
    }
}

/// Helper function to parse environment variable with a default value
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| ConfigError::ParseError(key.to_string(), format!("{}: {}", e, val))),
        Err(_) => Ok(default),
    }
}
