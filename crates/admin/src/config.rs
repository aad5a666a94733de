//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `GARAGE_JWT_SECRET` - Bearer token signing secret (min 32 chars, high entropy)
//! - `GARAGE_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`; not needed with `GARAGE_STORAGE=memory`)
//!
//! ## Optional
//! - `GARAGE_STORAGE` - `postgres` (default) or `memory`
//! - `GARAGE_DB_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `GARAGE_HOST` - Bind address (default: 127.0.0.1)
//! - `GARAGE_PORT` - Listen port (default: 8000)
//! - `GARAGE_JWT_TTL_MINUTES` - Lifetime of issued tokens (default: 480)
//! - `GARAGE_CORS_ORIGINS` - Comma-separated frontend origins
//! - `GARAGE_LOG_FORMAT` - `text` (default) or `json`
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` / `SENTRY_TRACES_SAMPLE_RATE` - 0.0 to 1.0 (default: 1.0)
//!
//! ## Optional (TLS)
//! - `GARAGE_TLS_CERT` - PEM-encoded certificate chain
//! - `GARAGE_TLS_KEY` - PEM-encoded private key

use std::collections::HashMap;
use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_PORT: &str = "8000";
const DEFAULT_MAX_CONNECTIONS: &str = "10";
const DEFAULT_JWT_TTL_MINUTES: &str = "480";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Where catalog and ledger data live.
#[derive(Clone)]
pub enum StorageConfig {
    /// `PostgreSQL` via a connection pool.
    Postgres {
        /// Connection string (contains password)
        database_url: SecretString,
        /// Pool size upper bound
        max_connections: u32,
    },
    /// Process memory; data is lost on exit.
    Memory,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postgres {
                max_connections, ..
            } => f
                .debug_struct("Postgres")
                .field("database_url", &"[REDACTED]")
                .field("max_connections", max_connections)
                .finish(),
            Self::Memory => f.write_str("Memory"),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event, for log shippers.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'text' or 'json', got '{other}'")),
        }
    }
}

/// Bearer token signing configuration.
///
/// Implements `Debug` manually to redact the secret.
#[derive(Clone)]
pub struct JwtConfig {
    /// HS256 signing secret
    pub secret: SecretString,
    /// Lifetime of issued tokens
    pub ttl_minutes: i64,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"[REDACTED]")
            .field("ttl_minutes", &self.ttl_minutes)
            .finish()
    }
}

impl JwtConfig {
    /// Load token configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the secret is missing or fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_vars(&Vars(env_lookup))
    }

    fn from_vars<F: Fn(&str) -> Option<String>>(vars: &Vars<F>) -> Result<Self, ConfigError> {
        let secret = vars.validated_secret("GARAGE_JWT_SECRET")?;
        validate_secret_length(&secret, "GARAGE_JWT_SECRET")?;
        let ttl_minutes: i64 = vars.parsed("GARAGE_JWT_TTL_MINUTES", DEFAULT_JWT_TTL_MINUTES)?;
        if ttl_minutes <= 0 {
            return Err(ConfigError::InvalidEnvVar(
                "GARAGE_JWT_TTL_MINUTES".to_string(),
                "must be positive".to_string(),
            ));
        }
        Ok(Self {
            secret,
            ttl_minutes,
        })
    }
}

/// TLS configuration for HTTPS.
#[derive(Clone)]
pub struct TlsConfig {
    /// PEM-encoded certificate chain
    pub cert_pem: String,
    /// PEM-encoded private key
    pub key_pem: SecretString,
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("cert_pem", &"[CERTIFICATE]")
            .field("key_pem", &"[REDACTED]")
            .finish()
    }
}

impl TlsConfig {
    fn from_vars<F: Fn(&str) -> Option<String>>(
        vars: &Vars<F>,
    ) -> Result<Option<Self>, ConfigError> {
        let cert_pem = vars.optional("GARAGE_TLS_CERT");
        let key_pem = vars.optional("GARAGE_TLS_KEY");

        match (cert_pem, key_pem) {
            (Some(cert), Some(key)) => Ok(Some(Self {
                cert_pem: cert,
                key_pem: SecretString::from(key),
            })),
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "GARAGE_TLS_*".to_string(),
                "Both GARAGE_TLS_CERT and GARAGE_TLS_KEY must be set together".to_string(),
            )),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct GarageConfig {
    /// Storage backend
    pub storage: StorageConfig,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Bearer token configuration
    pub jwt: JwtConfig,
    /// Origins allowed to call the API from a browser
    pub cors_origins: Vec<String>,
    /// Log output format
    pub log_format: LogFormat,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
    /// TLS configuration for HTTPS (optional)
    pub tls: Option<TlsConfig>,
}

impl GarageConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(env_lookup)
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(lookup);

        let storage = match vars.or_default("GARAGE_STORAGE", "postgres").as_str() {
            "postgres" => StorageConfig::Postgres {
                database_url: vars.database_url("GARAGE_DATABASE_URL")?,
                max_connections: vars.parsed("GARAGE_DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            },
            "memory" => StorageConfig::Memory,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "GARAGE_STORAGE".to_string(),
                    format!("expected 'postgres' or 'memory', got '{other}'"),
                ));
            }
        };
        let host = vars.parsed("GARAGE_HOST", "127.0.0.1")?;
        let port = vars.parsed("GARAGE_PORT", DEFAULT_PORT)?;
        let jwt = JwtConfig::from_vars(&vars)?;
        let cors_origins = parse_origins(&vars.or_default("GARAGE_CORS_ORIGINS", ""))?;
        let log_format = vars.parsed("GARAGE_LOG_FORMAT", "text")?;
        let sentry_dsn = vars.optional("SENTRY_DSN");
        let sentry_environment = vars.optional("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = vars
            .optional("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = vars
            .optional("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let tls = TlsConfig::from_vars(&vars)?;

        Ok(Self {
            storage,
            host,
            port,
            jwt,
            cors_origins,
            log_format,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
            tls,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Read the `PostgreSQL` URL used by the server and the CLI.
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` if neither `GARAGE_DATABASE_URL`
/// nor `DATABASE_URL` is set.
pub fn database_url_from_env() -> Result<SecretString, ConfigError> {
    let _ = dotenvy::dotenv();
    Vars(env_lookup).database_url("GARAGE_DATABASE_URL")
}

// =============================================================================
// Helper Functions
// =============================================================================

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Variable source with the usual accessors.
struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    /// Get an optional variable. Blank values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse a variable (or its default) into `T`.
    fn parsed<T>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.or_default(key, default)
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }

    /// Get database URL with fallback to generic `DATABASE_URL`.
    fn database_url(&self, primary_key: &str) -> Result<SecretString, ConfigError> {
        self.optional(primary_key)
            .or_else(|| self.optional("DATABASE_URL"))
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar(primary_key.to_string()))
    }

    /// Load and validate a secret.
    fn validated_secret(&self, key: &str) -> Result<SecretString, ConfigError> {
        let value = self.required(key)?;
        validate_secret_strength(&value, key)?;
        Ok(SecretString::from(value))
    }
}

/// Split a comma-separated origin list, rejecting anything that is not http(s).
fn parse_origins(raw: &str) -> Result<Vec<String>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            if origin.starts_with("http://") || origin.starts_with("https://") {
                Ok(origin.trim_end_matches('/').to_string())
            } else {
                Err(ConfigError::InvalidEnvVar(
                    "GARAGE_CORS_ORIGINS".to_string(),
                    format!("'{origin}' is not an http(s) origin"),
                ))
            }
        })
        .collect()
}

/// Validate that a signing secret meets minimum length requirements.
fn validate_secret_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_JWT_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_JWT_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}
