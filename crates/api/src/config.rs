//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `TIERLINE_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `SHOPIFY_WEBHOOK_SECRET` - Shared secret used to sign Shopify webhooks
//!
//! ## Optional
//! - `TIERLINE_HOST` - Bind address (default: 127.0.0.1)
//! - `TIERLINE_PORT` - Listen port (default: 3100)
//! - `SHOPIFY_API_VERSION` - API version (default: 2025-01)
//! - `DISCOUNT_SYNC_FAILURE_POLICY` - `keep` or `discard` (default: keep)
//! - `DISCOUNT_CODE_PREFIX` - Prefix for generated checkout codes (default: B2B)
//! - `CATALOG_SYNC_INTERVAL_SECS` - Catalog mirror refresh period, 0 disables (default: 900)
//! - `CART_ABANDON_AFTER_HOURS` - Staleness threshold for draft carts (default: 72)
//! - `LOG_FORMAT` - `json` for structured logs, anything else for text
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate 0.0-1.0 (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Trace sample rate 0.0-1.0 (default: 0.0)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const DEFAULT_API_VERSION: &str = "2025-01";
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
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

/// What to do with a locally minted discount code when Shopify rejects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscountSyncFailurePolicy {
    /// Keep the code (marked `failed`) and still put it in the checkout URL.
    #[default]
    Keep,
    /// Delete the code and check out without a B2B discount.
    Discard,
}

impl std::str::FromStr for DiscountSyncFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "discard" => Ok(Self::Discard),
            other => Err(format!("expected `keep` or `discard`, got `{other}`")),
        }
    }
}

/// API application configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Shopify API settings shared by every merchant
    pub shopify: ShopifyConfig,
    /// Checkout and discount code behaviour
    pub checkout: CheckoutConfig,
    /// Background job schedule
    pub jobs: JobsConfig,
    /// Emit JSON logs instead of text
    pub json_logs: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "production", "staging")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate
    pub sentry_sample_rate: f32,
    /// Sentry performance trace sample rate
    pub sentry_traces_sample_rate: f32,
}

/// Shopify API settings.
///
/// Per-merchant credentials live in the database; this only carries what is
/// shared across tenants. Implements `Debug` manually to redact secrets.
#[derive(Clone)]
pub struct ShopifyConfig {
    /// Shopify API version (e.g., 2025-01)
    pub api_version: String,
    /// App-level secret used to sign webhooks
    pub webhook_secret: SecretString,
}

impl std::fmt::Debug for ShopifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopifyConfig")
            .field("api_version", &self.api_version)
            .field("webhook_secret", &"[REDACTED]")
            .finish()
    }
}

/// Checkout reconciliation settings.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Prefix for generated discount codes
    pub code_prefix: String,
    /// What to do when Shopify rejects a discount code
    pub sync_failure_policy: DiscountSyncFailurePolicy,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            code_prefix: "B2B".to_string(),
            sync_failure_policy: DiscountSyncFailurePolicy::default(),
        }
    }
}

/// Background job schedule.
#[derive(Debug, Clone)]
pub struct JobsConfig {
    /// Catalog mirror refresh period; `None` disables the worker
    pub catalog_sync_interval: Option<Duration>,
    /// Draft carts untouched for this long are marked abandoned
    pub cart_abandon_after: Duration,
}

impl ApiConfig {
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

        let database_url = get_database_url("TIERLINE_DATABASE_URL")?;
        let host = parse_env("TIERLINE_HOST", "127.0.0.1")?;
        let port = parse_env("TIERLINE_PORT", "3100")?;

        let shopify = ShopifyConfig::from_env()?;
        let checkout = CheckoutConfig::from_env()?;
        let jobs = JobsConfig::from_env()?;

        let json_logs = get_optional_env("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json"));

        Ok(Self {
            database_url,
            host,
            port,
            shopify,
            checkout,
            jobs,
            json_logs,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        })
    }

    /// Get the socket address to bind to.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl ShopifyConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_version: get_env_or_default("SHOPIFY_API_VERSION", DEFAULT_API_VERSION),
            webhook_secret: get_validated_secret("SHOPIFY_WEBHOOK_SECRET")?,
        })
    }
}

impl CheckoutConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let code_prefix = get_env_or_default("DISCOUNT_CODE_PREFIX", "B2B");
        if code_prefix.is_empty() || !code_prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::InvalidEnvVar(
                "DISCOUNT_CODE_PREFIX".to_string(),
                "must be non-empty ASCII letters and digits".to_string(),
            ));
        }

        Ok(Self {
            code_prefix: code_prefix.to_ascii_uppercase(),
            sync_failure_policy: parse_env("DISCOUNT_SYNC_FAILURE_POLICY", "keep")?,
        })
    }
}

impl JobsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let sync_secs: u64 = parse_env("CATALOG_SYNC_INTERVAL_SECS", "900")?;
        let abandon_hours: u64 = parse_env("CART_ABANDON_AFTER_HOURS", "72")?;

        Ok(Self {
            catalog_sync_interval: (sync_secs > 0).then(|| Duration::from_secs(sync_secs)),
            cart_abandon_after: Duration::from_secs(abandon_hours * 3600),
        })
    }
}

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) into `T`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
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

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

/// Expose the webhook secret bytes for HMAC verification.
impl ShopifyConfig {
    #[must_use]
    pub fn webhook_secret_bytes(&self) -> &[u8] {
        self.webhook_secret.expose_secret().as_bytes()
    }
}
