//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STOREFRONT_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 5000)
//! - `STOREFRONT_BASE_URL` - Public URL of the API (default: `http://localhost:5000`)
//! - `FRONTEND_URL` - Origin of the single-page app (default: `http://localhost:3000`)
//! - `CORS_ALLOWED_ORIGINS` - Extra allowed origins, comma separated
//! - `TAX_RATE` - Flat sales tax rate (default: 0.08)
//! - `CURRENCY` - ISO currency code (default: USD)
//! - `DOWNLOADS_DIR` - Directory holding checklist files (default: ./checklists)
//! - `PAYMENT_PROVIDER` - `stripe` or `sandbox` (default: `stripe` when
//!   `STRIPE_SECRET_KEY` is set, otherwise `sandbox`)
//! - `STRIPE_SECRET_KEY` - Stripe API secret key
//! - `STRIPE_WEBHOOK_SECRET` - Stripe webhook signing secret
//! - `STRIPE_API_BASE` - Stripe API base URL (default: `https://api.stripe.com`)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` / `SENTRY_TRACES_SAMPLE_RATE` - Sentry sampling
//! - `LOG_FORMAT` - `json` for structured logs, anything else for text

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

use checklistpro_core::TaxRate;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

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

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of the API
    pub base_url: String,
    /// Origin of the single-page frontend
    pub frontend_url: String,
    /// Additional CORS origins
    pub cors_allowed_origins: Vec<String>,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Pricing settings
    pub checkout: CheckoutConfig,
    /// Directory that stored download references resolve against
    pub downloads_dir: PathBuf,
    /// Payment provider settings
    pub payments: PaymentConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Fraction of errors sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions traced
    pub sentry_traces_sample_rate: f32,
    /// Emit JSON logs
    pub json_logs: bool,
}

/// Pricing settings.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub tax_rate: TaxRate,
    pub currency: String,
}

/// Which payment gateway serves charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentProvider {
    Stripe,
    /// Deterministic in-process gateway for development and tests.
    Sandbox,
}

impl FromStr for PaymentProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stripe" => Ok(Self::Stripe),
            "sandbox" => Ok(Self::Sandbox),
            other => Err(format!("unknown payment provider '{other}'")),
        }
    }
}

/// Payment configuration.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub provider: PaymentProvider,
    /// Present when `provider` is `Stripe`.
    pub stripe: Option<StripeConfig>,
    /// Enables `POST /api/payments/webhook` when set.
    pub webhook_secret: Option<SecretString>,
}

/// Stripe API configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct StripeConfig {
    /// API base URL, overridable for mock servers
    pub api_base: String,
    /// Secret API key
    pub secret_key: SecretString,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("api_base", &self.api_base)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

impl StorefrontConfig {
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

        let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
        let host = get_parsed("STOREFRONT_HOST", "127.0.0.1")?;
        let port = get_parsed("STOREFRONT_PORT", "5000")?;
        let base_url = get_url("STOREFRONT_BASE_URL", "http://localhost:5000")?;
        let frontend_url = get_url("FRONTEND_URL", "http://localhost:3000")?;
        let cors_allowed_origins = get_optional_env("CORS_ALLOWED_ORIGINS")
            .map(|v| parse_origins(&v))
            .transpose()?
            .unwrap_or_default();

        let session_secret = get_validated_secret("STOREFRONT_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "STOREFRONT_SESSION_SECRET")?;

        let checkout = CheckoutConfig {
            tax_rate: get_parsed("TAX_RATE", "0.08")?,
            currency: get_env_or_default("CURRENCY", "USD").to_uppercase(),
        };
        let downloads_dir = PathBuf::from(get_env_or_default("DOWNLOADS_DIR", "./checklists"));
        let payments = PaymentConfig::from_env()?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            frontend_url,
            cors_allowed_origins,
            session_secret,
            checkout,
            downloads_dir,
            payments,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: get_parsed("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: get_parsed("SENTRY_TRACES_SAMPLE_RATE", "0.1")?,
            json_logs: get_optional_env("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` flag.
    #[must_use]
    pub fn is_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }

    /// Every origin allowed to make credentialed CORS requests.
    #[must_use]
    pub fn allowed_origins(&self) -> Vec<String> {
        let mut origins = vec![self.frontend_url.clone()];
        for origin in &self.cors_allowed_origins {
            if !origins.contains(origin) {
                origins.push(origin.clone());
            }
        }
        origins
    }
}

impl PaymentConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let secret_key = get_optional_env("STRIPE_SECRET_KEY");
        let provider = match get_optional_env("PAYMENT_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|e| ConfigError::InvalidEnvVar("PAYMENT_PROVIDER".to_string(), e))?,
            None if secret_key.is_some() => PaymentProvider::Stripe,
            None => PaymentProvider::Sandbox,
        };

        let stripe = match (provider, secret_key) {
            (PaymentProvider::Stripe, Some(key)) => {
                validate_secret_strength(&key, "STRIPE_SECRET_KEY")?;
                Some(StripeConfig {
                    api_base: get_env_or_default("STRIPE_API_BASE", "https://api.stripe.com"),
                    secret_key: SecretString::from(key),
                })
            }
            (PaymentProvider::Stripe, None) => {
                return Err(ConfigError::MissingEnvVar("STRIPE_SECRET_KEY".to_string()));
            }
            (PaymentProvider::Sandbox, _) => None,
        };

        let webhook_secret = get_optional_env("STRIPE_WEBHOOK_SECRET")
            .map(|value| {
                validate_secret_strength(&value, "STRIPE_WEBHOOK_SECRET")?;
                Ok(SecretString::from(value))
            })
            .transpose()?;

        Ok(Self {
            provider,
            stripe,
            webhook_secret,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

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

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable, falling back to `default`.
fn get_parsed<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Read a URL variable and return it without a trailing slash.
fn get_url(key: &str, default: &str) -> Result<String, ConfigError> {
    let value = get_env_or_default(key, default);
    Url::parse(&value).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    Ok(value.trim_end_matches('/').to_string())
}

fn parse_origins(value: &str) -> Result<Vec<String>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(|origin| {
            let url = Url::parse(origin).map_err(|e| {
                ConfigError::InvalidEnvVar("CORS_ALLOWED_ORIGINS".to_string(), e.to_string())
            })?;
            Ok(url.origin().ascii_serialization())
        })
        .collect()
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
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

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> StorefrontConfig {
        StorefrontConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 5000,
            base_url: "http://localhost:5000".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            cors_allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "https://checklistpro.com".to_string(),
            ],
            session_secret: SecretString::from("x".repeat(32)),
            checkout: CheckoutConfig {
                tax_rate: TaxRate::default(),
                currency: "USD".to_string(),
            },
            downloads_dir: PathBuf::from("./checklists"),
            payments: PaymentConfig {
                provider: PaymentProvider::Sandbox,
                stripe: None,
                webhook_secret: None,
            },
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.1,
            json_logs: false,
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        // "ab" has entropy of 1 bit per char (50% a, 50% b)
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-key-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_session_secret_too_short() {
        let secret = SecretString::from("short");
        assert!(validate_session_secret(&secret, "TEST_SESSION").is_err());
    }

    #[test]
    fn test_payment_provider_parse() {
        assert_eq!("Stripe".parse::<PaymentProvider>(), Ok(PaymentProvider::Stripe));
        assert_eq!(" sandbox ".parse::<PaymentProvider>(), Ok(PaymentProvider::Sandbox));
        assert!("paypal".parse::<PaymentProvider>().is_err());
    }

    #[test]
    fn test_parse_origins_normalizes() {
        let origins = parse_origins("https://checklistpro.com/, http://localhost:3000 ,").unwrap();
        assert_eq!(
            origins,
            vec!["https://checklistpro.com", "http://localhost:3000"]
        );
        assert!(parse_origins("not a url").is_err());
    }

    #[test]
    fn test_allowed_origins_deduplicates_frontend() {
        let origins = config().allowed_origins();
        assert_eq!(
            origins,
            vec!["http://localhost:3000", "https://checklistpro.com"]
        );
    }

    #[test]
    fn test_socket_addr_and_https() {
        let config = config();
        assert_eq!(config.socket_addr().port(), 5000);
        assert!(!config.is_https());
    }

    #[test]
    fn test_stripe_config_debug_redacts_secret() {
        let stripe = StripeConfig {
            api_base: "https://api.stripe.com".to_string(),
            secret_key: SecretString::from("sk_test_super_private_value"),
        };
        let debug_output = format!("{stripe:?}");
        assert!(debug_output.contains("api.stripe.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("sk_test_super_private_value"));
    }
}
