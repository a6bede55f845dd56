//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `PAYMENT_WEBHOOK_SECRET` - Webhook signing secret (min 32 chars, high entropy)
//! - `PAYMENT_SECRET_KEY` - Payment provider API key (see `atelier_services::config`)
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_BASE_URL` - Public URL, used for checkout return links (default: `http://localhost:3000`)
//! - `REVALIDATE_SECRET` - Bearer secret accepted by `POST /api/revalidate`
//! - `FEATURE_WISHLIST` - Enable wishlist routes (default: true)
//! - `FEATURE_NEWSLETTER` - Enable newsletter routes (default: true)
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`
//! - `SMTP_*`, `STORE_CURRENCY`, `WEBHOOK_MAX_RETRIES` - shared settings

use std::net::{IpAddr, SocketAddr};

use secrecy::SecretString;
use url::Url;

use atelier_services::config::{
    ConfigError, EmailConfig, JobSettings, PaymentConfig, get_database_url, get_env_or_default,
    get_flag, get_optional_env, get_parsed_env, get_url, get_validated_secret,
    validate_secret_length, validate_secret_strength,
};

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    pub host: IpAddr,
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: Url,
    /// Shared secret for verifying payment webhook signatures
    pub webhook_secret: SecretString,
    /// Bearer secret for cache revalidation; the endpoint refuses every
    /// request when unset
    pub revalidate_secret: Option<SecretString>,
    pub features: FeatureFlags,
    pub payment: PaymentConfig,
    pub email: Option<EmailConfig>,
    pub jobs: JobSettings,
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
    pub sentry_sample_rate: f32,
    pub sentry_traces_sample_rate: f32,
}

/// Optional storefront features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    pub wishlist: bool,
    pub newsletter: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            wishlist: true,
            newsletter: true,
        }
    }
}

impl FeatureFlags {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            wishlist: get_flag("FEATURE_WISHLIST", true)?,
            newsletter: get_flag("FEATURE_NEWSLETTER", true)?,
        })
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
        let host = get_env_or_default("STOREFRONT_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_HOST".to_string(), e.to_string())
            })?;
        let port = get_parsed_env("STOREFRONT_PORT", 3000_u16)?;
        let base_url = get_url("STOREFRONT_BASE_URL", "http://localhost:3000")?;

        let webhook_secret = get_validated_secret("PAYMENT_WEBHOOK_SECRET")?;
        validate_secret_length(&webhook_secret, "PAYMENT_WEBHOOK_SECRET")?;

        let revalidate_secret = match get_optional_env("REVALIDATE_SECRET") {
            Some(value) => {
                validate_secret_strength(&value, "REVALIDATE_SECRET")?;
                Some(SecretString::from(value))
            }
            None => None,
        };

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            webhook_secret,
            revalidate_secret,
            features: FeatureFlags::from_env()?,
            payment: PaymentConfig::from_env()?,
            email: EmailConfig::from_env()?,
            jobs: JobSettings::from_env()?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: get_parsed_env("SENTRY_SAMPLE_RATE", 1.0)?,
            sentry_traces_sample_rate: get_parsed_env("SENTRY_TRACES_SAMPLE_RATE", 0.1)?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.scheme() == "https"
    }

    /// Absolute URL for a storefront path.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.as_str().trim_end_matches('/'))
    }
}
