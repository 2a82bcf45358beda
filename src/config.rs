use std::{env, path::PathBuf, time::Duration};

use jsonwebtoken::Algorithm;
use secrecy::SecretString;
use thiserror::Error;

const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://localhost:5174";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(&'static str, String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub jwt: JwtConfig,
    pub stripe: StripeConfig,
    pub payments_mock_enabled: bool,
    pub media_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub seed_on_startup: bool,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: SecretString,
    pub algorithm: Algorithm,
    pub expires_in: Duration,
}

/// Stripe settings. Both secrets are optional so the rest of the API can run
/// without a payment processor; the payment routes answer 500 until they are set.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: Option<SecretString>,
    pub webhook_secret: Option<SecretString>,
    pub api_base: String,
    pub currency: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = match env::var("APP_PORT").or_else(|_| env::var("PORT")) {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidEnvVar("APP_PORT", e.to_string()))?,
            Err(_) => 8000,
        };

        let cors_origins = parse_origins(
            &env::var("CORS_ORIGINS").unwrap_or_else(|_| DEFAULT_CORS_ORIGINS.to_string()),
        );

        let jwt = JwtConfig {
            secret: SecretString::from(required("JWT_SECRET")?),
            algorithm: parse_algorithm(
                &env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS256".to_string()),
            )?,
            expires_in: Duration::from_secs(
                parse_or("JWT_ACCESS_TOKEN_EXPIRES_MINUTES", 30u64)? * 60,
            ),
        };

        let stripe = StripeConfig {
            secret_key: optional("STRIPE_SECRET_KEY").map(SecretString::from),
            webhook_secret: optional("STRIPE_WEBHOOK_SECRET").map(SecretString::from),
            api_base: env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            currency: env::var("STRIPE_CURRENCY").unwrap_or_else(|_| "eur".to_string()),
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        };

        Ok(Self {
            database_url,
            host,
            port,
            cors_origins,
            jwt,
            stripe,
            payments_mock_enabled: parse_flag(env::var("PAYMENTS_MOCK_ENABLED").ok().as_deref()),
            media_dir: PathBuf::from(env::var("MEDIA_DIR").unwrap_or_else(|_| "media".to_string())),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            seed_on_startup: parse_flag(env::var("SEED_ON_STARTUP").ok().as_deref()),
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    optional(key).ok_or(ConfigError::MissingEnvVar(key))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key, e.to_string())),
        None => Ok(default),
    }
}

pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_flag(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

/// Tokens are signed with a shared secret, so only the HMAC family is accepted.
pub fn parse_algorithm(raw: &str) -> Result<Algorithm, ConfigError> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(ConfigError::InvalidEnvVar(
            "JWT_ALGORITHM",
            format!("unsupported algorithm {other}"),
        )),
    }
}
