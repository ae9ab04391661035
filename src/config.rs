//! Configuration module for the Anime Catalog API
//!
//! Handles loading environment variables and application configuration.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// JWT signing key (raw bytes)
    pub jwt_secret: Vec<u8>,
    /// Token lifetime in seconds
    pub token_validity_seconds: i64,
    /// Token lifetime in seconds for "remember me" logins
    pub remember_me_validity_seconds: i64,
    /// Public base URL used in email links
    pub base_url: String,
    /// SMTP configuration for sending emails
    pub smtp: Option<SmtpConfig>,
    /// Time to live of cached users in seconds
    pub user_cache_ttl_seconds: u64,
    /// Maximum number of cached users per cache
    pub user_cache_capacity: u64,
    /// Local hour (0-23) at which stale registrations are purged
    pub cleanup_hour: u32,
}

/// SMTP configuration for email sending
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// SMTP server host
    pub host: String,
    /// SMTP server port
    pub port: u16,
    /// SMTP username
    pub username: String,
    /// SMTP password
    pub password: String,
    /// Sender email address
    pub from_email: String,
    /// Sender name
    pub from_name: String,
}

impl Config {
    /// Load configuration from `.env` and the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = match (lookup("JWT_BASE64_SECRET"), lookup("JWT_SECRET")) {
            (Some(encoded), _) => BASE64
                .decode(encoded.trim())
                .map_err(|_| ConfigError::Invalid {
                    name: "JWT_BASE64_SECRET",
                    value: "<not base64>".to_string(),
                })?,
            (None, Some(plain)) => plain.into_bytes(),
            (None, None) => return Err(ConfigError::Missing("JWT_SECRET")),
        };
        if jwt_secret.is_empty() {
            return Err(ConfigError::Missing("JWT_SECRET"));
        }

        // SMTP is enabled only when every required variable is present
        let smtp = match (
            lookup("SMTP_HOST"),
            lookup("SMTP_PORT"),
            lookup("SMTP_USERNAME"),
            lookup("SMTP_PASSWORD"),
            lookup("SMTP_FROM_EMAIL"),
        ) {
            (Some(host), Some(port), Some(username), Some(password), Some(from_email)) => {
                Some(SmtpConfig {
                    host,
                    port: parse_value("SMTP_PORT", &port)?,
                    username,
                    password,
                    from_email,
                    from_name: lookup("SMTP_FROM_NAME")
                        .unwrap_or_else(|| "Anime Catalog".to_string()),
                })
            }
            _ => None,
        };

        let cleanup_hour = parse_or(&lookup, "CLEANUP_HOUR", 1u32)?;
        if cleanup_hour > 23 {
            return Err(ConfigError::Invalid {
                name: "CLEANUP_HOUR",
                value: cleanup_hour.to_string(),
            });
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(&lookup, "PORT", 8080)?,
            jwt_secret,
            token_validity_seconds: parse_or(&lookup, "JWT_TOKEN_VALIDITY_SECONDS", 86_400)?,
            remember_me_validity_seconds: parse_or(
                &lookup,
                "JWT_REMEMBER_ME_VALIDITY_SECONDS",
                2_592_000,
            )?,
            base_url: lookup("APP_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            smtp,
            user_cache_ttl_seconds: parse_or(&lookup, "USER_CACHE_TTL_SECONDS", 3600)?,
            user_cache_capacity: parse_or(&lookup, "USER_CACHE_CAPACITY", 1000)?,
            cleanup_hour,
        })
    }
}

fn parse_value<T: FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: raw.to_string(),
    })
}

fn parse_or<T, F>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => parse_value(name, &raw),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    const BASE: &[(&str, &str)] = &[
        ("DATABASE_URL", "postgres://localhost/anime"),
        ("JWT_SECRET", "plain-secret"),
    ];

    #[test]
    fn test_defaults() {
        let config = load(BASE).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.jwt_secret, b"plain-secret".to_vec());
        assert_eq!(config.token_validity_seconds, 86_400);
        assert_eq!(config.remember_me_validity_seconds, 2_592_000);
        assert_eq!(config.base_url, "http://localhost:8080");
        assert!(config.smtp.is_none());
        assert_eq!(config.user_cache_ttl_seconds, 3600);
        assert_eq!(config.user_cache_capacity, 1000);
        assert_eq!(config.cleanup_hour, 1);
    }

    #[test]
    fn test_missing_database_url() {
        let err = load(&[("JWT_SECRET", "x")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
        assert_eq!(err.to_string(), "DATABASE_URL must be set");
    }

    #[test]
    fn test_missing_secret() {
        let err = load(&[("DATABASE_URL", "postgres://x")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("JWT_SECRET"));
    }

    #[test]
    fn test_base64_secret_takes_precedence() {
        let mut vars = BASE.to_vec();
        vars.push(("JWT_BASE64_SECRET", "c2VjcmV0LWJ5dGVz"));
        let config = load(&vars).unwrap();
        assert_eq!(config.jwt_secret, b"secret-bytes".to_vec());
    }

    #[test]
    fn test_invalid_base64_secret() {
        let err = load(&[("DATABASE_URL", "postgres://x"), ("JWT_BASE64_SECRET", "!!!")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "JWT_BASE64_SECRET", .. }));
    }

    #[test]
    fn test_invalid_port() {
        let mut vars = BASE.to_vec();
        vars.push(("PORT", "eighty"));
        let err = load(&vars).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                name: "PORT",
                value: "eighty".to_string()
            }
        );
    }

    #[test]
    fn test_cleanup_hour_out_of_range() {
        let mut vars = BASE.to_vec();
        vars.push(("CLEANUP_HOUR", "24"));
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_smtp_requires_all_variables() {
        let mut vars = BASE.to_vec();
        vars.push(("SMTP_HOST", "smtp.example.com"));
        assert!(load(&vars).unwrap().smtp.is_none());

        vars.extend_from_slice(&[
            ("SMTP_PORT", "587"),
            ("SMTP_USERNAME", "mailer"),
            ("SMTP_PASSWORD", "hunter2"),
            ("SMTP_FROM_EMAIL", "noreply@example.com"),
        ]);
        let smtp = load(&vars).unwrap().smtp.expect("SMTP should be configured");
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.from_name, "Anime Catalog");
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let mut vars = BASE.to_vec();
        vars.push(("APP_BASE_URL", "https://anime.example.com/"));
        assert_eq!(load(&vars).unwrap().base_url, "https://anime.example.com");
    }
}
