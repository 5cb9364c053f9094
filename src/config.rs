//! Environment contract (§6)
//!
//! Parsed eagerly at startup so a missing required key is a fatal startup
//! error (§7), never a panic deep inside a handler.

use crate::error::BridgeError;

/// SSL posture for the durable tier connection, resolved from
/// `DATABASE_SSL_VALIDATE` per the decision table in §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    /// `full` — SSL disabled entirely. Dev-only escape hatch.
    Disabled,
    /// `true` — TLS on, strict certificate validation.
    Strict,
    /// `false` — TLS on, certificate validation off.
    Relaxed,
    /// Unset — platform-aware default (see [`Config::ssl_mode`]).
    PlatformDefault,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub postgres_url: String,
    pub platform_redis_url: String,
    pub webhook_redis_url: String,
    pub database_ssl_validate: Option<String>,
    pub database_ssl_ca: Option<String>,
    pub debug_mode: bool,
}

impl Config {
    /// Load the environment contract, applying `.env` first if present.
    ///
    /// # Errors
    /// Returns [`BridgeError::Startup`] if a required key is missing.
    pub fn from_env() -> Result<Self, BridgeError> {
        let _ = dotenvy::dotenv();

        let postgres_url = required_env("POSTGRES_URL")?;
        let platform_redis_url = required_env("PLATFORM_REDIS_URL")?;
        let webhook_redis_url = required_env("WEBHOOK_REDIS_URL")?;
        let database_ssl_validate = std::env::var("DATABASE_SSL_VALIDATE").ok();
        let database_ssl_ca = std::env::var("DATABASE_SSL_CA").ok();
        let debug_mode = std::env::var("DEBUG_MODE")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            postgres_url,
            platform_redis_url,
            webhook_redis_url,
            database_ssl_validate,
            database_ssl_ca,
            debug_mode,
        })
    }

    /// Resolve `DATABASE_SSL_VALIDATE` into an [`SslMode`] per §6.
    ///
    /// `unset` resolves to a platform-aware default: strict in production,
    /// relaxed in development. Production is detected via `APP_ENV=production`
    /// or a `POSTGRES_URL` host ending in a cloud-managed suffix (the same
    /// heuristic a hosted-Postgres client needs when no explicit flag is
    /// given).
    #[must_use]
    pub fn ssl_mode(&self) -> SslMode {
        match self.database_ssl_validate.as_deref() {
            Some("full") => SslMode::Disabled,
            Some("true") => SslMode::Strict,
            Some("false") => SslMode::Relaxed,
            _ => {
                if self.is_production_like() {
                    SslMode::Strict
                } else {
                    SslMode::Relaxed
                }
            }
        }
    }

    fn is_production_like(&self) -> bool {
        if std::env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false)
        {
            return true;
        }
        const CLOUD_HOST_SUFFIXES: &[&str] = &[
            ".rds.amazonaws.com",
            ".database.azure.com",
            ".sql.cloud",
            ".neon.tech",
            ".supabase.co",
        ];
        CLOUD_HOST_SUFFIXES
            .iter()
            .any(|suffix| self.postgres_url.contains(suffix))
    }
}

fn required_env(key: &str) -> Result<String, BridgeError> {
    std::env::var(key).map_err(|_| BridgeError::Startup(format!("missing required env var {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            postgres_url: "postgres://localhost/app".to_string(),
            platform_redis_url: "redis://localhost".to_string(),
            webhook_redis_url: "redis://localhost".to_string(),
            database_ssl_validate: None,
            database_ssl_ca: None,
            debug_mode: false,
        }
    }

    #[test]
    fn ssl_mode_full_disables() {
        let mut cfg = base_config();
        cfg.database_ssl_validate = Some("full".to_string());
        assert_eq!(cfg.ssl_mode(), SslMode::Disabled);
    }

    #[test]
    fn ssl_mode_true_is_strict() {
        let mut cfg = base_config();
        cfg.database_ssl_validate = Some("true".to_string());
        assert_eq!(cfg.ssl_mode(), SslMode::Strict);
    }

    #[test]
    fn ssl_mode_false_is_relaxed() {
        let mut cfg = base_config();
        cfg.database_ssl_validate = Some("false".to_string());
        assert_eq!(cfg.ssl_mode(), SslMode::Relaxed);
    }

    #[test]
    fn ssl_mode_unset_defaults_relaxed_outside_cloud_and_prod() {
        let cfg = base_config();
        assert_eq!(cfg.ssl_mode(), SslMode::Relaxed);
    }

    #[test]
    fn ssl_mode_unset_detects_cloud_host() {
        let mut cfg = base_config();
        cfg.postgres_url = "postgres://user:pw@mydb.rds.amazonaws.com/app".to_string();
        assert_eq!(cfg.ssl_mode(), SslMode::Strict);
    }
}
