//! Configuration management for the Auth Hook Service
//!
//! Loads settings from:
//! 1. Environment variables
//! 2. .env file (local development)
//!
//! # Example
//!
//! ```no_run
//! use auth_hook_service::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     println!("Listening on {}:{}", settings.server.host, settings.server.port);
//!     Ok(())
//! }
//! ```

use crate::models::Locale;
use anyhow::{Context, Result};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::info;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub email: EmailSettings,
    pub hook: HookSettings,
    pub oauth: OAuthExchangeSettings,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self> {
        // Load .env file in development
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
            info!("Loaded .env file for development");
        }

        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        Ok(Settings {
            server: ServerSettings::from_env()?,
            email: EmailSettings::from_env()?,
            hook: HookSettings::from_env()?,
            oauth: OAuthExchangeSettings::from_env()?,
        })
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid SERVER_PORT")?,
        })
    }
}

/// Email service configuration
///
/// An empty `SMTP_HOST` puts the mail sender in no-op mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: String,
    pub use_starttls: bool,
}

impl EmailSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            smtp_host: env::var("SMTP_HOST").unwrap_or_default(),
            smtp_port: env::var("SMTP_PORT")
                .unwrap_or_else(|_| "1025".to_string())
                .parse()
                .context("Invalid SMTP_PORT")?,
            smtp_username: env::var("SMTP_USERNAME").ok(),
            smtp_password: env::var("SMTP_PASSWORD").ok(),
            smtp_from: env::var("SMTP_FROM").unwrap_or_else(|_| "noreply@nova.dev".to_string()),
            use_starttls: env::var("SMTP_USE_STARTTLS")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
        })
    }
}

/// Send-email hook settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookSettings {
    /// Standard-Webhooks secret; signature checks are skipped when unset
    pub secret: Option<String>,
    pub default_site_url: String,
    pub default_locale: Locale,
    pub magiclink_reuse_threshold_secs: i64,
}

impl HookSettings {
    fn from_env() -> Result<Self> {
        let default_locale = match env::var("DEFAULT_LOCALE") {
            Ok(raw) => raw
                .parse::<Locale>()
                .context("Invalid DEFAULT_LOCALE")?,
            Err(_) => Locale::default(),
        };

        let magiclink_reuse_threshold_secs: i64 = env::var("MAGICLINK_REUSE_THRESHOLD_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .context("Invalid MAGICLINK_REUSE_THRESHOLD_SECS")?;
        if magiclink_reuse_threshold_secs < 0
            || TimeDelta::try_seconds(magiclink_reuse_threshold_secs).is_none()
        {
            anyhow::bail!(
                "MAGICLINK_REUSE_THRESHOLD_SECS out of range: {}",
                magiclink_reuse_threshold_secs
            );
        }

        Ok(Self {
            secret: env::var("AUTH_HOOK_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            default_site_url: env::var("SITE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            default_locale,
            magiclink_reuse_threshold_secs,
        })
    }

    /// Reuse threshold as a duration
    pub fn magiclink_reuse_threshold(&self) -> Result<TimeDelta> {
        TimeDelta::try_seconds(self.magiclink_reuse_threshold_secs)
            .filter(|threshold| *threshold >= TimeDelta::zero())
            .context("MAGICLINK_REUSE_THRESHOLD_SECS out of range")
    }
}

/// Authorization-code exchange settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthExchangeSettings {
    pub provider_url: String,
    pub anon_key: Option<String>,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub attempt_timeout_ms: u64,
}

impl OAuthExchangeSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            provider_url: env::var("AUTH_PROVIDER_URL").context("AUTH_PROVIDER_URL must be set")?,
            anon_key: env::var("AUTH_PROVIDER_ANON_KEY").ok(),
            max_retries: env::var("CODE_EXCHANGE_MAX_RETRIES")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .context("Invalid CODE_EXCHANGE_MAX_RETRIES")?,
            base_delay_ms: env::var("CODE_EXCHANGE_BASE_DELAY_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .context("Invalid CODE_EXCHANGE_BASE_DELAY_MS")?,
            attempt_timeout_ms: env::var("CODE_EXCHANGE_ATTEMPT_TIMEOUT_MS")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .context("Invalid CODE_EXCHANGE_ATTEMPT_TIMEOUT_MS")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "SERVER_HOST",
        "SERVER_PORT",
        "SMTP_HOST",
        "SMTP_PORT",
        "AUTH_HOOK_SECRET",
        "SITE_URL",
        "DEFAULT_LOCALE",
        "MAGICLINK_REUSE_THRESHOLD_SECS",
        "AUTH_PROVIDER_URL",
        "CODE_EXCHANGE_MAX_RETRIES",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        env::set_var("AUTH_PROVIDER_URL", "https://auth.example.com");

        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.server.port, 8080);
        assert!(settings.email.smtp_host.is_empty());
        assert_eq!(settings.hook.secret, None);
        assert_eq!(settings.hook.default_locale, Locale::En);
        assert_eq!(settings.hook.magiclink_reuse_threshold_secs, 60);
        assert_eq!(settings.oauth.max_retries, 2);
        assert_eq!(settings.oauth.base_delay_ms, 1000);
        assert_eq!(settings.oauth.attempt_timeout_ms, 10_000);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_missing_provider_url_fails() {
        clear_env();
        let err = Settings::from_env().unwrap_err();
        assert!(err.to_string().contains("AUTH_PROVIDER_URL"));
    }

    #[test]
    #[serial]
    fn test_invalid_numbers_fail_with_context() {
        clear_env();
        env::set_var("AUTH_PROVIDER_URL", "https://auth.example.com");
        env::set_var("MAGICLINK_REUSE_THRESHOLD_SECS", "soon");

        let err = Settings::from_env().unwrap_err();
        assert!(err.to_string().contains("MAGICLINK_REUSE_THRESHOLD_SECS"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_reuse_threshold_out_of_range_fails() {
        for raw in ["-1", "9223372036854775807"] {
            clear_env();
            env::set_var("AUTH_PROVIDER_URL", "https://auth.example.com");
            env::set_var("MAGICLINK_REUSE_THRESHOLD_SECS", raw);

            let err = Settings::from_env().unwrap_err();
            assert!(err.to_string().contains("out of range"), "{raw}: {err}");
        }

        clear_env();
    }

    #[test]
    #[serial]
    fn test_hook_overrides() {
        clear_env();
        env::set_var("AUTH_PROVIDER_URL", "https://auth.example.com");
        env::set_var("AUTH_HOOK_SECRET", "v1,whsec_c2VjcmV0");
        env::set_var("DEFAULT_LOCALE", "pt-BR");
        env::set_var("MAGICLINK_REUSE_THRESHOLD_SECS", "300");

        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.hook.secret.as_deref(), Some("v1,whsec_c2VjcmV0"));
        assert_eq!(settings.hook.default_locale, Locale::Pt);
        assert_eq!(settings.hook.magiclink_reuse_threshold_secs, 300);
        assert_eq!(
            settings.hook.magiclink_reuse_threshold().unwrap(),
            TimeDelta::seconds(300)
        );

        clear_env();
    }
}
