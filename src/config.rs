use crate::payments::providers::{MobileMoneyConfig, StripeConfig, WaveConfig};
use anyhow::{anyhow, Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    /// Absent in local runs, which fall back to in-memory stores
    pub database: Option<DatabaseConfig>,
    pub payments: PaymentsConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    /// Origin providers call back on, without a trailing slash
    pub public_origin: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct PaymentsConfig {
    pub provider_timeout_secs: u64,
    pub stripe: Option<StripeConfig>,
    pub wave: Option<WaveConfig>,
    pub mobile_money: Option<MobileMoneyConfig>,
    pub notification_url: Option<String>,
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", name)),
        Err(_) => Ok(default),
    }
}

fn is_http_url(value: &str) -> bool {
    reqwest::Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let server = ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .context("PORT not set")?
                .parse()
                .context("PORT must be a valid number")?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            public_origin: env::var("PUBLIC_ORIGIN")
                .context("PUBLIC_ORIGIN not set")?
                .trim()
                .trim_end_matches('/')
                .to_string(),
            request_timeout_secs: parse_or("REQUEST_TIMEOUT_SECS", 30)?,
        };

        let database = match env::var("DATABASE_URL") {
            Ok(url) => Some(DatabaseConfig {
                url,
                max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 20)?,
            }),
            Err(_) => None,
        };

        let payments = PaymentsConfig {
            provider_timeout_secs: parse_or("PROVIDER_TIMEOUT_SECS", 15)?,
            stripe: StripeConfig::from_env(),
            wave: WaveConfig::from_env(),
            mobile_money: MobileMoneyConfig::from_env(),
            notification_url: env::var("NOTIFICATION_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
        };

        let config = Config {
            server,
            database,
            payments,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        if !is_http_url(&self.server.public_origin) {
            return Err(anyhow!(
                "PUBLIC_ORIGIN must be an absolute http(s) URL, got {}",
                self.server.public_origin
            ));
        }

        if self.server.request_timeout_secs == 0 || self.payments.provider_timeout_secs == 0 {
            return Err(anyhow!("Timeouts must be greater than 0"));
        }

        match &self.database {
            Some(db) => {
                if db.url.trim().is_empty() {
                    return Err(anyhow!("DATABASE_URL cannot be empty"));
                }
                if db.max_connections == 0 {
                    return Err(anyhow!("DATABASE_MAX_CONNECTIONS must be greater than 0"));
                }
            }
            None if self.server.environment == "production" => {
                return Err(anyhow!("DATABASE_URL is required in production"));
            }
            None => {}
        }

        let payments = &self.payments;
        if payments.stripe.is_none() && payments.wave.is_none() && payments.mobile_money.is_none()
        {
            return Err(anyhow!(
                "At least one payment provider must be configured (Stripe, Wave or mobile money)"
            ));
        }

        if let Some(stripe) = &payments.stripe {
            if stripe.secret_key.trim().is_empty() || stripe.webhook_secret.trim().is_empty() {
                return Err(anyhow!("Stripe keys cannot be empty"));
            }
            if stripe.tolerance_secs <= 0 {
                return Err(anyhow!("WEBHOOK_TOLERANCE_SECS must be greater than 0"));
            }
            if stripe.checkout_ttl_minutes < 30 {
                return Err(anyhow!(
                    "CHECKOUT_TTL_MINUTES must be at least 30, got {}",
                    stripe.checkout_ttl_minutes
                ));
            }
        }

        if let Some(wave) = &payments.wave {
            if wave.api_key.trim().is_empty() || wave.webhook_secret.trim().is_empty() {
                return Err(anyhow!("Wave keys cannot be empty"));
            }
        }

        if let Some(mobile_money) = &payments.mobile_money {
            if mobile_money.api_key.trim().is_empty()
                || mobile_money.webhook_secret.trim().is_empty()
            {
                return Err(anyhow!("Mobile money keys cannot be empty"));
            }
            if !is_http_url(&mobile_money.base_url) {
                return Err(anyhow!("MOBILE_MONEY_BASE_URL must be an absolute http(s) URL"));
            }
        }

        if let Some(url) = &payments.notification_url {
            if !is_http_url(url) {
                return Err(anyhow!("NOTIFICATION_URL must be an absolute http(s) URL"));
            }
        }

        Ok(())
    }
}
