use std::env;

use chrono::Duration;

use crate::error::AppError;

const DEV_JWT_SECRET: &str = "drone-delivery-development-secret-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub event_buffer_size: usize,
    pub sweep_interval_secs: u64,
    pub timing: Timing,
    pub jwt_secret: String,
    pub access_token_ttl_minutes: i64,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
}

/// Simulated flight phases, measured from an order's `created_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub dispatch_after: Duration,
    pub deliver_after: Duration,
    pub flight_eta: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            dispatch_after: Duration::seconds(60),
            deliver_after: Duration::seconds(120),
            flight_eta: Duration::seconds(60),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_json: false,
            event_buffer_size: 1024,
            sweep_interval_secs: 10,
            timing: Timing::default(),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            access_token_ttl_minutes: 30,
            database_url: None,
            database_max_connections: 10,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|secret| !secret.trim().is_empty())
            .unwrap_or_else(|| DEV_JWT_SECRET.to_string());

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            sweep_interval_secs: parse_or_default("SWEEP_INTERVAL_SECS", 10)?,
            timing: Timing {
                dispatch_after: Duration::seconds(parse_or_default("DISPATCH_AFTER_SECS", 60)?),
                deliver_after: Duration::seconds(parse_or_default("DELIVER_AFTER_SECS", 120)?),
                flight_eta: Duration::seconds(parse_or_default("FLIGHT_ETA_SECS", 60)?),
            },
            jwt_secret,
            access_token_ttl_minutes: parse_or_default("ACCESS_TOKEN_TTL_MINUTES", 30)?,
            database_url: env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            database_max_connections: parse_or_default("DATABASE_MAX_CONNECTIONS", 10)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn uses_development_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.sweep_interval_secs == 0 {
            return Err(AppError::Internal(
                "SWEEP_INTERVAL_SECS must be > 0".to_string(),
            ));
        }
        if self.event_buffer_size == 0 {
            return Err(AppError::Internal("EVENT_BUFFER_SIZE must be > 0".to_string()));
        }
        if self.database_max_connections == 0 {
            return Err(AppError::Internal(
                "DATABASE_MAX_CONNECTIONS must be > 0".to_string(),
            ));
        }
        if self.access_token_ttl_minutes <= 0 {
            return Err(AppError::Internal(
                "ACCESS_TOKEN_TTL_MINUTES must be > 0".to_string(),
            ));
        }

        let timing = &self.timing;
        if timing.dispatch_after <= Duration::zero() || timing.flight_eta <= Duration::zero() {
            return Err(AppError::Internal(
                "DISPATCH_AFTER_SECS and FLIGHT_ETA_SECS must be > 0".to_string(),
            ));
        }
        if timing.deliver_after <= timing.dispatch_after {
            return Err(AppError::Internal(
                "DELIVER_AFTER_SECS must be greater than DISPATCH_AFTER_SECS".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::{Config, Timing};

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sweep_interval_secs, 10);
        assert_eq!(config.timing.dispatch_after, Duration::seconds(60));
        assert_eq!(config.timing.deliver_after, Duration::seconds(120));
    }

    #[test]
    fn delivery_threshold_must_follow_dispatch_threshold() {
        let config = Config {
            timing: Timing {
                dispatch_after: Duration::seconds(120),
                deliver_after: Duration::seconds(60),
                flight_eta: Duration::seconds(60),
            },
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn defaults_keep_orders_in_memory() {
        let config = Config::default();
        assert!(config.database_url.is_none());
        assert!(config.database_max_connections > 0);
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let config = Config {
            sweep_interval_secs: 0,
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }
}
