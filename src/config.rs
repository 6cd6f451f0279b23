use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::error::AppError;
use crate::models::identity::Identity;
use crate::router::auth::parse_token_table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

/// Matching knobs that vary per deployment.
#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub radius_km: f64,
    pub offer_timeout: Duration,
    pub resolution_buffer_size: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            radius_km: 5.0,
            offer_timeout: Duration::from_secs(15),
            resolution_buffer_size: 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub dispatch: DispatchSettings,
    pub auth_tokens: HashMap<String, Identity>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let defaults = DispatchSettings::default();
        let radius_km: f64 = parse_or_default("DISPATCH_RADIUS_KM", defaults.radius_km)?;
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(AppError::Internal(
                "invalid DISPATCH_RADIUS_KM: must be a positive number".to_string(),
            ));
        }

        let offer_timeout_secs: u64 =
            parse_or_default("OFFER_TIMEOUT_SECS", defaults.offer_timeout.as_secs())?;
        if offer_timeout_secs == 0 {
            return Err(AppError::Internal(
                "invalid OFFER_TIMEOUT_SECS: must be > 0".to_string(),
            ));
        }

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") | Err(_) => LogFormat::Compact,
            Ok(other) => {
                return Err(AppError::Internal(format!(
                    "invalid LOG_FORMAT: {other} (expected compact or json)"
                )));
            }
        };

        let auth_tokens = parse_token_table(&env::var("AUTH_TOKENS").unwrap_or_default())
            .map_err(|err| AppError::Internal(format!("invalid AUTH_TOKENS: {err}")))?;

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            dispatch: DispatchSettings {
                radius_km,
                offer_timeout: Duration::from_secs(offer_timeout_secs),
                resolution_buffer_size: parse_or_default(
                    "RESOLUTION_BUFFER_SIZE",
                    defaults.resolution_buffer_size,
                )?,
            },
            auth_tokens,
        })
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
