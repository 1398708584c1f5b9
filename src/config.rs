use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub operation_timeout: Duration,
    pub default_delivery_time: String,
    pub seed_file: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let timeout_ms: u64 = parse_or_default("OPERATION_TIMEOUT_MS", 15_000)?;
        if timeout_ms == 0 {
            return Err(AppError::Internal(
                "invalid OPERATION_TIMEOUT_MS: must be > 0".to_string(),
            ));
        }

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            operation_timeout: Duration::from_millis(timeout_ms),
            default_delivery_time: env::var("DEFAULT_DELIVERY_TIME")
                .unwrap_or_else(|_| "10:00".to_string()),
            seed_file: env::var("SEED_FILE").ok().filter(|path| !path.trim().is_empty()),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            operation_timeout: Duration::from_secs(15),
            default_delivery_time: "10:00".to_string(),
            seed_file: None,
        }
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
