use std::env;

use axum::http::HeaderValue;

use crate::error::AppError;
use crate::models::location::GeoPoint;

/// Nairobi, used when a caller cannot supply a position.
const DEFAULT_LAT: f64 = -1.2921;
const DEFAULT_LNG: f64 = 36.8219;
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:5173";

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub expiry_sweep_secs: u64,
    pub default_location: GeoPoint,
    pub static_dir: String,
    /// Origins allowed to make credentialed cross-origin calls.
    pub allowed_origins: Vec<HeaderValue>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let default_location = GeoPoint::new(
            parse_or_default("DEFAULT_LAT", DEFAULT_LAT)?,
            parse_or_default("DEFAULT_LNG", DEFAULT_LNG)?,
        );
        if !default_location.is_valid() {
            return Err(AppError::Internal(format!(
                "invalid DEFAULT_LAT/DEFAULT_LNG: {default_location:?}"
            )));
        }

        let expiry_sweep_secs = parse_or_default("EXPIRY_SWEEP_SECS", 60)?;
        if expiry_sweep_secs == 0 {
            return Err(AppError::Internal(
                "invalid EXPIRY_SWEEP_SECS: must be > 0".to_string(),
            ));
        }

        let event_buffer_size = parse_or_default("EVENT_BUFFER_SIZE", 1024)?;
        if event_buffer_size == 0 {
            return Err(AppError::Internal(
                "invalid EVENT_BUFFER_SIZE: must be > 0".to_string(),
            ));
        }

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size,
            expiry_sweep_secs,
            default_location,
            static_dir: env::var("STATIC_DIR").unwrap_or_else(|_| "static".to_string()),
            allowed_origins: parse_origins(
                &env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_ALLOWED_ORIGINS.to_string()),
            )?,
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

/// Parses a comma-separated origin list; blank entries are skipped.
pub fn parse_origins(raw: &str) -> Result<Vec<HeaderValue>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|err| {
                AppError::Internal(format!("invalid CORS_ALLOWED_ORIGINS entry {origin}: {err}"))
            })
        })
        .collect()
}
