use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub emergency_api_url: String,
    pub emergency_api_token: Option<String>,
    pub request_timeout_ms: u64,
    pub poll_interval_seconds: u64,
    pub lost_after_failures: u32,
    pub max_backoff_multiplier: u32,
    pub geolocation_timeout_ms: u64,
    pub fallback_location_lat: f64,
    pub fallback_location_lng: f64,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            emergency_api_url: "http://localhost:8080/api".to_string(),
            emergency_api_token: None,
            request_timeout_ms: 10_000,
            poll_interval_seconds: 30,
            lost_after_failures: 5,
            max_backoff_multiplier: 4,
            geolocation_timeout_ms: 10_000,
            fallback_location_lat: -1.2921,
            fallback_location_lng: 36.8219,
            port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            emergency_api_url: env::var("EMERGENCY_API_URL")
                .unwrap_or_else(|_| {
                    warn!("EMERGENCY_API_URL not set, using default");
                    defaults.emergency_api_url.clone()
                }),
            emergency_api_token: env::var("EMERGENCY_API_TOKEN")
                .ok()
                .filter(|token| !token.is_empty()),
            request_timeout_ms: parse_or("EMERGENCY_API_TIMEOUT_MS", defaults.request_timeout_ms),
            poll_interval_seconds: parse_or("TRACKER_POLL_INTERVAL_SECONDS", defaults.poll_interval_seconds),
            lost_after_failures: parse_or("TRACKER_LOST_AFTER_FAILURES", defaults.lost_after_failures),
            max_backoff_multiplier: parse_or("TRACKER_MAX_BACKOFF_MULTIPLIER", defaults.max_backoff_multiplier),
            geolocation_timeout_ms: parse_or("TRACKER_GEOLOCATION_TIMEOUT_MS", defaults.geolocation_timeout_ms),
            fallback_location_lat: parse_or("TRACKER_FALLBACK_LAT", defaults.fallback_location_lat),
            fallback_location_lng: parse_or("TRACKER_FALLBACK_LNG", defaults.fallback_location_lng),
            port: parse_or("PORT", defaults.port),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing emergency backend URL");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.emergency_api_url.is_empty()
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
