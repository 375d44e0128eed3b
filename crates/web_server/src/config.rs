use std::time::Duration;

use anyhow::Context;

use booking_api::BookingApiConfig;

/// Server settings read from the environment (and `.env`)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    pub bind_addr: String,
    /// Booking API client settings
    pub booking_api: BookingApiConfig,
    /// Postgres URL for the promotion ledger; in-memory ledger when absent
    pub database_url: Option<String>,
}

impl ServerConfig {
    /// Reads `BIND_ADDR`, `BOOKING_API_URL`, `BOOKING_API_TIMEOUT_SECS` and `DATABASE_URL`
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = BookingApiConfig::default();

        let timeout = match std::env::var("BOOKING_API_TIMEOUT_SECS") {
            Ok(value) => Duration::from_secs(
                value
                    .parse()
                    .with_context(|| format!("BOOKING_API_TIMEOUT_SECS is not a number: {}", value))?,
            ),
            Err(_) => defaults.timeout,
        };

        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            booking_api: BookingApiConfig {
                base_url: std::env::var("BOOKING_API_URL").unwrap_or(defaults.base_url),
                timeout,
                user_agent: defaults.user_agent,
            },
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
        })
    }
}
