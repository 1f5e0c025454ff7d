//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if a variable is set but malformed.
//! Every variable has a default, so an empty environment is valid.

use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// Units dispatched per trigger by the default plan.
    pub units_per_trigger: usize,
    /// Duration of each simulated unit.
    pub work_duration: Duration,
    pub jobs_file: Option<PathBuf>,
    /// `None` drains for as long as work runs.
    pub drain_timeout: Option<Duration>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let units_per_trigger = parsed_var("DRAINQ_UNITS")?.unwrap_or(3);
        if units_per_trigger == 0 {
            return Err(Error::Config("DRAINQ_UNITS must be at least 1".to_string()));
        }

        Ok(Self {
            listen_addr: parsed_var("DRAINQ_ADDR")?
                .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8080))),
            units_per_trigger,
            work_duration: Duration::from_millis(parsed_var("DRAINQ_WORK_MS")?.unwrap_or(5000)),
            jobs_file: std::env::var("DRAINQ_JOBS_FILE").ok().map(PathBuf::from),
            drain_timeout: parsed_var("DRAINQ_DRAIN_TIMEOUT_SECS")?.map(Duration::from_secs),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn parsed_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid value for {name} ({raw:?}): {e}"))),
        Err(_) => Ok(None),
    }
}
