//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use analytics::EngineSchedule;
use domain::Money;
use saga::FulfillmentSettings;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for JSON lines, anything else for human-readable output
/// - `DATABASE_URL`: PostgreSQL broker when set, in-memory broker otherwise
/// - `RANDOM_SEED`: seed of the simulated collaborators (default: from entropy)
/// - `HIGH_VALUE_THRESHOLD`: orders above it are declined (default: `10000.00`)
/// - `SIMULATED_LATENCY`: `false`/`0`/`off` disables the artificial delays
/// - `ANALYTICS_PUNCTUATE_SECS`: window close check interval (default: `10`)
/// - `ANALYTICS_CHECKPOINT_SECS`: analytics checkpoint interval (default: `30`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub random_seed: Option<u64>,
    pub high_value_threshold: Money,
    pub simulated_latency: bool,
    pub analytics_punctuate_secs: u64,
    pub analytics_checkpoint_secs: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            random_seed: parsed(&lookup, "RANDOM_SEED"),
            high_value_threshold: parsed(&lookup, "HIGH_VALUE_THRESHOLD")
                .unwrap_or(defaults.high_value_threshold),
            simulated_latency: lookup("SIMULATED_LATENCY")
                .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "off" | "no"))
                .unwrap_or(defaults.simulated_latency),
            analytics_punctuate_secs: parsed(&lookup, "ANALYTICS_PUNCTUATE_SECS")
                .unwrap_or(defaults.analytics_punctuate_secs),
            analytics_checkpoint_secs: parsed(&lookup, "ANALYTICS_CHECKPOINT_SECS")
                .unwrap_or(defaults.analytics_checkpoint_secs),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn fulfillment_settings(&self) -> FulfillmentSettings {
        FulfillmentSettings {
            high_value_threshold: self.high_value_threshold,
            ..FulfillmentSettings::default()
        }
    }

    pub fn engine_schedule(&self) -> EngineSchedule {
        EngineSchedule {
            punctuate_every: Duration::from_secs(self.analytics_punctuate_secs.max(1)),
            checkpoint_every: Duration::from_secs(self.analytics_checkpoint_secs.max(1)),
            ..EngineSchedule::default()
        }
    }
}

/// Parses a variable; unparsable values count as unset.
fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    lookup(name).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            random_seed: None,
            high_value_threshold: Money::from_dollars(10_000),
            simulated_latency: true,
            analytics_punctuate_secs: 10,
            analytics_checkpoint_secs: 30,
        }
    }
}
