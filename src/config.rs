//! Runtime configuration loaded from the environment.

use crate::error::ValuationError;
use std::env;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_GOLD_PRICE_PER_GRAM: u64 = 1_250_000;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub gemini: GeminiConfig,
    pub server: ServerConfig,
    pub pricing: PricingConfig,
    pub timeouts: TimeoutConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeminiConfig {
    /// Empty when unset; the capability is then unavailable.
    pub api_key: String,
    pub model: String,
}

impl GeminiConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricingConfig {
    pub gold_price_per_gram: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutConfig {
    pub analysis: Duration,
    pub capability: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

impl From<ConfigError> for ValuationError {
    fn from(e: ConfigError) -> Self {
        ValuationError::Config(e.to_string())
    }
}

impl AppConfig {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match read("PORT").or_else(|| read("API_PORT")) {
            Some(value) => parse_number::<u16>("PORT", "a valid u16", value)?,
            None => DEFAULT_PORT,
        };

        let gold_price_per_gram = match read("GOLD_PRICE_PER_GRAM") {
            Some(value) => {
                let price = parse_number::<u64>("GOLD_PRICE_PER_GRAM", "a positive integer", value.clone())?;
                if price == 0 {
                    return Err(ConfigError::Invalid {
                        key: "GOLD_PRICE_PER_GRAM",
                        expected: "a positive integer",
                        value,
                    });
                }
                price
            }
            None => DEFAULT_GOLD_PRICE_PER_GRAM,
        };

        let analysis = read_secs(&read, "ANALYSIS_TIMEOUT_SECS", 60)?;
        let capability = read_secs(&read, "CAPABILITY_TIMEOUT_SECS", 30)?;

        Ok(Self {
            gemini: GeminiConfig {
                api_key: read("GEMINI_API_KEY").unwrap_or_default(),
                model: read("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            },
            server: ServerConfig { port },
            pricing: PricingConfig { gold_price_per_gram },
            timeouts: TimeoutConfig { analysis, capability },
            telemetry: TelemetryConfig {
                log_level: read("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            },
        })
    }
}

fn parse_number<T: std::str::FromStr>(
    key: &'static str,
    expected: &'static str,
    value: String,
) -> Result<T, ConfigError> {
    value
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid { key, expected, value })
}

fn read_secs<R>(read: &R, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    R: Fn(&str) -> Option<String>,
{
    let secs = match read(key) {
        Some(value) => parse_number::<u64>(key, "a whole number of seconds", value)?,
        None => default,
    };
    if secs == 0 {
        return Err(ConfigError::Invalid {
            key,
            expected: "a whole number of seconds",
            value: "0".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_env_missing() {
        let config = load(&[]).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.gemini.model, "gemini-2.0-flash");
        assert!(!config.gemini.is_configured());
        assert_eq!(config.pricing.gold_price_per_gram, 1_250_000);
        assert_eq!(config.timeouts.analysis, Duration::from_secs(60));
        assert_eq!(config.timeouts.capability, Duration::from_secs(30));
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_api_port_fallback_and_overrides() {
        let config = load(&[
            ("API_PORT", "9090"),
            ("GEMINI_API_KEY", "abc"),
            ("GOLD_PRICE_PER_GRAM", "1300000"),
            ("CAPABILITY_TIMEOUT_SECS", "5"),
        ])
        .unwrap();
        assert_eq!(config.server.port, 9090);
        assert!(config.gemini.is_configured());
        assert_eq!(config.pricing.gold_price_per_gram, 1_300_000);
        assert_eq!(config.timeouts.capability, Duration::from_secs(5));

        let config = load(&[("PORT", "7000"), ("API_PORT", "9090")]).unwrap();
        assert_eq!(config.server.port, 7000);
    }

    #[test]
    fn test_malformed_values_are_errors() {
        assert!(matches!(
            load(&[("PORT", "eighty")]),
            Err(ConfigError::Invalid { key: "PORT", .. })
        ));
        assert!(load(&[("GOLD_PRICE_PER_GRAM", "0")]).is_err());
        assert!(load(&[("GOLD_PRICE_PER_GRAM", "-5")]).is_err());
        assert!(load(&[("ANALYSIS_TIMEOUT_SECS", "0")]).is_err());
    }
}
