//! Runtime settings read from the environment once at startup.
//!
//! | Env | Default | Description |
//! |-----|---------|-------------|
//! | HOST | 0.0.0.0 | Bind address. |
//! | PORT | 5000 | Listen port. |
//! | ALLOWED_IPS | (empty) | Comma-separated client IPs. Empty disables the gate. |
//! | TRANSCRIPT_LANGUAGES | auto,en,fr,es,de | Ordered language strategies. |
//! | TRANSCRIPT_ERROR_DETAIL | true | Include the last provider error in 404 bodies. |
//! | TRANSCRIPT_TIMEOUT_SECS | 15 | Per-attempt provider timeout. |

use std::time::Duration;

use thiserror::Error;

use crate::gate::Allowlist;
use crate::transcript::LanguageStrategy;

pub const DEFAULT_LANGUAGES: &str = "auto,en,fr,es,de";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(name: &'static str, value: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub allowlist: Allowlist,
    pub strategies: Vec<LanguageStrategy>,
    pub error_detail: bool,
    pub attempt_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST")
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| "0.0.0.0".to_string());

        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| ConfigError::invalid("PORT", &raw, e.to_string()))?,
            None => 5000,
        };

        let allowlist = Allowlist::parse(&lookup("ALLOWED_IPS").unwrap_or_default());

        let languages = lookup("TRANSCRIPT_LANGUAGES").unwrap_or_else(|| DEFAULT_LANGUAGES.to_string());
        let strategies = parse_strategies(&languages)?;

        let error_detail = match lookup("TRANSCRIPT_ERROR_DETAIL") {
            Some(raw) => parse_bool(&raw)
                .ok_or_else(|| ConfigError::invalid("TRANSCRIPT_ERROR_DETAIL", &raw, "expected true or false"))?,
            None => true,
        };

        let attempt_timeout = match lookup("TRANSCRIPT_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                Ok(_) => return Err(ConfigError::invalid("TRANSCRIPT_TIMEOUT_SECS", &raw, "must be positive")),
                Err(e) => return Err(ConfigError::invalid("TRANSCRIPT_TIMEOUT_SECS", &raw, e.to_string())),
            },
            None => Duration::from_secs(15),
        };

        Ok(Config {
            host,
            port,
            allowlist,
            strategies,
            error_detail,
            attempt_timeout,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Every comma-separated tag must parse, and no strategy may appear twice.
fn parse_strategies(raw: &str) -> Result<Vec<LanguageStrategy>, ConfigError> {
    let mut strategies: Vec<LanguageStrategy> = Vec::new();

    for tag in raw.split(',').map(str::trim) {
        let strategy = tag
            .parse::<LanguageStrategy>()
            .map_err(|reason| ConfigError::invalid("TRANSCRIPT_LANGUAGES", raw, reason))?;
        if strategies.contains(&strategy) {
            return Err(ConfigError::invalid(
                "TRANSCRIPT_LANGUAGES",
                raw,
                format!("{} is listed more than once", strategy),
            ));
        }
        strategies.push(strategy);
    }

    if strategies.is_empty() {
        return Err(ConfigError::invalid("TRANSCRIPT_LANGUAGES", raw, "at least one strategy is required"));
    }
    Ok(strategies)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
