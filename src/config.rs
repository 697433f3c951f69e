//! Server configuration from the environment

use crate::chat::TurnConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub turn_timeout: Duration,
    pub max_retries: u32,
    pub system_prompt: Option<String>,
    /// Sessions unused for this long are forgotten
    pub session_idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let turn = TurnConfig::default();
        Self {
            db_path: default_db_path(),
            port: 8000,
            turn_timeout: turn.timeout,
            max_retries: turn.max_retries,
            system_prompt: None,
            session_idle_timeout: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source; malformed numbers fall back
    /// to defaults with a warning
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Self {
            db_path: get("THREADLINE_DB_PATH").map_or(defaults.db_path, PathBuf::from),
            port: parse_or(get("THREADLINE_PORT"), "THREADLINE_PORT", defaults.port),
            turn_timeout: Duration::from_secs(parse_or(
                get("THREADLINE_TURN_TIMEOUT_SECS"),
                "THREADLINE_TURN_TIMEOUT_SECS",
                defaults.turn_timeout.as_secs(),
            )),
            max_retries: parse_or(
                get("THREADLINE_MAX_RETRIES"),
                "THREADLINE_MAX_RETRIES",
                defaults.max_retries,
            ),
            system_prompt: get("THREADLINE_SYSTEM_PROMPT"),
            session_idle_timeout: Duration::from_secs(parse_or(
                get("THREADLINE_SESSION_IDLE_SECS"),
                "THREADLINE_SESSION_IDLE_SECS",
                defaults.session_idle_timeout.as_secs(),
            )),
        }
    }

    pub fn turn_config(&self) -> TurnConfig {
        TurnConfig {
            timeout: self.turn_timeout,
            max_retries: self.max_retries,
            system_prompt: self.system_prompt.clone(),
            ..TurnConfig::default()
        }
    }
}

fn default_db_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".threadline").join("threadline.db")
}

fn parse_or<T: std::str::FromStr + Copy>(value: Option<String>, name: &str, default: T) -> T {
    match value {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(variable = name, value = %raw, "Invalid value, using default");
            default
        }),
        None => default,
    }
}
