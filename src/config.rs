//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

/// Wizard service configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct WizardConfig {
    /// Port for the HTTP/WebSocket server.
    pub port: u16,
    /// Path of the libSQL database holding the persisted wizard snapshot.
    pub db_path: PathBuf,
    /// Simulated latency of the submission endpoint.
    pub submit_delay: Duration,
    /// Simulated latency of the country list lookup.
    pub country_latency: Duration,
    /// Simulated latency of the state list lookup.
    pub state_latency: Duration,
    /// How long lookup results stay fresh in the cache.
    pub lookup_ttl: Duration,
    /// Countdown on the success screen before returning home.
    pub success_redirect: Duration,
    /// Directory for daily-rotated log files, written in addition to the
    /// console. Console only when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: PathBuf::from("./data/signup-wizard.db"),
            submit_delay: Duration::from_millis(2000),
            country_latency: Duration::from_millis(1000),
            state_latency: Duration::from_millis(300),
            lookup_ttl: Duration::from_secs(5 * 60),
            success_redirect: Duration::from_secs(5),
            log_dir: None,
        }
    }
}

impl WizardConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup (used by tests).
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = parse_or(&get, "WIZARD_PORT", defaults.port);
        let db_path = get("WIZARD_DB_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);
        let submit_delay = Duration::from_millis(parse_or(
            &get,
            "WIZARD_SUBMIT_DELAY_MS",
            defaults.submit_delay.as_millis() as u64,
        ));
        let country_latency = Duration::from_millis(parse_or(
            &get,
            "WIZARD_COUNTRY_LATENCY_MS",
            defaults.country_latency.as_millis() as u64,
        ));
        let state_latency = Duration::from_millis(parse_or(
            &get,
            "WIZARD_STATE_LATENCY_MS",
            defaults.state_latency.as_millis() as u64,
        ));
        let lookup_ttl = Duration::from_secs(parse_or(
            &get,
            "WIZARD_LOOKUP_TTL_SECS",
            defaults.lookup_ttl.as_secs(),
        ));
        let success_redirect = Duration::from_secs(parse_or(
            &get,
            "WIZARD_SUCCESS_REDIRECT_SECS",
            defaults.success_redirect.as_secs(),
        ));
        let log_dir = get("WIZARD_LOG_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Self {
            port,
            db_path,
            submit_delay,
            country_latency,
            state_latency,
            lookup_ttl,
            success_redirect,
            log_dir,
        }
    }
}

fn parse_or<T, F>(get: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, default = %default, "Invalid config value, using default");
                default
            }
        },
        None => default,
    }
}
