//! Client configuration: authority location and poll cadence.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the client looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/live-match.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "LIVE_MATCH_CONFIG_PATH";
/// Environment variable that overrides the configured API base.
const API_BASE_ENV: &str = "LIVE_MATCH_API_BASE";
/// API base used when neither the file nor the environment provide one.
const DEFAULT_API_BASE: &str = "http://localhost:8080/api";

/// Immutable runtime configuration of a match session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the game service, without a trailing slash.
    pub api_base: String,
    /// Display refresh; never touches the network.
    pub fast_tick: Duration,
    /// Details and clock-only refresh.
    pub details_poll: Duration,
    /// Move list refresh.
    pub moves_poll: Duration,
    /// How often the timeout watchdog checks the clocks.
    pub watchdog_tick: Duration,
    /// Quiet period after a forced refresh before the watchdog re-arms.
    pub watchdog_cooldown: Duration,
    /// Upper bound on any single request.
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Load the configuration from disk, falling back to built-in defaults, then
    /// apply environment overrides.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        api_base = %config.api_base,
                        "loaded client config"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        if let Some(base) = env::var(API_BASE_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
        {
            config.api_base = normalize_base(&base);
        }
        config
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawConfig {
    api_base: String,
    fast_tick_ms: u64,
    details_poll_ms: u64,
    moves_poll_ms: u64,
    watchdog_tick_ms: u64,
    watchdog_cooldown_ms: u64,
    request_timeout_ms: u64,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            fast_tick_ms: 100,
            details_poll_ms: 1_000,
            moves_poll_ms: 1_500,
            watchdog_tick_ms: 100,
            watchdog_cooldown_ms: 1_500,
            request_timeout_ms: 5_000,
        }
    }
}

impl From<RawConfig> for ClientConfig {
    fn from(value: RawConfig) -> Self {
        // Zero periods would make tokio intervals panic.
        let period = |ms: u64| Duration::from_millis(ms.max(1));
        Self {
            api_base: normalize_base(&value.api_base),
            fast_tick: period(value.fast_tick_ms),
            details_poll: period(value.details_poll_ms),
            moves_poll: period(value.moves_poll_ms),
            watchdog_tick: period(value.watchdog_tick_ms),
            watchdog_cooldown: Duration::from_millis(value.watchdog_cooldown_ms),
            request_timeout: period(value.request_timeout_ms),
        }
    }
}

fn normalize_base(base: &str) -> String {
    base.trim().trim_end_matches('/').to_string()
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_cadence() {
        let config = ClientConfig::default();
        assert_eq!(config.api_base, "http://localhost:8080/api");
        assert_eq!(config.fast_tick, Duration::from_millis(100));
        assert_eq!(config.details_poll, Duration::from_secs(1));
        assert_eq!(config.moves_poll, Duration::from_millis(1_500));
        assert_eq!(config.watchdog_cooldown, Duration::from_millis(1_500));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn partial_files_keep_remaining_defaults() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"apiBase":"https://chess.example/api/","movesPollMs":3000}"#)
                .unwrap();
        let config = ClientConfig::from(raw);
        assert_eq!(config.api_base, "https://chess.example/api");
        assert_eq!(config.moves_poll, Duration::from_secs(3));
        assert_eq!(config.details_poll, Duration::from_secs(1));
    }

    #[test]
    fn zero_periods_are_raised() {
        let raw: RawConfig = serde_json::from_str(r#"{"fastTickMs":0}"#).unwrap();
        assert_eq!(ClientConfig::from(raw).fast_tick, Duration::from_millis(1));
    }
}
