//! C10: runtime configuration. Env vars take precedence over an optional
//! TOML overlay, which takes precedence over the built-in default,
//! mirroring a familiar nested-config-with-fallback shape adapted to this
//! agent's much smaller knob set (§4.9, §6.5).

use std::path::Path;

use serde::Deserialize;

use crate::errors::InitError;

/// Everything a TOML file is allowed to set. All fields optional: a field
/// left out falls through to `RuntimeConfig::load`'s next tier.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub exchange: Option<String>,
    pub symbol: Option<String>,
    pub venue_rest_url: Option<String>,
    pub venue_ws_url: Option<String>,
    pub venue_private_ws_url: Option<String>,
    pub metrics_port: Option<u16>,
    pub tick_interval_ms: Option<u64>,
    pub event_flush_interval_ms: Option<u64>,
    pub state_persist_interval_ms: Option<u64>,
    pub params_refresh_interval_ms: Option<u64>,
}

/// Resolved configuration the binary hands to the venue adapters, the
/// tick loop, and the metrics server.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub exchange: String,
    pub symbol: String,
    pub venue_rest_url: String,
    pub venue_ws_url: String,
    /// Defaults to `venue_ws_url` when unset: many venues multiplex public
    /// and private channels over the same socket with a post-connect
    /// subscribe/auth frame rather than a distinct URL.
    pub venue_private_ws_url: String,
    pub metrics_port: u16,
    pub tick_interval_ms: u64,
    pub event_flush_interval_ms: u64,
    pub state_persist_interval_ms: u64,
    pub params_refresh_interval_ms: u64,
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Result<Option<T>, InitError> {
    match env_string(name) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| InitError::InvalidEnvVar { name: name.to_string(), value }),
        None => Ok(None),
    }
}

fn required(name: &str, from_file: Option<String>) -> Result<String, InitError> {
    env_string(name).or(from_file).ok_or_else(|| InitError::MissingEnvVar(name.to_string()))
}

fn with_default<T: std::str::FromStr + Copy>(
    name: &str,
    from_file: Option<T>,
    default: T,
) -> Result<T, InitError> {
    Ok(env_parsed::<T>(name)?.or(from_file).unwrap_or(default))
}

impl RuntimeConfig {
    /// Default ports/intervals used when neither an env var nor the TOML
    /// overlay sets them.
    pub const DEFAULT_METRICS_PORT: u16 = 9_090;
    pub const DEFAULT_TICK_INTERVAL_MS: u64 = 250;
    pub const DEFAULT_EVENT_FLUSH_INTERVAL_MS: u64 = 5_000;
    pub const DEFAULT_STATE_PERSIST_INTERVAL_MS: u64 = 60_000;
    pub const DEFAULT_PARAMS_REFRESH_INTERVAL_MS: u64 = 5_000;

    /// Loads config from the environment, optionally overlaid on a TOML
    /// file. `EXCHANGE`, `SYMBOL`, `VENUE_REST_URL`, and `VENUE_WS_URL`
    /// have no built-in default and must come from one of the two
    /// sources; everything else has a reasonable default (§4.9).
    pub fn load(config_path: Option<&Path>) -> Result<Self, InitError> {
        let file = match config_path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|source| InitError::ConfigRead { path: path.display().to_string(), source })?;
                toml::from_str::<FileConfig>(&text)
                    .map_err(|source| InitError::ConfigParse { path: path.display().to_string(), source })?
            }
            None => FileConfig::default(),
        };

        let venue_ws_url = required("VENUE_WS_URL", file.venue_ws_url)?;
        let venue_private_ws_url =
            env_string("VENUE_PRIVATE_WS_URL").or(file.venue_private_ws_url).unwrap_or_else(|| venue_ws_url.clone());

        Ok(Self {
            exchange: required("EXCHANGE", file.exchange)?,
            symbol: required("SYMBOL", file.symbol)?,
            venue_rest_url: required("VENUE_REST_URL", file.venue_rest_url)?,
            venue_ws_url,
            venue_private_ws_url,
            metrics_port: with_default("METRICS_PORT", file.metrics_port, Self::DEFAULT_METRICS_PORT)?,
            tick_interval_ms: with_default("TICK_INTERVAL_MS", file.tick_interval_ms, Self::DEFAULT_TICK_INTERVAL_MS)?,
            event_flush_interval_ms: with_default(
                "EVENT_FLUSH_INTERVAL_MS",
                file.event_flush_interval_ms,
                Self::DEFAULT_EVENT_FLUSH_INTERVAL_MS,
            )?,
            state_persist_interval_ms: with_default(
                "STATE_PERSIST_INTERVAL_MS",
                file.state_persist_interval_ms,
                Self::DEFAULT_STATE_PERSIST_INTERVAL_MS,
            )?,
            params_refresh_interval_ms: with_default(
                "PARAMS_REFRESH_INTERVAL_MS",
                file.params_refresh_interval_ms,
                Self::DEFAULT_PARAMS_REFRESH_INTERVAL_MS,
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global; serialize the tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for var in [
            "EXCHANGE",
            "SYMBOL",
            "VENUE_REST_URL",
            "VENUE_WS_URL",
            "VENUE_PRIVATE_WS_URL",
            "METRICS_PORT",
            "TICK_INTERVAL_MS",
            "EVENT_FLUSH_INTERVAL_MS",
            "STATE_PERSIST_INTERVAL_MS",
            "PARAMS_REFRESH_INTERVAL_MS",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn missing_required_var_is_an_init_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let err = RuntimeConfig::load(None).unwrap_err();
        assert!(matches!(err, InitError::MissingEnvVar(name) if name == "EXCHANGE"));
    }

    #[test]
    fn env_vars_fill_required_fields_and_defaults_fill_the_rest() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("EXCHANGE", "hyperliquid");
        std::env::set_var("SYMBOL", "BTC-PERP");
        std::env::set_var("VENUE_REST_URL", "https://example.invalid/rest");
        std::env::set_var("VENUE_WS_URL", "wss://example.invalid/ws");

        let cfg = RuntimeConfig::load(None).unwrap();
        assert_eq!(cfg.exchange, "hyperliquid");
        assert_eq!(cfg.metrics_port, RuntimeConfig::DEFAULT_METRICS_PORT);
        assert_eq!(cfg.tick_interval_ms, RuntimeConfig::DEFAULT_TICK_INTERVAL_MS);
        clear_env();
    }

    #[test]
    fn private_ws_url_defaults_to_public_ws_url_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("EXCHANGE", "hyperliquid");
        std::env::set_var("SYMBOL", "BTC-PERP");
        std::env::set_var("VENUE_REST_URL", "https://example.invalid/rest");
        std::env::set_var("VENUE_WS_URL", "wss://example.invalid/ws");

        let cfg = RuntimeConfig::load(None).unwrap();
        assert_eq!(cfg.venue_private_ws_url, cfg.venue_ws_url);
        clear_env();
    }

    #[test]
    fn invalid_numeric_env_var_is_an_init_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("EXCHANGE", "hyperliquid");
        std::env::set_var("SYMBOL", "BTC-PERP");
        std::env::set_var("VENUE_REST_URL", "https://example.invalid/rest");
        std::env::set_var("VENUE_WS_URL", "wss://example.invalid/ws");
        std::env::set_var("METRICS_PORT", "not-a-port");

        let err = RuntimeConfig::load(None).unwrap_err();
        assert!(matches!(err, InitError::InvalidEnvVar { name, .. } if name == "METRICS_PORT"));
        clear_env();
    }
}
