//! Process configuration, read once from the environment at startup.

use std::env;
use std::time::Duration;

use crate::error::ConfigError;
use crate::link::LinkConfig;

/// Applied when `PROJECTOR_TIMEOUT_MS` is not set.
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 5000;

/// Applied when `BEAMCTL_LISTEN` is not set.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Everything the daemon needs to come up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host name or IP of the serial bridge (`PROJECTOR_HOST`).
    pub device_host: String,
    /// TCP port of the serial bridge (`PROJECTOR_PORT`).
    pub device_port: u16,
    /// How long to wait for a device reply (`PROJECTOR_TIMEOUT_MS`).
    pub response_timeout: Duration,
    /// Address the HTTP server binds to (`BEAMCTL_LISTEN`).
    pub listen_addr: String,
}

impl Config {
    /// Reads the environment. Host and port are required and their absence
    /// is fatal to startup; the timeout and listen address have defaults.
    pub fn from_env() -> Result<Config, ConfigError> {
        let device_host = require("PROJECTOR_HOST")?;

        let port_raw = require("PROJECTOR_PORT")?;
        let device_port: u16 = port_raw
            .parse()
            .map_err(|_| ConfigError::Invalid("PROJECTOR_PORT", port_raw.clone()))?;

        let response_timeout = match env::var("PROJECTOR_TIMEOUT_MS") {
            Ok(raw) => {
                let ms: u64 = raw
                    .parse()
                    .map_err(|_| ConfigError::Invalid("PROJECTOR_TIMEOUT_MS", raw.clone()))?;
                Duration::from_millis(ms)
            }
            Err(_) => Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS),
        };

        let listen_addr =
            env::var("BEAMCTL_LISTEN").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());

        Ok(Config {
            device_host,
            device_port,
            response_timeout,
            listen_addr,
        })
    }

    /// Link settings for the configured bridge.
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig::new(format!("{}:{}", self.device_host, self.device_port))
            .with_response_timeout(self.response_timeout)
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

// =================================================================
// Tests

#[cfg(test)]
mod tests {
    use super::*;

    // One test walks every case so the process-global environment is never
    // touched from two tests at once.
    #[test]
    fn from_env_covers_required_optional_and_invalid() {
        env::remove_var("PROJECTOR_HOST");
        env::remove_var("PROJECTOR_PORT");
        env::remove_var("PROJECTOR_TIMEOUT_MS");
        env::remove_var("BEAMCTL_LISTEN");

        assert_eq!(
            Config::from_env(),
            Err(ConfigError::Missing("PROJECTOR_HOST"))
        );

        env::set_var("PROJECTOR_HOST", "10.0.0.17");
        assert_eq!(
            Config::from_env(),
            Err(ConfigError::Missing("PROJECTOR_PORT"))
        );

        env::set_var("PROJECTOR_PORT", "lots");
        assert_eq!(
            Config::from_env(),
            Err(ConfigError::Invalid("PROJECTOR_PORT", "lots".into()))
        );

        env::set_var("PROJECTOR_PORT", "4661");
        let config = Config::from_env().unwrap();
        assert_eq!(
            config,
            Config {
                device_host: "10.0.0.17".into(),
                device_port: 4661,
                response_timeout: Duration::from_millis(5000),
                listen_addr: "0.0.0.0:8080".into(),
            }
        );
        assert_eq!(config.link_config().addr, "10.0.0.17:4661");

        env::set_var("PROJECTOR_TIMEOUT_MS", "250");
        env::set_var("BEAMCTL_LISTEN", "127.0.0.1:9090");
        let config = Config::from_env().unwrap();
        assert_eq!(config.response_timeout, Duration::from_millis(250));
        assert_eq!(config.listen_addr, "127.0.0.1:9090");

        env::set_var("PROJECTOR_TIMEOUT_MS", "soon");
        assert_eq!(
            Config::from_env(),
            Err(ConfigError::Invalid("PROJECTOR_TIMEOUT_MS", "soon".into()))
        );

        env::remove_var("PROJECTOR_HOST");
        env::remove_var("PROJECTOR_PORT");
        env::remove_var("PROJECTOR_TIMEOUT_MS");
        env::remove_var("BEAMCTL_LISTEN");
    }
}
