//! Client defaults from file and environment.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Client configuration. File: ~/.config/esper-tool/config.toml or
/// /etc/esper-tool/config.toml. Env overrides: ESPER_DISCOVERY_PORT,
/// ESPER_DISCOVERY_TIMEOUT_SECS, ESPER_REQUEST_TIMEOUT_SECS,
/// ESPER_MAX_RETRIES, ESPER_AUTH_TOKEN.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Discovery UDP port (default 27500).
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    /// Discovery collection window in seconds (default 2).
    #[serde(default = "default_discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,
    /// Per-request HTTP timeout in seconds (default 5).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Retry bound for chunk transfers (default 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Auth token sent in discovery requests (default empty).
    #[serde(default)]
    pub auth_token: String,
}

fn default_discovery_port() -> u16 {
    esper_proto::DISCOVERY_PORT
}
fn default_discovery_timeout_secs() -> u64 {
    2
}
fn default_request_timeout_secs() -> u64 {
    5
}
fn default_max_retries() -> u32 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery_port: default_discovery_port(),
            discovery_timeout_secs: default_discovery_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            auth_token: String::new(),
        }
    }
}

impl Config {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Load config: default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    if let Ok(s) = std::env::var("ESPER_DISCOVERY_PORT") {
        if let Ok(v) = s.parse() {
            c.discovery_port = v;
        }
    }
    if let Ok(s) = std::env::var("ESPER_DISCOVERY_TIMEOUT_SECS") {
        if let Ok(v) = s.parse() {
            c.discovery_timeout_secs = v;
        }
    }
    if let Ok(s) = std::env::var("ESPER_REQUEST_TIMEOUT_SECS") {
        if let Ok(v) = s.parse() {
            c.request_timeout_secs = v;
        }
    }
    if let Ok(s) = std::env::var("ESPER_MAX_RETRIES") {
        if let Ok(v) = s.parse() {
            c.max_retries = v;
        }
    }
    if let Ok(s) = std::env::var("ESPER_AUTH_TOKEN") {
        c.auth_token = s;
    }
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/esper-tool/config.toml"));
    }
    out.push(PathBuf::from("/etc/esper-tool/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            if let Ok(s) = std::fs::read_to_string(&p) {
                if let Ok(c) = toml::from_str::<Config>(&s) {
                    return Some(c);
                }
            }
            break;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.discovery_port, 27500);
        assert_eq!(c.discovery_timeout(), Duration::from_secs(2));
        assert_eq!(c.request_timeout(), Duration::from_secs(5));
        assert_eq!(c.max_retries, 3);
        assert!(c.auth_token.is_empty());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let c: Config = toml::from_str("max_retries = 7\nauth_token = \"s3cret\"").unwrap();
        assert_eq!(c.max_retries, 7);
        assert_eq!(c.auth_token, "s3cret");
        assert_eq!(c.discovery_port, 27500);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<Config>("retry = 7").is_err());
    }
}
