//! Configuration loading and defaults.
//!
//! Resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables** — `TUNNEL_FRONTEND_ADDR`, `TUNNEL_BACKEND_ADDR`
//! 2. **Config file** — path via `--config <path>`, or `tunnel-server.toml` in CWD
//! 3. **Compiled defaults** — see each field's default value below
//!
//! ```toml
//! [frontend]
//! bind_addr = "0.0.0.0:13512"
//!
//! [backend]
//! bind_addr = "0.0.0.0:15827"
//!
//! [heartbeat]
//! interval_secs = 5
//!
//! [dh]
//! g = "2"
//! p = "..."
//! ```

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub frontend: FrontendConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub dh: DhConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Frontend (device-facing) listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FrontendConfig {
    /// Socket address to bind for devices (default `0.0.0.0:13512`).
    #[serde(default = "default_frontend_addr")]
    pub bind_addr: String,
}

/// Backend (service-facing) listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Socket address to bind for backend servers (default `0.0.0.0:15827`).
    #[serde(default = "default_backend_addr")]
    pub bind_addr: String,
}

/// Heartbeat/liveness settings for the frontend pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatConfig {
    /// Seconds between expected device heartbeats (default 5). A device that
    /// misses two consecutive intervals is treated as dead.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub interval_secs: u64,
}

/// Diffie-Hellman parameters for the frontend handshake.
#[derive(Debug, Clone, Deserialize)]
pub struct DhConfig {
    /// Generator, as a decimal string (default `"2"`).
    #[serde(default = "default_dh_g")]
    pub g: String,
    /// 512-bit prime modulus, as a decimal string.
    #[serde(default = "default_dh_p")]
    pub p: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_frontend_addr() -> String {
    "0.0.0.0:13512".to_string()
}
fn default_backend_addr() -> String {
    "0.0.0.0:15827".to_string()
}
fn default_heartbeat_interval_secs() -> u64 {
    5
}
fn default_dh_g() -> String {
    "2".to_string()
}
// A 512-bit safe prime, used only as a built-in default; deployments that
// care about their own security margin should supply `p` via config.
fn default_dh_p() -> String {
    "13407807929942597099574024998205846127479365820592393377723561443721764030073\
     54628791395000975264557702754589368119791043943850715970714843996381364629622\
     5398231391"
        .to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_frontend_addr(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_backend_addr(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_heartbeat_interval_secs(),
        }
    }
}

impl Default for DhConfig {
    fn default() -> Self {
        Self {
            g: default_dh_g(),
            p: default_dh_p(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frontend: FrontendConfig::default(),
            backend: BackendConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            dh: DhConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, reads that file and fails loudly on error.
    /// Otherwise looks for `tunnel-server.toml` in the current directory,
    /// falling back to compiled defaults.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut config = if let Some(p) = path {
            let content = std::fs::read_to_string(p)
                .map_err(|e| anyhow::anyhow!("failed to read config file {p}: {e}"))?;
            toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("failed to parse config file {p}: {e}"))?
        } else if Path::new("tunnel-server.toml").exists() {
            let content = std::fs::read_to_string("tunnel-server.toml")?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        if let Ok(addr) = std::env::var("TUNNEL_FRONTEND_ADDR") {
            config.frontend.bind_addr = addr;
        }
        if let Ok(addr) = std::env::var("TUNNEL_BACKEND_ADDR") {
            config.backend.bind_addr = addr;
        }

        Ok(config)
    }
}
