//! Server configuration.
//!
//! Defaults cover everything; a YAML file named by `WEBSERV_CONFIG` and a
//! handful of environment variables override them. The listening port comes
//! from the command line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::buffer::READ_BUFFER_SIZE;
use crate::http::parser::DEFAULT_LANDING_PAGE;
use crate::http::writer::WRITE_BUFFER_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    /// Accepted sockets beyond this are told the server is busy.
    pub max_connections: usize,
    /// Readiness events handled per poll.
    pub events_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 9006,
            max_connections: 65536,
            events_capacity: 10000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SiteConfig {
    pub doc_root: PathBuf,
    pub default_page: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            doc_root: PathBuf::from("./root"),
            default_page: DEFAULT_LANDING_PAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PoolConfig {
    pub workers: usize,
    /// Work queue capacity.
    pub max_requests: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            max_requests: 10000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimerConfig {
    /// Tick period in seconds. Idle connections are evicted after three.
    pub idle_unit_secs: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self { idle_unit_secs: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BufferConfig {
    pub read_capacity: usize,
    pub write_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            read_capacity: READ_BUFFER_SIZE,
            write_capacity: WRITE_BUFFER_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Credential file, one `user<TAB>password` per line.
    pub path: PathBuf,
    pub pool_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("users.db"),
            pool_size: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// Used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub site: SiteConfig,
    pub pool: PoolConfig,
    pub timer: TimerConfig,
    pub buffers: BufferConfig,
    pub store: StoreConfig,
    pub log: LogConfig,
}

impl Config {
    /// Defaults, then the file named by `WEBSERV_CONFIG`, then environment
    /// overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var_os("WEBSERV_CONFIG") {
            Some(path) => Self::load_from(Path::new(&path))?,
            None => Self::default(),
        };
        cfg.apply_env()?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    fn apply_env(&mut self) -> anyhow::Result<()> {
        if let Ok(addr) = std::env::var("WEBSERV_LISTEN") {
            self.server.address = addr;
        }
        if let Ok(root) = std::env::var("WEBSERV_DOC_ROOT") {
            self.site.doc_root = PathBuf::from(root);
        }
        if let Ok(path) = std::env::var("WEBSERV_STORE_PATH") {
            self.store.path = PathBuf::from(path);
        }
        if let Ok(size) = std::env::var("WEBSERV_STORE_POOL_SIZE") {
            self.store.pool_size = size
                .parse()
                .with_context(|| format!("WEBSERV_STORE_POOL_SIZE={size:?}"))?;
        }
        if let Ok(workers) = std::env::var("WEBSERV_WORKERS") {
            self.pool.workers = workers
                .parse()
                .with_context(|| format!("WEBSERV_WORKERS={workers:?}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.pool.workers, "pool.workers"),
            (self.pool.max_requests, "pool.max_requests"),
            (self.store.pool_size, "store.pool_size"),
            (self.buffers.read_capacity, "buffers.read_capacity"),
            (self.buffers.write_capacity, "buffers.write_capacity"),
            (self.server.events_capacity, "server.events_capacity"),
            (self.server.max_connections, "server.max_connections"),
        ];
        for (value, name) in checks {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        if self.timer.idle_unit_secs == 0 {
            return Err(ConfigError::Zero("timer.idle_unit_secs"));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.address, self.server.port)
    }

    pub fn idle_unit(&self) -> Duration {
        Duration::from_secs(self.timer.idle_unit_secs)
    }
}
