use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    pub app_url: String,
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub store: Store,
    #[serde(default)]
    pub limits: Limits,
    /// Extra MIME type to syntax tag mappings, layered over the built-in table.
    #[serde(default)]
    pub syntax: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Store {
    #[serde(default)]
    pub kind: StoreKind,
    #[cfg(feature = "redis-store")]
    #[serde(default)]
    pub redis: RedisStore,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[cfg(feature = "redis-store")]
    #[default]
    Redis,
    #[cfg_attr(not(feature = "redis-store"), default)]
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg(feature = "redis-store")]
#[serde(default)]
pub struct RedisStore {
    pub url: String,
    pub password: Option<String>,
    /// Upper bound on pooled connections.
    pub pool_size: usize,
    /// Pooled connections unused for this long are dropped.
    pub idle_timeout_secs: u64,
    /// How long a request may wait for a free pooled connection.
    pub connection_timeout_secs: u64,
}

#[cfg(feature = "redis-store")]
impl Default for RedisStore {
    fn default() -> Self {
        Self {
            url: String::from("redis://127.0.0.1:6379"),
            password: None,
            pool_size: 3,
            idle_timeout_secs: 240,
            connection_timeout_secs: 5,
        }
    }
}

#[cfg(feature = "redis-store")]
impl RedisStore {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_upload_size: usize,
    pub request_timeout_secs: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_upload_size: 1024 * 1024,
            request_timeout_secs: 30,
        }
    }
}

impl Limits {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_app_name() -> String {
    String::from("snipbin")
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    8080
}

impl Config {
    /// Read and parse a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).context("failed to deserialize config")
    }
}
