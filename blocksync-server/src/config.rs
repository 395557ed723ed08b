use blocksync_core::{Result, SyncError, VersionPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ServiceRole {
    Meta,
    Block,
    Both,
}

impl ServiceRole {
    pub fn serves_meta(self) -> bool {
        matches!(self, ServiceRole::Meta | ServiceRole::Both)
    }

    pub fn serves_blocks(self) -> bool {
        matches!(self, ServiceRole::Block | ServiceRole::Both)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceRole::Meta => "meta",
            ServiceRole::Block => "block",
            ServiceRole::Both => "both",
        }
    }
}

/// Settings read from the optional config file and `BLOCKSYNC_*` variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub role: Option<ServiceRole>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub local_only: bool,
    #[serde(default)]
    pub block_store_addrs: Vec<String>,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub version_policy: VersionPolicy,
}

/// Fully resolved settings the server runs with.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub role: ServiceRole,
    pub port: u16,
    pub bind_addr: String,
    pub block_store_addrs: Vec<String>,
    pub data_dir: Option<PathBuf>,
    pub version_policy: VersionPolicy,
}

pub const DEFAULT_PORT: u16 = 8080;

impl Config {
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path));
        }
        let settings = builder
            .add_source(
                ::config::Environment::with_prefix("BLOCKSYNC")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("block_store_addrs"),
            )
            .build()
            .map_err(|e| SyncError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| SyncError::Config(e.to_string()))?;

        Ok(config)
    }

    pub fn into_runtime(self) -> Result<RuntimeConfig> {
        let role = self
            .role
            .ok_or_else(|| SyncError::Config("service role is required".to_string()))?;
        let port = self.port.unwrap_or(DEFAULT_PORT);

        let host = if self.local_only { "127.0.0.1" } else { "0.0.0.0" };
        let bind_addr = format!("{}:{}", host, port);

        let mut block_store_addrs: Vec<String> = self
            .block_store_addrs
            .iter()
            .map(|addr| addr.trim().to_string())
            .filter(|addr| !addr.is_empty())
            .collect();
        if block_store_addrs.is_empty() {
            match role {
                ServiceRole::Both => block_store_addrs.push(format!("localhost:{}", port)),
                ServiceRole::Meta => {
                    return Err(SyncError::Config(
                        "a meta server needs at least one block store address".to_string(),
                    ));
                }
                ServiceRole::Block => {}
            }
        }

        Ok(RuntimeConfig {
            role,
            port,
            bind_addr,
            block_store_addrs,
            data_dir: self.data_dir,
            version_policy: self.version_policy,
        })
    }
}
