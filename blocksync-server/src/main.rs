mod config;
use clap::Parser;
use clap::error::ErrorKind;
use config::{Config, ServiceRole};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod server;
use blocksync_core::VersionPolicy;
use server::run_server;
use std::path::PathBuf;

/// sysexits(3) EX_USAGE
const EX_USAGE: i32 = 64;

#[derive(Parser)]
#[command(name = "blocksync-server")]
#[command(about = "Metadata and block storage server for blocksync")]
struct Cli {
    /// Service to run: meta, block or both
    #[arg(short = 's', long = "service", value_enum)]
    service: Option<ServiceRole>,

    /// Port to accept connections on
    #[arg(short, long)]
    port: Option<u16>,

    /// Only listen on localhost
    #[arg(short, long)]
    local_only: bool,

    /// Output debug log statements
    #[arg(short, long)]
    debug: bool,

    /// Optional configuration file (toml, yaml or json)
    #[arg(long)]
    conf: Option<String>,

    /// Persist blocks under this directory instead of memory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Version check applied to updates of known files
    #[arg(long)]
    version_policy: Option<VersionPolicy>,

    /// Block store addresses (include this server's own address for `both`)
    block_store_addrs: Vec<String>,
}

impl Cli {
    fn apply(self, mut config: Config) -> Config {
        if self.service.is_some() {
            config.role = self.service;
        }
        if self.port.is_some() {
            config.port = self.port;
        }
        config.local_only |= self.local_only;
        if !self.block_store_addrs.is_empty() {
            config.block_store_addrs = self.block_store_addrs;
        }
        if self.data_dir.is_some() {
            config.data_dir = self.data_dir;
        }
        if let Some(policy) = self.version_policy {
            config.version_policy = policy;
        }
        config
    }
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let code = match error.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => EX_USAGE,
            };
            let _ = error.print();
            std::process::exit(code);
        }
    };

    let default_filter = if cli.debug {
        "blocksync=debug"
    } else {
        "blocksync=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let file_config = match Config::load(cli.conf.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            std::process::exit(EX_USAGE);
        }
    };

    let runtime = match cli.apply(file_config).into_runtime() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(EX_USAGE);
        }
    };

    tracing::info!(
        "Starting blocksync {} server on port {}",
        runtime.role.as_str(),
        runtime.port
    );

    if let Err(e) = run_server(runtime).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
