use blocksync_core::{HttpBlockStoreConnector, MetaClient, SyncEngine, SyncReport};
use clap::Parser;
use clap::error::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// sysexits(3) EX_USAGE
const EX_USAGE: i32 = 64;

#[derive(Parser)]
#[command(name = "blocksync-client")]
#[command(about = "Synchronize a local directory with a blocksync server")]
struct Cli {
    /// Output debug log statements
    #[arg(short, long)]
    debug: bool,

    /// Address of the metadata server, host:port
    addr: String,

    /// Base directory to synchronize
    base_dir: PathBuf,

    /// Size of the blocks used to split files
    block_size: usize,
}

fn log_report(report: &SyncReport) {
    tracing::info!(
        "Sync finished: {} uploaded, {} deleted, {} downloaded, {} removed, {} conflicts, {} blocks sent",
        report.uploaded.len(),
        report.deleted.len(),
        report.downloaded.len(),
        report.removed.len(),
        report.conflicts.len(),
        report.blocks_sent
    );
    for (filename, state) in &report.states {
        tracing::debug!("{}: {:?}", filename, state);
    }
    for failure in &report.failures {
        tracing::error!("{}: {}", failure.filename, failure.error);
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

    let engine = match SyncEngine::new(
        &cli.base_dir,
        cli.block_size,
        Arc::new(MetaClient::new(&cli.addr)),
        Arc::new(HttpBlockStoreConnector::default()),
    ) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("Invalid arguments: {}", e);
            std::process::exit(EX_USAGE);
        }
    };

    tracing::info!(
        "Syncing {:?} against {} (block size {})",
        cli.base_dir,
        cli.addr,
        cli.block_size
    );

    match engine.run().await {
        Ok(report) => {
            log_report(&report);
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            tracing::error!("Sync failed: {}", e);
            std::process::exit(1);
        }
    }
}
