//! Prints which block server the ring assigns each block of a file to.

use blocksync_core::{Chunker, ConsistentHashRing, Result, SyncError};
use clap::Parser;
use clap::error::ErrorKind;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// sysexits(3) EX_USAGE
const EX_USAGE: i32 = 64;

#[derive(Parser)]
#[command(name = "blocksync-locator")]
#[command(about = "Show consistent-hash placement of a file's blocks")]
struct Cli {
    /// Comma-separated indices of servers in a failed state
    #[arg(long = "down-servers", alias = "downServers", value_delimiter = ',')]
    down_servers: Vec<usize>,

    /// Number of block servers, named blockServer0..N-1
    num_servers: usize,

    /// Size of the blocks used to split the file
    block_size: usize,

    /// File to split
    input: PathBuf,
}

fn server_name(index: usize) -> String {
    format!("blockServer{}", index)
}

/// Pair every hash with the index of the server responsible for it.
fn locate(num_servers: usize, down: &[usize], hashes: &[String]) -> Result<Vec<(String, usize)>> {
    let mut ring = ConsistentHashRing::new();
    let mut indices = HashMap::new();
    for index in 0..num_servers {
        let name = server_name(index);
        ring.insert(&name);
        indices.insert(name, index);
    }

    for index in down {
        if !ring.remove(&server_name(*index)) {
            return Err(SyncError::Config(format!(
                "down server {} is not in 0..{}",
                index, num_servers
            )));
        }
    }

    hashes
        .iter()
        .map(|hash| {
            let addr = ring.responsible_server(hash)?;
            Ok((hash.clone(), indices[addr]))
        })
        .collect()
}

fn format_pairs(pairs: &[(String, usize)]) -> String {
    let body: Vec<String> = pairs
        .iter()
        .map(|(hash, index)| format!("{{{}, {}}}", hash, index))
        .collect();
    format!("{{{}}}", body.join(", "))
}

async fn run(cli: &Cli) -> Result<String> {
    let chunker = Chunker::new(cli.block_size)?;
    let blocks = chunker.chunk_file(&cli.input).await?;
    let hashes: Vec<String> = blocks.into_iter().map(|block| block.hash).collect();
    let pairs = locate(cli.num_servers, &cli.down_servers, &hashes)?;
    Ok(format_pairs(&pairs))
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

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blocksync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Total number of block servers: {}", cli.num_servers);
    tracing::info!("Block size: {}", cli.block_size);
    tracing::info!("Processing input file: {:?}", cli.input);
    if cli.down_servers.is_empty() {
        tracing::info!("No servers are in a failed state");
    }
    for index in &cli.down_servers {
        tracing::info!("Server {} is in a failed state", index);
    }

    match run(&cli).await {
        Ok(output) => println!("{}", output),
        Err(e @ SyncError::Config(_)) => {
            tracing::error!("{}", e);
            std::process::exit(EX_USAGE);
        }
        Err(e) => {
            tracing::error!("Failed to locate blocks: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocksync_core::compute_hash;

    fn hashes(count: usize) -> Vec<String> {
        (0..count)
            .map(|i| compute_hash(format!("block {}", i).as_bytes()))
            .collect()
    }

    #[test]
    fn output_format() {
        let pairs = vec![("aa".to_string(), 7), ("bb".to_string(), 2)];
        assert_eq!(format_pairs(&pairs), "{{aa, 7}, {bb, 2}}");
        assert_eq!(format_pairs(&[]), "{}");
    }

    #[test]
    fn down_servers_receive_no_blocks() {
        let hashes = hashes(100);
        let pairs = locate(5, &[1, 3], &hashes).unwrap();
        assert_eq!(pairs.len(), 100);
        assert!(pairs.iter().all(|(_, index)| *index != 1 && *index != 3));

        // Blocks of live servers stay where they were
        let full = locate(5, &[], &hashes).unwrap();
        for (before, after) in full.iter().zip(&pairs) {
            if before.1 != 1 && before.1 != 3 {
                assert_eq!(before, after);
            }
        }
    }

    #[test]
    fn invalid_input_is_rejected() {
        assert!(matches!(
            locate(3, &[5], &hashes(1)),
            Err(SyncError::Config(_))
        ));
        assert!(matches!(
            locate(1, &[0], &hashes(1)),
            Err(SyncError::NoServersAvailable)
        ));
    }

    #[tokio::test]
    async fn run_chunks_the_input_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.bin");
        std::fs::write(&input, vec![1u8; 10]).unwrap();

        let cli = Cli::try_parse_from([
            "blocksync-locator",
            "--down-servers",
            "0",
            "2",
            "4",
            input.to_str().unwrap(),
        ])
        .unwrap();
        let output = run(&cli).await.unwrap();

        // 4 + 4 + 2 bytes; the two full blocks share a hash
        let full = compute_hash(&[1u8; 4]);
        let tail = compute_hash(&[1u8; 2]);
        assert_eq!(output, format!("{{{{{full}, 1}}, {{{full}, 1}}, {{{tail}, 1}}}}"));
    }
}
