use super::BlockStore;
use crate::error::{Result, SyncError};
use crate::types::Block;
use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// In-memory block store: hash -> block.
///
/// Readers share the lock, `put_block` takes it exclusively.
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: RwLock<HashMap<String, Block>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blocks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blocks.read().await.is_empty()
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn get_block(&self, hash: &str) -> Result<Block> {
        let blocks = self.blocks.read().await;
        blocks
            .get(hash)
            .cloned()
            .ok_or_else(|| SyncError::BlockNotFound(hash.to_string()))
    }

    async fn put_block(&self, block: &Block) -> Result<bool> {
        let hash = compute_hash(&block.data);
        if hash != block.hash {
            return Err(SyncError::HashMismatch {
                expected: block.hash.clone(),
                actual: hash,
            });
        }

        let mut blocks = self.blocks.write().await;
        blocks.entry(hash).or_insert_with(|| block.clone());
        Ok(true)
    }

    async fn has_blocks(&self, hashes: &[String]) -> Result<Vec<String>> {
        let blocks = self.blocks.read().await;
        Ok(hashes
            .iter()
            .filter(|hash| blocks.contains_key(hash.as_str()))
            .cloned()
            .collect())
    }
}

/// Block store persisted as one file per block under `base_path`.
pub struct FsBlockStore {
    base_path: PathBuf,
    lock: RwLock<()>,
}

impl FsBlockStore {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            lock: RwLock::new(()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn block_path(&self, hash: &str) -> Result<PathBuf> {
        if hash.len() < 2 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SyncError::InvalidRequest(format!(
                "invalid block hash: {}",
                hash
            )));
        }

        // First 2 chars as subdirectory to avoid too many files in one dir
        Ok(self.base_path.join(&hash[..2]).join(hash))
    }
}

#[async_trait]
impl BlockStore for FsBlockStore {
    async fn get_block(&self, hash: &str) -> Result<Block> {
        let block_path = self.block_path(hash)?;
        let _guard = self.lock.read().await;

        match fs::read(&block_path).await {
            Ok(data) => Ok(Block {
                hash: hash.to_string(),
                size: data.len() as u64,
                data: Bytes::from(data),
            }),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(SyncError::BlockNotFound(hash.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn put_block(&self, block: &Block) -> Result<bool> {
        verify_hash(&block.data, &block.hash)?;
        let block_path = self.block_path(&block.hash)?;
        let _guard = self.lock.write().await;

        if block_path.exists() {
            return Ok(true);
        }
        if let Some(parent) = block_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to temporary file first, then rename for atomicity
        let tmp_path = block_path.with_extension(format!("{}.tmp", ulid::Ulid::new()));
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&block.data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &block_path).await?;

        tracing::debug!("Stored block {} ({} bytes)", block.hash, block.size);
        Ok(true)
    }

    async fn has_blocks(&self, hashes: &[String]) -> Result<Vec<String>> {
        let _guard = self.lock.read().await;
        let mut present = Vec::new();
        for hash in hashes {
            if self.block_path(hash).map(|path| path.exists()).unwrap_or(false) {
                present.push(hash.clone());
            }
        }
        Ok(present)
    }
}

/// Compute SHA256 hash of data as lowercase hex
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Verify that data matches the expected hash
pub fn verify_hash(data: &[u8], expected_hash: &str) -> Result<()> {
    let actual = compute_hash(data);
    if actual != expected_hash {
        return Err(SyncError::HashMismatch {
            expected: expected_hash.to_string(),
            actual,
        });
    }
    Ok(())
}
