//! Storage modules for blocksync
//!
//! Trait seams for the block and metadata services, with in-memory and
//! filesystem backends. The HTTP clients in `client` implement the same traits.

pub mod block_store;
pub mod meta_store;

pub use block_store::{FsBlockStore, MemoryBlockStore, compute_hash, verify_hash};
pub use meta_store::{MemoryMetaStore, VersionPolicy};

use crate::error::{Result, SyncError};
use crate::types::{Block, BlockStoreMap, FileInfoMap, FileMetaData};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Content-addressed block storage.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Get a block by its hash
    async fn get_block(&self, hash: &str) -> Result<Block>;

    /// Store a block under the hash of its data
    async fn put_block(&self, block: &Block) -> Result<bool>;

    /// Return the subset of `hashes` that are stored
    async fn has_blocks(&self, hashes: &[String]) -> Result<Vec<String>>;
}

/// Authoritative file metadata.
#[async_trait]
pub trait MetaStore: Send + Sync {
    /// Snapshot of every file's metadata
    async fn get_file_info_map(&self) -> Result<FileInfoMap>;

    /// Apply a candidate update, returning the accepted version
    async fn update_file(&self, meta: &FileMetaData) -> Result<u64>;

    /// The primary block store address
    async fn get_block_store_addr(&self) -> Result<String>;

    /// Every configured block store address
    async fn get_block_store_addrs(&self) -> Result<Vec<String>>;

    /// Ring-resolved placement for a batch of block hashes
    async fn get_block_store_map(&self, hashes: &[String]) -> Result<BlockStoreMap>;
}

/// Opens a `BlockStore` handle for a block server address.
pub trait BlockStoreConnector: Send + Sync {
    fn connect(&self, addr: &str) -> Result<Arc<dyn BlockStore>>;
}

/// Connector over a fixed set of in-process stores.
#[derive(Default, Clone)]
pub struct StaticBlockStoreConnector {
    stores: HashMap<String, Arc<dyn BlockStore>>,
}

impl StaticBlockStoreConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, addr: impl Into<String>, store: Arc<dyn BlockStore>) {
        self.stores.insert(addr.into(), store);
    }
}

impl BlockStoreConnector for StaticBlockStoreConnector {
    fn connect(&self, addr: &str) -> Result<Arc<dyn BlockStore>> {
        self.stores
            .get(addr)
            .cloned()
            .ok_or_else(|| SyncError::Network(format!("unknown block server {}", addr)))
    }
}
