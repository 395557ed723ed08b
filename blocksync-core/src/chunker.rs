use crate::error::{Result, SyncError};
use crate::types::{Block, tombstone_list};
use bytes::{Bytes, BytesMut};
use std::path::Path;

/// Splits file contents into fixed-size blocks.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    block_size: usize,
}

impl Chunker {
    pub fn new(block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(SyncError::Config("block size must be > 0".to_string()));
        }
        Ok(Self { block_size })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Every block is `block_size` long except possibly the last.
    pub fn chunk(&self, data: impl Into<Bytes>) -> Vec<Block> {
        let body: Bytes = data.into();
        let mut blocks = Vec::with_capacity(body.len().div_ceil(self.block_size));

        let mut offset = 0usize;
        while offset < body.len() {
            let end = (offset + self.block_size).min(body.len());
            blocks.push(Block::new(body.slice(offset..end)));
            offset = end;
        }

        blocks
    }

    /// Block hash list for `data`. Empty input maps to the tombstone list, so
    /// an empty file is indistinguishable from a deleted one.
    pub fn hash_list(&self, data: impl Into<Bytes>) -> Vec<String> {
        let blocks = self.chunk(data);
        if blocks.is_empty() {
            return tombstone_list();
        }
        blocks.into_iter().map(|block| block.hash).collect()
    }

    pub async fn chunk_file(&self, path: &Path) -> Result<Vec<Block>> {
        let data = tokio::fs::read(path).await?;
        Ok(self.chunk(data))
    }
}

/// Concatenate blocks in order.
pub fn assemble(blocks: &[Block]) -> Bytes {
    let total = blocks.iter().map(|block| block.data.len()).sum();
    let mut body = BytesMut::with_capacity(total);
    for block in blocks {
        body.extend_from_slice(&block.data);
    }
    body.freeze()
}
