//! Blocksync Core - block-level file synchronization with content-addressed storage

pub mod chunker;
pub mod client;
pub mod error;
pub mod index;
pub mod ring;
pub mod storage;
pub mod sync;
pub mod types;
pub mod wire;

pub use chunker::{Chunker, assemble};
pub use client::{BlockClient, HttpBlockStoreConnector, MetaClient, RetryPolicy};
pub use error::{Result, SyncError};
pub use index::{INDEX_FILENAME, LocalIndex};
pub use ring::ConsistentHashRing;
pub use storage::{
    BlockStore, BlockStoreConnector, FsBlockStore, MemoryBlockStore, MemoryMetaStore, MetaStore,
    StaticBlockStoreConnector, VersionPolicy, compute_hash, verify_hash,
};
pub use sync::{FileFailure, FileState, SyncEngine, SyncReport};
pub use types::{
    Block, BlockStoreMap, FileInfoMap, FileMetaData, TOMBSTONE_HASH, is_tombstone_list,
    tombstone_list, validate_filename,
};
