use crate::error::{Result, SyncError};
use crate::index::is_index_file;
use crate::storage::compute_hash;
use crate::sync::DOWNLOAD_TMP_SUFFIX;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Single-element block list that marks a file as deleted.
pub const TOMBSTONE_HASH: &str = "0";

/// Authoritative view of every file, keyed by filename.
pub type FileInfoMap = BTreeMap<String, FileMetaData>;

/// Block store address -> block hashes that live there.
pub type BlockStoreMap = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub hash: String,
    pub data: Bytes,
    pub size: u64,
}

impl Block {
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            hash: compute_hash(&data),
            size: data.len() as u64,
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetaData {
    pub filename: String,
    pub version: u64,
    pub block_hash_list: Vec<String>,
}

impl FileMetaData {
    pub fn new(filename: impl Into<String>, version: u64, block_hash_list: Vec<String>) -> Self {
        Self {
            filename: filename.into(),
            version,
            block_hash_list,
        }
    }

    pub fn tombstone(filename: impl Into<String>, version: u64) -> Self {
        Self::new(filename, version, tombstone_list())
    }

    pub fn is_tombstone(&self) -> bool {
        is_tombstone_list(&self.block_hash_list)
    }

    /// Reject metadata that cannot be stored as one index line or written
    /// inside a base directory.
    pub fn validate(&self) -> Result<()> {
        validate_filename(&self.filename)?;
        if self.block_hash_list.is_empty() {
            return Err(SyncError::InvalidRequest(format!(
                "empty block hash list for {}",
                self.filename
            )));
        }
        let malformed = self.block_hash_list.iter().find(|hash| {
            hash.is_empty() || hash.chars().any(|c| c.is_whitespace() || c.is_control())
        });
        if let Some(hash) = malformed {
            return Err(SyncError::InvalidRequest(format!(
                "invalid block hash {:?} for {}",
                hash, self.filename
            )));
        }
        Ok(())
    }
}

/// Filenames are flat keys: no path components, no control characters and
/// none of the names the client keeps for itself.
pub fn validate_filename(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(SyncError::InvalidRequest(format!("invalid filename: {:?}", name)));
    }
    if name.contains(['/', '\\']) || name.chars().any(char::is_control) {
        return Err(SyncError::InvalidRequest(format!(
            "invalid character in filename: {:?}",
            name
        )));
    }
    if is_index_file(name) || name.ends_with(DOWNLOAD_TMP_SUFFIX) {
        return Err(SyncError::InvalidRequest(format!("reserved filename: {:?}", name)));
    }
    Ok(())
}

pub fn tombstone_list() -> Vec<String> {
    vec![TOMBSTONE_HASH.to_string()]
}

pub fn is_tombstone_list(hashes: &[String]) -> bool {
    hashes.len() == 1 && hashes[0] == TOMBSTONE_HASH
}
