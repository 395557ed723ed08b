use super::MetaStore;
use crate::error::{Result, SyncError};
use crate::ring::ConsistentHashRing;
use crate::types::{BlockStoreMap, FileInfoMap, FileMetaData};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::str::FromStr;
use tokio::sync::Mutex;

/// How `update_file` treats a candidate for a file that already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionPolicy {
    /// Accept any candidate with `version >= stored`.
    #[default]
    Lenient,
    /// Accept only `version == stored + 1`.
    Strict,
}

impl FromStr for VersionPolicy {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(VersionPolicy::Lenient),
            "strict" => Ok(VersionPolicy::Strict),
            other => Err(format!("unknown version policy '{}'", other)),
        }
    }
}

impl VersionPolicy {
    fn accepts(self, candidate: u64, stored: u64) -> bool {
        match self {
            VersionPolicy::Lenient => candidate >= stored,
            VersionPolicy::Strict => stored.checked_add(1) == Some(candidate),
        }
    }
}

/// In-memory metadata store.
///
/// One mutex serializes snapshots and updates, so a snapshot never observes
/// a half-applied update.
pub struct MemoryMetaStore {
    files: Mutex<FileInfoMap>,
    block_store_addrs: Vec<String>,
    ring: ConsistentHashRing,
    policy: VersionPolicy,
}

impl MemoryMetaStore {
    pub fn new(block_store_addrs: Vec<String>) -> Self {
        Self::with_policy(block_store_addrs, VersionPolicy::default())
    }

    pub fn with_policy(block_store_addrs: Vec<String>, policy: VersionPolicy) -> Self {
        let ring = ConsistentHashRing::from_addrs(&block_store_addrs);
        Self {
            files: Mutex::new(FileInfoMap::new()),
            block_store_addrs,
            ring,
            policy,
        }
    }

    pub fn policy(&self) -> VersionPolicy {
        self.policy
    }
}

#[async_trait]
impl MetaStore for MemoryMetaStore {
    async fn get_file_info_map(&self) -> Result<FileInfoMap> {
        let files = self.files.lock().await;
        Ok(files.clone())
    }

    async fn update_file(&self, meta: &FileMetaData) -> Result<u64> {
        let mut files = self.files.lock().await;

        let stored = match files.entry(meta.filename.clone()) {
            Entry::Vacant(entry) => {
                if meta.version == 0 {
                    return Err(SyncError::InvalidRequest(format!(
                        "{} must start at version 1 or above",
                        meta.filename
                    )));
                }
                entry.insert(meta.clone());
                tracing::debug!("Created {} at version {}", meta.filename, meta.version);
                return Ok(meta.version);
            }
            Entry::Occupied(entry) => entry.into_mut(),
        };

        if !self.policy.accepts(meta.version, stored.version) {
            tracing::debug!(
                "Rejected {} at version {} (stored {})",
                meta.filename,
                meta.version,
                stored.version
            );
            return Err(SyncError::VersionTooOld {
                filename: meta.filename.clone(),
                stored: stored.version,
                candidate: meta.version,
            });
        }

        stored.version = stored.version.checked_add(1).ok_or_else(|| {
            SyncError::InvalidRequest(format!("{} is at the last version", meta.filename))
        })?;
        stored.block_hash_list = meta.block_hash_list.clone();
        tracing::debug!("Updated {} to version {}", stored.filename, stored.version);
        Ok(stored.version)
    }

    async fn get_block_store_addr(&self) -> Result<String> {
        self.block_store_addrs
            .first()
            .cloned()
            .ok_or(SyncError::NoServersAvailable)
    }

    async fn get_block_store_addrs(&self) -> Result<Vec<String>> {
        Ok(self.block_store_addrs.clone())
    }

    async fn get_block_store_map(&self, hashes: &[String]) -> Result<BlockStoreMap> {
        self.ring.assign(hashes)
    }
}
