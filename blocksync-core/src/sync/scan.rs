//! Base directory scanning

use crate::chunker::Chunker;
use crate::error::{Result, SyncError};
use crate::index::is_index_file;
use crate::types::validate_filename;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tokio::fs;

/// Suffix of in-flight download files.
pub const DOWNLOAD_TMP_SUFFIX: &str = ".blocksync-tmp";

/// Result of scanning the base directory
#[derive(Debug, Default)]
pub struct LocalScan {
    /// filename -> block hash list of the current contents
    pub files: BTreeMap<String, Vec<String>>,
    /// Files that exist but could not be read this pass
    pub unreadable: BTreeSet<String>,
    /// Files whose names cannot be synced, with the reason
    pub rejected: Vec<(String, SyncError)>,
}

impl LocalScan {
    /// Whether `filename` is present on disk, readable or not.
    pub fn exists(&self, filename: &str) -> bool {
        self.files.contains_key(filename) || self.unreadable.contains(filename)
    }
}

fn is_ignored(name: &str) -> bool {
    is_index_file(name) || name.ends_with(DOWNLOAD_TMP_SUFFIX)
}

/// Hash every regular file directly under `base_dir`.
///
/// Subdirectories, the index file and temp files are skipped. Failing to list
/// the directory is fatal; failing to read a single file or an unsyncable
/// name is not.
pub async fn scan_dir(base_dir: &Path, chunker: &Chunker) -> Result<LocalScan> {
    let mut scan = LocalScan::default();
    let mut entries = fs::read_dir(base_dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            tracing::warn!("Skipping non UTF-8 filename {:?}", entry.file_name());
            continue;
        };
        if is_ignored(&name) {
            continue;
        }

        let file_type = match entry.file_type().await {
            Ok(file_type) => file_type,
            Err(error) => {
                tracing::warn!("Failed to stat {}: {}", name, error);
                scan.unreadable.insert(name);
                continue;
            }
        };
        if !file_type.is_file() {
            continue;
        }
        if let Err(error) = validate_filename(&name) {
            scan.rejected.push((name, error));
            continue;
        }

        match fs::read(entry.path()).await {
            Ok(data) => {
                scan.files.insert(name, chunker.hash_list(data));
            }
            Err(error) => {
                tracing::warn!("Failed to read {}: {}", name, error);
                scan.unreadable.insert(name);
            }
        }
    }

    Ok(scan)
}
