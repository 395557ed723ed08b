//! Local index file
//!
//! Records the last-synced metadata of every file in the base directory, one
//! line per file: `filename,version,hash1 hash2 ... hashN \n`.

use crate::error::{Result, SyncError};
use crate::types::{FileInfoMap, FileMetaData};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub const INDEX_FILENAME: &str = "index.txt";

/// Whether `name` is the index file or one of its `index.txt.{ulid}.tmp`
/// temp files.
pub fn is_index_file(name: &str) -> bool {
    if name == INDEX_FILENAME {
        return true;
    }
    name.strip_prefix(INDEX_FILENAME)
        .and_then(|rest| rest.strip_prefix('.'))
        .and_then(|rest| rest.strip_suffix(".tmp"))
        .is_some_and(|id| ulid::Ulid::from_string(id).is_ok())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalIndex {
    pub entries: FileInfoMap,
}

impl LocalIndex {
    pub fn path(base_dir: &Path) -> PathBuf {
        base_dir.join(INDEX_FILENAME)
    }

    /// Create an empty index file unless one exists.
    pub async fn ensure_exists(base_dir: &Path) -> Result<()> {
        let path = Self::path(base_dir);
        if fs::try_exists(&path).await? {
            return Ok(());
        }
        fs::write(&path, b"").await?;
        tracing::info!("Created empty index at {:?}", path);
        Ok(())
    }

    pub async fn load(base_dir: &Path) -> Result<Self> {
        let contents = fs::read_to_string(Self::path(base_dir)).await?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let mut entries = FileInfoMap::new();
        for (lineno, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let meta = parse_line(line)
                .map_err(|error| SyncError::Index(format!("line {}: {}", lineno + 1, error)))?;
            entries.insert(meta.filename.clone(), meta);
        }
        Ok(Self { entries })
    }

    pub fn format(&self) -> String {
        self.entries.values().map(format_line).collect()
    }

    /// Rewrite the index via temp file + rename.
    pub async fn save(&self, base_dir: &Path) -> Result<()> {
        let path = Self::path(base_dir);
        let tmp_path = base_dir.join(format!("{}.{}.tmp", INDEX_FILENAME, ulid::Ulid::new()));

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(self.format().as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(error) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(error.into());
        }

        tracing::debug!("Saved index with {} entries", self.entries.len());
        Ok(())
    }

    pub fn get(&self, filename: &str) -> Option<&FileMetaData> {
        self.entries.get(filename)
    }

    pub fn insert(&mut self, meta: FileMetaData) {
        self.entries.insert(meta.filename.clone(), meta);
    }
}

pub fn format_line(meta: &FileMetaData) -> String {
    let mut line = format!("{},{},", meta.filename, meta.version);
    for hash in &meta.block_hash_list {
        line.push_str(hash);
        line.push(' ');
    }
    line.push('\n');
    line
}

/// Split from the right so that filenames may contain commas.
pub fn parse_line(line: &str) -> std::result::Result<FileMetaData, String> {
    let mut fields = line.rsplitn(3, ',');
    let hashes = fields.next().ok_or("missing block hash list")?;
    let version = fields.next().ok_or("missing version")?;
    let filename = fields.next().ok_or("missing filename")?;

    if filename.is_empty() {
        return Err("empty filename".to_string());
    }
    let version = version
        .trim()
        .parse::<u64>()
        .map_err(|_| format!("invalid version '{}'", version))?;
    let block_hash_list: Vec<String> = hashes.split_whitespace().map(str::to_string).collect();
    if block_hash_list.is_empty() {
        return Err("empty block hash list".to_string());
    }

    Ok(FileMetaData::new(filename, version, block_hash_list))
}
