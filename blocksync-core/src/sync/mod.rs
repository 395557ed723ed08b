//! Client-side reconciliation
//!
//! One `SyncEngine::run` call is one sequential pass: scan the base directory,
//! compare it with the local index and the remote snapshot, push local
//! changes, pull remote changes and persist the index.

mod scan;
mod transfer;

pub use scan::{DOWNLOAD_TMP_SUFFIX, LocalScan, scan_dir};
pub use transfer::{download_blocks, remove_local, upload_blocks, write_file_atomic};

use crate::chunker::{Chunker, assemble};
use crate::error::{Result, SyncError};
use crate::index::LocalIndex;
use crate::storage::{BlockStoreConnector, MetaStore};
use crate::types::{FileInfoMap, FileMetaData, tombstone_list};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Per-pass classification of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Unchanged,
    LocallyModified,
    LocallyDeleted,
    RemoteAhead,
    InConflict,
}

#[derive(Debug)]
pub struct FileFailure {
    pub filename: String,
    pub error: SyncError,
}

/// Outcome of one sync pass
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Local content committed to the server
    pub uploaded: Vec<String>,
    /// Local deletions committed to the server
    pub deleted: Vec<String>,
    /// Remote content written locally
    pub downloaded: Vec<String>,
    /// Local files removed because the server holds a tombstone
    pub removed: Vec<String>,
    /// Files whose local candidate lost to the remote version
    pub conflicts: Vec<String>,
    pub failures: Vec<FileFailure>,
    pub states: BTreeMap<String, FileState>,
    /// Blocks actually sent to block servers
    pub blocks_sent: usize,
}

impl SyncReport {
    pub fn state(&self, filename: &str) -> Option<FileState> {
        self.states.get(filename).copied()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, filename: &str, error: SyncError) {
        tracing::warn!("Sync of {} failed: {}", filename, error);
        self.failures.push(FileFailure {
            filename: filename.to_string(),
            error,
        });
    }
}

/// Local changes since the last pass, as candidate metadata.
fn detect_local_changes(scan: &LocalScan, index: &LocalIndex) -> Vec<FileMetaData> {
    let mut candidates = Vec::new();

    for (filename, hashes) in &scan.files {
        match index.get(filename) {
            Some(prior) if &prior.block_hash_list == hashes => {}
            Some(prior) => {
                let version = prior.version.saturating_add(1);
                candidates.push(FileMetaData::new(filename, version, hashes.clone()));
            }
            None => candidates.push(FileMetaData::new(filename, 1, hashes.clone())),
        }
    }

    for (filename, prior) in &index.entries {
        if !scan.exists(filename) && !prior.is_tombstone() {
            candidates.push(FileMetaData::tombstone(filename, prior.version.saturating_add(1)));
        }
    }

    candidates
}

fn is_ahead(candidate: &FileMetaData, remote: &FileInfoMap) -> bool {
    remote
        .get(&candidate.filename)
        .is_none_or(|stored| candidate.version > stored.version)
}

fn needs_download(remote: &FileMetaData, local: Option<&FileMetaData>) -> bool {
    match local {
        None => true,
        Some(local) => {
            remote.version > local.version
                || (remote.version == local.version
                    && remote.block_hash_list != local.block_hash_list)
        }
    }
}

enum Applied {
    Written,
    Removed,
    Absent,
}

pub struct SyncEngine {
    base_dir: PathBuf,
    chunker: Chunker,
    meta_store: Arc<dyn MetaStore>,
    connector: Arc<dyn BlockStoreConnector>,
}

impl SyncEngine {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        block_size: usize,
        meta_store: Arc<dyn MetaStore>,
        connector: Arc<dyn BlockStoreConnector>,
    ) -> Result<Self> {
        Ok(Self {
            base_dir: base_dir.into(),
            chunker: Chunker::new(block_size)?,
            meta_store,
            connector,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub async fn run(&self) -> Result<SyncReport> {
        LocalIndex::ensure_exists(&self.base_dir).await?;
        let mut scan = scan_dir(&self.base_dir, &self.chunker).await?;
        let mut index = LocalIndex::load(&self.base_dir).await?;
        let mut remote = self.meta_store.get_file_info_map().await?;

        let mut report = SyncReport::default();
        for (filename, error) in std::mem::take(&mut scan.rejected) {
            report.fail(&filename, error);
        }
        for filename in scan
            .files
            .keys()
            .chain(index.entries.keys())
            .chain(remote.keys())
        {
            report
                .states
                .insert(filename.clone(), FileState::Unchanged);
        }

        let candidates = detect_local_changes(&scan, &index);
        tracing::debug!(
            "Scanned {} files, {} local changes, {} remote entries",
            scan.files.len(),
            candidates.len(),
            remote.len()
        );

        // Files re-reconciled through the download path
        let mut forced: BTreeSet<String> = BTreeSet::new();
        // Files whose local edits must survive this pass untouched
        let mut held: BTreeSet<String> = BTreeSet::new();

        if candidates.iter().any(|candidate| is_ahead(candidate, &remote)) {
            match self.meta_store.get_file_info_map().await {
                Ok(latest) => remote = latest,
                Err(error) => tracing::warn!("Failed to refresh remote snapshot: {}", error),
            }
        }

        for candidate in candidates {
            let filename = candidate.filename.clone();

            if !is_ahead(&candidate, &remote) {
                let same_content = remote
                    .get(&filename)
                    .is_some_and(|stored| stored.block_hash_list == candidate.block_hash_list);
                if same_content {
                    // Another client already committed the same content
                    if let Some(stored) = remote.get(&filename) {
                        index.insert(stored.clone());
                    }
                } else {
                    tracing::info!("{} changed locally but the server is ahead", filename);
                    report.conflicts.push(filename.clone());
                    report.states.insert(filename.clone(), FileState::InConflict);
                    forced.insert(filename);
                }
                continue;
            }

            match self.commit(&candidate).await {
                Ok((accepted, sent)) => {
                    report.blocks_sent += sent;
                    if accepted.is_tombstone() && candidate.is_tombstone() {
                        tracing::info!("Deleted {} (version {})", filename, accepted.version);
                        report.deleted.push(filename.clone());
                        report
                            .states
                            .insert(filename.clone(), FileState::LocallyDeleted);
                    } else {
                        tracing::info!("Uploaded {} (version {})", filename, accepted.version);
                        report.uploaded.push(filename.clone());
                        report
                            .states
                            .insert(filename.clone(), FileState::LocallyModified);
                    }
                    index.insert(accepted);
                }
                Err(SyncError::VersionTooOld { stored, .. }) => {
                    tracing::info!(
                        "Server rejected {} version {} (stored {}), pulling remote copy",
                        filename,
                        candidate.version,
                        stored
                    );
                    report.conflicts.push(filename.clone());
                    report.states.insert(filename.clone(), FileState::InConflict);
                    match self.meta_store.get_file_info_map().await {
                        Ok(latest) => {
                            remote = latest;
                            forced.insert(filename);
                        }
                        Err(error) => {
                            report.fail(&filename, error);
                            held.insert(filename);
                        }
                    }
                }
                Err(error) => {
                    report.fail(&filename, error);
                    held.insert(filename);
                }
            }
        }

        for (filename, stored) in &remote {
            if held.contains(filename) {
                continue;
            }
            if !forced.contains(filename) && !needs_download(stored, index.get(filename)) {
                continue;
            }
            if let Err(error) = stored.validate() {
                report.fail(filename, error);
                continue;
            }

            match self.apply_remote(stored).await {
                Ok(applied) => {
                    match applied {
                        Applied::Written => {
                            tracing::info!("Downloaded {} (version {})", filename, stored.version);
                            report.downloaded.push(filename.clone());
                        }
                        Applied::Removed => {
                            tracing::info!("Removed {} (deleted remotely)", filename);
                            report.removed.push(filename.clone());
                        }
                        Applied::Absent => {}
                    }
                    if !forced.contains(filename) {
                        report
                            .states
                            .insert(filename.clone(), FileState::RemoteAhead);
                    }
                    index.insert(stored.clone());
                }
                Err(error) => report.fail(filename, error),
            }
        }

        index.save(&self.base_dir).await?;
        Ok(report)
    }

    /// Upload blocks, then commit metadata. Returns the accepted metadata and
    /// the number of blocks sent.
    async fn commit(&self, candidate: &FileMetaData) -> Result<(FileMetaData, usize)> {
        let mut meta = candidate.clone();
        let mut sent = 0usize;

        if !meta.is_tombstone() {
            // Re-read so the committed list matches the blocks we push
            let blocks = self
                .chunker
                .chunk_file(&self.base_dir.join(&meta.filename))
                .await?;
            if blocks.is_empty() {
                meta.block_hash_list = tombstone_list();
            } else {
                meta.block_hash_list = blocks.iter().map(|block| block.hash.clone()).collect();
                sent = upload_blocks(self.meta_store.as_ref(), self.connector.as_ref(), &blocks)
                    .await?;
            }
        }

        meta.version = self.meta_store.update_file(&meta).await?;
        Ok((meta, sent))
    }

    async fn apply_remote(&self, stored: &FileMetaData) -> Result<Applied> {
        if stored.is_tombstone() {
            let existed = remove_local(&self.base_dir, &stored.filename).await?;
            return Ok(if existed {
                Applied::Removed
            } else {
                Applied::Absent
            });
        }

        let blocks = download_blocks(
            self.meta_store.as_ref(),
            self.connector.as_ref(),
            &stored.block_hash_list,
        )
        .await?;
        write_file_atomic(&self.base_dir, &stored.filename, &assemble(&blocks)).await?;
        Ok(Applied::Written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::INDEX_FILENAME;
    use crate::storage::{
        BlockStore, MemoryBlockStore, MemoryMetaStore, StaticBlockStoreConnector,
    };
    use crate::types::{Block, BlockStoreMap};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    const BLOCK_SIZE: usize = 4096;

    /// MetaStore wrapper counting every call.
    struct CountingMetaStore {
        inner: Arc<dyn MetaStore>,
        calls: AtomicUsize,
    }

    impl CountingMetaStore {
        fn new(inner: Arc<dyn MetaStore>) -> Self {
            Self {
                inner,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn tick(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl MetaStore for CountingMetaStore {
        async fn get_file_info_map(&self) -> Result<FileInfoMap> {
            self.tick();
            self.inner.get_file_info_map().await
        }

        async fn update_file(&self, meta: &FileMetaData) -> Result<u64> {
            self.tick();
            self.inner.update_file(meta).await
        }

        async fn get_block_store_addr(&self) -> Result<String> {
            self.tick();
            self.inner.get_block_store_addr().await
        }

        async fn get_block_store_addrs(&self) -> Result<Vec<String>> {
            self.tick();
            self.inner.get_block_store_addrs().await
        }

        async fn get_block_store_map(&self, hashes: &[String]) -> Result<BlockStoreMap> {
            self.tick();
            self.inner.get_block_store_map(hashes).await
        }
    }

    /// MetaStore that lets a competing writer commit twice right before the
    /// first `update_file` of `filename` goes through.
    struct RacingMetaStore {
        inner: Arc<MemoryMetaStore>,
        blocks: Arc<MemoryBlockStore>,
        race: Mutex<Option<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl MetaStore for RacingMetaStore {
        async fn get_file_info_map(&self) -> Result<FileInfoMap> {
            self.inner.get_file_info_map().await
        }

        async fn update_file(&self, meta: &FileMetaData) -> Result<u64> {
            let race = self.race.lock().await.take();
            if let Some((filename, contents)) = race {
                let block = Block::new(contents);
                self.blocks.put_block(&block).await?;
                let current = self.inner.get_file_info_map().await?[&filename].version;
                let theirs = FileMetaData::new(&filename, current + 1, vec![block.hash.clone()]);
                self.inner.update_file(&theirs).await?;
                self.inner.update_file(&theirs).await?;
            }
            self.inner.update_file(meta).await
        }

        async fn get_block_store_addr(&self) -> Result<String> {
            self.inner.get_block_store_addr().await
        }

        async fn get_block_store_addrs(&self) -> Result<Vec<String>> {
            self.inner.get_block_store_addrs().await
        }

        async fn get_block_store_map(&self, hashes: &[String]) -> Result<BlockStoreMap> {
            self.inner.get_block_store_map(hashes).await
        }
    }

    struct Remote {
        meta: Arc<MemoryMetaStore>,
        blocks: Arc<MemoryBlockStore>,
        connector: Arc<StaticBlockStoreConnector>,
    }

    impl Remote {
        fn new() -> Self {
            let addr = "localhost:8081";
            let meta = Arc::new(MemoryMetaStore::new(vec![addr.to_string()]));
            let blocks = Arc::new(MemoryBlockStore::new());
            let mut connector = StaticBlockStoreConnector::new();
            connector.insert(addr, blocks.clone());
            Self {
                meta,
                blocks,
                connector: Arc::new(connector),
            }
        }

        fn engine(&self, base_dir: &Path) -> SyncEngine {
            self.engine_with(base_dir, self.meta.clone())
        }

        fn engine_with(&self, base_dir: &Path, meta: Arc<dyn MetaStore>) -> SyncEngine {
            SyncEngine::new(base_dir, BLOCK_SIZE, meta, self.connector.clone()).unwrap()
        }

        async fn file(&self, filename: &str) -> FileMetaData {
            self.meta.get_file_info_map().await.unwrap()[filename].clone()
        }
    }

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len)
            .map(|i| ((i * 7 + i / 251) as u8).wrapping_add(seed))
            .collect()
    }

    #[tokio::test]
    async fn empty_pass_only_fetches_snapshot() {
        let remote = Remote::new();
        let dir = tempfile::tempdir().unwrap();
        let counting = Arc::new(CountingMetaStore::new(remote.meta.clone()));
        let engine = remote.engine_with(dir.path(), counting.clone());

        let report = engine.run().await.unwrap();
        assert!(report.is_clean());
        assert!(report.states.is_empty());
        assert_eq!(counting.calls(), 1);
        assert_eq!(
            std::fs::read_to_string(dir.path().join(INDEX_FILENAME)).unwrap(),
            ""
        );
    }

    #[tokio::test]
    async fn upload_splits_file_into_blocks() {
        let remote = Remote::new();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), pattern(BLOCK_SIZE * 5 / 2, 1)).unwrap();

        let report = remote.engine(dir.path()).run().await.unwrap();
        assert_eq!(report.uploaded, vec!["a.txt"]);
        assert_eq!(report.state("a.txt"), Some(FileState::LocallyModified));
        assert_eq!(report.blocks_sent, 3);

        let stored = remote.file("a.txt").await;
        assert_eq!(stored.version, 1);
        assert_eq!(stored.block_hash_list.len(), 3);
        assert_eq!(remote.blocks.len().await, 3);
        assert_eq!(
            remote.blocks.has_blocks(&stored.block_hash_list).await.unwrap().len(),
            3
        );

        let index = LocalIndex::load(dir.path()).await.unwrap();
        assert_eq!(index.get("a.txt"), Some(&stored));
    }

    #[tokio::test]
    async fn second_pass_without_changes_is_quiet() {
        let remote = Remote::new();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), pattern(10_000, 2)).unwrap();
        remote.engine(dir.path()).run().await.unwrap();

        let counting = Arc::new(CountingMetaStore::new(remote.meta.clone()));
        let report = remote
            .engine_with(dir.path(), counting.clone())
            .run()
            .await
            .unwrap();
        assert_eq!(report.state("a.txt"), Some(FileState::Unchanged));
        assert!(report.uploaded.is_empty() && report.downloaded.is_empty());
        assert_eq!(counting.calls(), 1);
    }

    #[tokio::test]
    async fn fresh_client_reconstructs_file() {
        let remote = Remote::new();
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let contents = pattern(BLOCK_SIZE * 5 / 2, 3);
        std::fs::write(first.path().join("a.txt"), &contents).unwrap();
        remote.engine(first.path()).run().await.unwrap();

        let report = remote.engine(second.path()).run().await.unwrap();
        assert_eq!(report.downloaded, vec!["a.txt"]);
        assert_eq!(report.state("a.txt"), Some(FileState::RemoteAhead));
        assert_eq!(std::fs::read(second.path().join("a.txt")).unwrap(), contents);

        let index = LocalIndex::load(second.path()).await.unwrap();
        assert_eq!(index.get("a.txt"), Some(&remote.file("a.txt").await));
    }

    #[tokio::test]
    async fn deletion_propagates_to_other_clients() {
        let remote = Remote::new();
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(first.path().join("a.txt"), pattern(5000, 4)).unwrap();
        remote.engine(first.path()).run().await.unwrap();
        remote.engine(second.path()).run().await.unwrap();
        assert!(second.path().join("a.txt").exists());

        std::fs::remove_file(first.path().join("a.txt")).unwrap();
        let report = remote.engine(first.path()).run().await.unwrap();
        assert_eq!(report.deleted, vec!["a.txt"]);
        assert_eq!(report.state("a.txt"), Some(FileState::LocallyDeleted));

        let stored = remote.file("a.txt").await;
        assert_eq!(stored.version, 2);
        assert!(stored.is_tombstone());

        let report = remote.engine(second.path()).run().await.unwrap();
        assert_eq!(report.removed, vec!["a.txt"]);
        assert!(!second.path().join("a.txt").exists());
        let index = LocalIndex::load(second.path()).await.unwrap();
        assert!(index.get("a.txt").unwrap().is_tombstone());

        // A tombstoned entry is not deleted again
        let report = remote.engine(first.path()).run().await.unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(remote.file("a.txt").await.version, 2);
    }

    #[tokio::test]
    async fn recreated_file_gets_next_version() {
        let remote = Remote::new();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), pattern(100, 5)).unwrap();
        remote.engine(dir.path()).run().await.unwrap();
        std::fs::remove_file(dir.path().join("a.txt")).unwrap();
        remote.engine(dir.path()).run().await.unwrap();

        std::fs::write(dir.path().join("a.txt"), pattern(100, 6)).unwrap();
        let report = remote.engine(dir.path()).run().await.unwrap();
        assert_eq!(report.uploaded, vec!["a.txt"]);
        let stored = remote.file("a.txt").await;
        assert_eq!(stored.version, 3);
        assert!(!stored.is_tombstone());
    }

    #[tokio::test]
    async fn losing_writer_downloads_winning_version() {
        let remote = Remote::new();
        let alice = tempfile::tempdir().unwrap();
        let bob = tempfile::tempdir().unwrap();
        std::fs::write(alice.path().join("a.txt"), b"base").unwrap();
        remote.engine(alice.path()).run().await.unwrap();
        remote.engine(bob.path()).run().await.unwrap();

        std::fs::write(alice.path().join("a.txt"), b"alice edit").unwrap();
        std::fs::write(bob.path().join("a.txt"), b"bob edit").unwrap();

        remote.engine(alice.path()).run().await.unwrap();
        let report = remote.engine(bob.path()).run().await.unwrap();

        assert_eq!(report.conflicts, vec!["a.txt"]);
        assert_eq!(report.state("a.txt"), Some(FileState::InConflict));
        assert!(report.uploaded.is_empty());
        assert_eq!(std::fs::read(bob.path().join("a.txt")).unwrap(), b"alice edit");
        assert_eq!(remote.file("a.txt").await.version, 2);
    }

    #[tokio::test]
    async fn rejected_update_is_re_reconciled() {
        let remote = Remote::new();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"base").unwrap();
        remote.engine(dir.path()).run().await.unwrap();

        let racing = Arc::new(RacingMetaStore {
            inner: remote.meta.clone(),
            blocks: remote.blocks.clone(),
            race: Mutex::new(Some(("a.txt".to_string(), b"theirs".to_vec()))),
        });
        std::fs::write(dir.path().join("a.txt"), b"mine").unwrap();

        let report = remote.engine_with(dir.path(), racing).run().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.conflicts, vec!["a.txt"]);
        assert!(report.uploaded.is_empty());
        assert_eq!(report.downloaded, vec!["a.txt"]);
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"theirs");

        let stored = remote.file("a.txt").await;
        assert_eq!(stored.version, 3);
        let index = LocalIndex::load(dir.path()).await.unwrap();
        assert_eq!(index.get("a.txt"), Some(&stored));
    }

    #[tokio::test]
    async fn failed_upload_keeps_prior_index_entry() {
        let remote = Remote::new();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), pattern(3000, 7)).unwrap();

        // No block servers reachable
        let offline = SyncEngine::new(
            dir.path(),
            BLOCK_SIZE,
            remote.meta.clone(),
            Arc::new(StaticBlockStoreConnector::new()),
        )
        .unwrap();
        let report = offline.run().await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].filename, "a.txt");
        assert!(remote.meta.get_file_info_map().await.unwrap().is_empty());
        assert!(LocalIndex::load(dir.path()).await.unwrap().get("a.txt").is_none());

        // The next pass detects the change again
        let report = remote.engine(dir.path()).run().await.unwrap();
        assert_eq!(report.uploaded, vec!["a.txt"]);
    }

    #[tokio::test]
    async fn failed_download_leaves_local_file() {
        let remote = Remote::new();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"local").unwrap();
        remote.engine(dir.path()).run().await.unwrap();

        // Metadata points at a block no server holds
        let missing = crate::storage::compute_hash(b"lost");
        remote
            .meta
            .update_file(&FileMetaData::new("a.txt", 2, vec![missing]))
            .await
            .unwrap();

        let report = remote.engine(dir.path()).run().await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0].error,
            SyncError::BlockNotFound(_)
        ));
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"local");
        assert_eq!(
            LocalIndex::load(dir.path()).await.unwrap().get("a.txt").unwrap().version,
            1
        );
    }

    #[tokio::test]
    async fn same_version_with_different_blocks_is_downloaded() {
        let remote = Remote::new();
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        std::fs::write(other.path().join("a.txt"), b"server copy").unwrap();
        remote.engine(other.path()).run().await.unwrap();

        // Local index claims version 1 with different content
        std::fs::write(dir.path().join("a.txt"), b"stale copy").unwrap();
        let chunker = Chunker::new(BLOCK_SIZE).unwrap();
        let mut index = LocalIndex::default();
        index.insert(FileMetaData::new(
            "a.txt",
            1,
            chunker.hash_list(b"stale copy".to_vec()),
        ));
        index.save(dir.path()).await.unwrap();

        let report = remote.engine(dir.path()).run().await.unwrap();
        assert_eq!(report.downloaded, vec!["a.txt"]);
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"server copy");
    }

    #[tokio::test]
    async fn empty_file_syncs_as_tombstone() {
        let remote = Remote::new();
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(first.path().join("empty.txt"), b"").unwrap();

        remote.engine(first.path()).run().await.unwrap();
        assert!(remote.file("empty.txt").await.is_tombstone());

        remote.engine(second.path()).run().await.unwrap();
        assert!(!second.path().join("empty.txt").exists());
    }

    #[tokio::test]
    async fn unsyncable_local_name_does_not_break_index() {
        let remote = Remote::new();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a\nb"), b"line break").unwrap();
        std::fs::write(dir.path().join("ok.txt"), b"fine").unwrap();

        let report = remote.engine(dir.path()).run().await.unwrap();
        assert_eq!(report.uploaded, vec!["ok.txt"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].filename, "a\nb");
        assert!(matches!(
            report.failures[0].error,
            SyncError::InvalidRequest(_)
        ));
        let files = remote.meta.get_file_info_map().await.unwrap();
        assert_eq!(files.keys().collect::<Vec<_>>(), vec!["ok.txt"]);

        // Later passes, here and on other clients, still parse the index
        let report = remote.engine(dir.path()).run().await.unwrap();
        assert_eq!(report.state("ok.txt"), Some(FileState::Unchanged));
        let other = tempfile::tempdir().unwrap();
        remote.engine(other.path()).run().await.unwrap();
        remote.engine(other.path()).run().await.unwrap();
        assert_eq!(std::fs::read(other.path().join("ok.txt")).unwrap(), b"fine");
    }

    #[tokio::test]
    async fn remote_entries_cannot_escape_base_dir() {
        let remote = Remote::new();
        let root = tempfile::tempdir().unwrap();
        let base = root.path().join("base");
        std::fs::create_dir(&base).unwrap();
        std::fs::write(root.path().join("victim.txt"), b"keep me").unwrap();

        let block = Block::new(b"payload".to_vec());
        remote.blocks.put_block(&block).await.unwrap();
        for name in ["../escaped.txt", "index.txt"] {
            remote
                .meta
                .update_file(&FileMetaData::new(name, 1, vec![block.hash.clone()]))
                .await
                .unwrap();
        }
        remote
            .meta
            .update_file(&FileMetaData::tombstone("../victim.txt", 1))
            .await
            .unwrap();
        remote
            .meta
            .update_file(&FileMetaData::new("good.txt", 1, vec![block.hash.clone()]))
            .await
            .unwrap();

        let report = remote.engine(&base).run().await.unwrap();
        assert_eq!(report.downloaded, vec!["good.txt"]);
        assert!(report.removed.is_empty());
        let mut failed: Vec<&str> = report
            .failures
            .iter()
            .map(|failure| failure.filename.as_str())
            .collect();
        failed.sort();
        assert_eq!(failed, vec!["../escaped.txt", "../victim.txt", "index.txt"]);

        assert!(!root.path().join("escaped.txt").exists());
        assert_eq!(std::fs::read(root.path().join("victim.txt")).unwrap(), b"keep me");
        let index = LocalIndex::load(&base).await.unwrap();
        assert_eq!(index.entries.keys().collect::<Vec<_>>(), vec!["good.txt"]);
    }

    #[tokio::test]
    async fn corrupt_index_aborts_pass() {
        let remote = Remote::new();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(INDEX_FILENAME), "not an index line\n").unwrap();

        assert!(matches!(
            remote.engine(dir.path()).run().await,
            Err(SyncError::Index(_))
        ));
    }

    #[test]
    fn zero_block_size_is_a_config_error() {
        let remote = Remote::new();
        let result = SyncEngine::new(
            "/tmp",
            0,
            remote.meta.clone(),
            remote.connector.clone(),
        );
        assert!(matches!(result, Err(SyncError::Config(_))));
    }
}
