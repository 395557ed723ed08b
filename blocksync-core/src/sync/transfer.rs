use super::scan::DOWNLOAD_TMP_SUFFIX;
use crate::error::{Result, SyncError};
use crate::storage::{BlockStoreConnector, MetaStore, verify_hash};
use crate::types::Block;
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

fn unique_hashes<'a>(hashes: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    hashes
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .cloned()
        .collect()
}

/// Push the blocks the responsible servers do not hold yet.
///
/// Returns the number of blocks actually sent.
pub async fn upload_blocks(
    meta_store: &dyn MetaStore,
    connector: &dyn BlockStoreConnector,
    blocks: &[Block],
) -> Result<usize> {
    let by_hash: HashMap<&str, &Block> = blocks
        .iter()
        .map(|block| (block.hash.as_str(), block))
        .collect();
    let hashes = unique_hashes(blocks.iter().map(|block| &block.hash));
    let placement = meta_store.get_block_store_map(&hashes).await?;

    let mut sent = 0usize;
    for (addr, owned) in placement {
        let store = connector.connect(&addr)?;
        let present: BTreeSet<String> = store.has_blocks(&owned).await?.into_iter().collect();

        for hash in owned.iter().filter(|hash| !present.contains(*hash)) {
            let block = by_hash.get(hash.as_str()).ok_or_else(|| {
                SyncError::InvalidRequest(format!("placement returned unknown block {}", hash))
            })?;
            store.put_block(block).await?;
            sent += 1;
        }
        tracing::debug!(
            "Block server {}: {} present, {} sent",
            addr,
            present.len(),
            owned.len().saturating_sub(present.len())
        );
    }

    Ok(sent)
}

/// Fetch every block of `hash_list` from its responsible server, in order.
pub async fn download_blocks(
    meta_store: &dyn MetaStore,
    connector: &dyn BlockStoreConnector,
    hash_list: &[String],
) -> Result<Vec<Block>> {
    let hashes = unique_hashes(hash_list);
    let placement = meta_store.get_block_store_map(&hashes).await?;

    let mut fetched: HashMap<String, Block> = HashMap::with_capacity(hashes.len());
    for (addr, owned) in placement {
        let store = connector.connect(&addr)?;
        for hash in owned {
            let block = store.get_block(&hash).await?;
            verify_hash(&block.data, &hash)?;
            fetched.insert(hash, block);
        }
    }

    hash_list
        .iter()
        .map(|hash| {
            fetched
                .get(hash)
                .cloned()
                .ok_or_else(|| SyncError::BlockNotFound(hash.clone()))
        })
        .collect()
}

/// Replace `base_dir/filename` with `data` via temp file + rename.
pub async fn write_file_atomic(base_dir: &Path, filename: &str, data: &Bytes) -> Result<()> {
    let path = base_dir.join(filename);
    let tmp_path = base_dir.join(format!(
        "{}.{}{}",
        filename,
        ulid::Ulid::new(),
        DOWNLOAD_TMP_SUFFIX
    ));

    let mut file = fs::File::create(&tmp_path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(error) = fs::rename(&tmp_path, &path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(error.into());
    }
    Ok(())
}

/// Remove `base_dir/filename`; returns false when it did not exist.
pub async fn remove_local(base_dir: &Path, filename: &str) -> Result<bool> {
    match fs::remove_file(base_dir.join(filename)).await {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(error) => Err(error.into()),
    }
}
