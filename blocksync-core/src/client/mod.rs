//! HTTP clients for the metadata and block services
//!
//! Both implement the storage traits, so the sync engine cannot tell a remote
//! store from an in-process one.

mod retry;

pub use retry::RetryPolicy;

use crate::error::{Result, SyncError};
use crate::storage::{BlockStore, BlockStoreConnector, MetaStore, verify_hash};
use crate::types::{Block, BlockStoreMap, FileInfoMap, FileMetaData};
use crate::wire::{
    BLOCKS_HAS_PATH, BLOCKS_PATH, BlockHashes, BlockStoreAddrResponse, BlockStoreAddrsResponse,
    BlockStoreMapResponse, ErrorResponse, FileInfoMapResponse, META_BLOCK_STORE_ADDR_PATH,
    META_BLOCK_STORE_ADDRS_PATH, META_BLOCK_STORE_MAP_PATH, META_FILES_PATH, PutBlockResponse,
    UpdateFileResponse,
};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, header};
use std::sync::Arc;

/// `host:port` -> `http://host:port`; explicit schemes are kept.
pub fn base_url(addr: &str) -> String {
    let addr = addr.trim().trim_end_matches('/');
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else {
        format!("http://{}", addr)
    }
}

async fn read_error(response: Response) -> (StatusCode, ErrorResponse) {
    let status = response.status();
    let body = response
        .json::<ErrorResponse>()
        .await
        .unwrap_or_else(|_| ErrorResponse {
            error: status.to_string(),
            stored_version: None,
        });
    (status, body)
}

/// Map a non-success response that the caller did not handle itself.
async fn unexpected_status(response: Response, operation: &str) -> SyncError {
    let (status, body) = read_error(response).await;
    if status.is_server_error() {
        SyncError::Network(format!("{} failed: status={} error={}", operation, status, body.error))
    } else {
        SyncError::InvalidRequest(format!(
            "{} rejected: status={} error={}",
            operation, status, body.error
        ))
    }
}

pub struct MetaClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl MetaClient {
    pub fn new(addr: &str) -> Self {
        Self::with_client(Client::new(), addr, RetryPolicy::default())
    }

    pub fn with_client(client: Client, addr: &str, retry: RetryPolicy) -> Self {
        Self {
            client,
            base_url: base_url(addr),
            retry,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl MetaStore for MetaClient {
    async fn get_file_info_map(&self) -> Result<FileInfoMap> {
        let url = self.url(META_FILES_PATH);
        let url = url.as_str();
        let client = &self.client;

        self.retry
            .run("get_file_info_map", move || async move {
                let response = client.get(url).send().await?;
                if !response.status().is_success() {
                    return Err(unexpected_status(response, "get_file_info_map").await);
                }
                let payload: FileInfoMapResponse = response.json().await?;
                Ok(payload.file_info_map)
            })
            .await
    }

    async fn update_file(&self, meta: &FileMetaData) -> Result<u64> {
        let url = self.url(META_FILES_PATH);
        let url = url.as_str();
        let client = &self.client;

        // Not idempotent: a lost response to an applied update would bump the
        // version again on retry. The next pass re-detects a failed commit.
        RetryPolicy::none()
            .run("update_file", move || async move {
                let response = client.post(url).json(meta).send().await?;
                if response.status() == StatusCode::CONFLICT {
                    let (_, body) = read_error(response).await;
                    return Err(SyncError::VersionTooOld {
                        filename: meta.filename.clone(),
                        stored: body.stored_version.unwrap_or_default(),
                        candidate: meta.version,
                    });
                }
                if !response.status().is_success() {
                    return Err(unexpected_status(response, "update_file").await);
                }
                let payload: UpdateFileResponse = response.json().await?;
                Ok(payload.version)
            })
            .await
    }

    async fn get_block_store_addr(&self) -> Result<String> {
        let url = self.url(META_BLOCK_STORE_ADDR_PATH);
        let url = url.as_str();
        let client = &self.client;

        self.retry
            .run("get_block_store_addr", move || async move {
                let response = client.get(url).send().await?;
                if response.status() == StatusCode::SERVICE_UNAVAILABLE {
                    return Err(SyncError::NoServersAvailable);
                }
                if !response.status().is_success() {
                    return Err(unexpected_status(response, "get_block_store_addr").await);
                }
                let payload: BlockStoreAddrResponse = response.json().await?;
                Ok(payload.addr)
            })
            .await
    }

    async fn get_block_store_addrs(&self) -> Result<Vec<String>> {
        let url = self.url(META_BLOCK_STORE_ADDRS_PATH);
        let url = url.as_str();
        let client = &self.client;

        self.retry
            .run("get_block_store_addrs", move || async move {
                let response = client.get(url).send().await?;
                if !response.status().is_success() {
                    return Err(unexpected_status(response, "get_block_store_addrs").await);
                }
                let payload: BlockStoreAddrsResponse = response.json().await?;
                Ok(payload.addrs)
            })
            .await
    }

    async fn get_block_store_map(&self, hashes: &[String]) -> Result<BlockStoreMap> {
        let url = self.url(META_BLOCK_STORE_MAP_PATH);
        let url = url.as_str();
        let client = &self.client;
        let request = BlockHashes {
            hashes: hashes.to_vec(),
        };
        let request = &request;

        self.retry
            .run("get_block_store_map", move || async move {
                let response = client.post(url).json(request).send().await?;
                if response.status() == StatusCode::SERVICE_UNAVAILABLE {
                    return Err(SyncError::NoServersAvailable);
                }
                if !response.status().is_success() {
                    return Err(unexpected_status(response, "get_block_store_map").await);
                }
                let payload: BlockStoreMapResponse = response.json().await?;
                Ok(payload.block_store_map)
            })
            .await
    }
}

pub struct BlockClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl BlockClient {
    pub fn new(addr: &str) -> Self {
        Self::with_client(Client::new(), addr, RetryPolicy::default())
    }

    pub fn with_client(client: Client, addr: &str, retry: RetryPolicy) -> Self {
        Self {
            client,
            base_url: base_url(addr),
            retry,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl BlockStore for BlockClient {
    async fn get_block(&self, hash: &str) -> Result<Block> {
        let url = self.url(&format!("{}/{}", BLOCKS_PATH, hash));
        let url = url.as_str();
        let client = &self.client;

        self.retry
            .run("get_block", move || async move {
                let response = client.get(url).send().await?;
                if response.status() == StatusCode::NOT_FOUND {
                    return Err(SyncError::BlockNotFound(hash.to_string()));
                }
                if !response.status().is_success() {
                    return Err(unexpected_status(response, "get_block").await);
                }
                let data = response.bytes().await?;
                verify_hash(&data, hash)?;
                Ok(Block {
                    hash: hash.to_string(),
                    size: data.len() as u64,
                    data,
                })
            })
            .await
    }

    async fn put_block(&self, block: &Block) -> Result<bool> {
        let url = self.url(BLOCKS_PATH);
        let url = url.as_str();
        let client = &self.client;

        self.retry
            .run("put_block", move || async move {
                let response = client
                    .post(url)
                    .header(header::CONTENT_TYPE, "application/octet-stream")
                    .body(block.data.clone())
                    .send()
                    .await?;
                if !response.status().is_success() {
                    return Err(unexpected_status(response, "put_block").await);
                }
                let payload: PutBlockResponse = response.json().await?;
                if payload.hash != block.hash {
                    return Err(SyncError::HashMismatch {
                        expected: block.hash.clone(),
                        actual: payload.hash,
                    });
                }
                Ok(payload.flag)
            })
            .await
    }

    async fn has_blocks(&self, hashes: &[String]) -> Result<Vec<String>> {
        let url = self.url(BLOCKS_HAS_PATH);
        let url = url.as_str();
        let client = &self.client;
        let request = BlockHashes {
            hashes: hashes.to_vec(),
        };
        let request = &request;

        self.retry
            .run("has_blocks", move || async move {
                let response = client.post(url).json(request).send().await?;
                if !response.status().is_success() {
                    return Err(unexpected_status(response, "has_blocks").await);
                }
                let payload: BlockHashes = response.json().await?;
                Ok(payload.hashes)
            })
            .await
    }
}

/// Opens `BlockClient`s that share one connection pool.
#[derive(Clone, Default)]
pub struct HttpBlockStoreConnector {
    client: Client,
    retry: RetryPolicy,
}

impl HttpBlockStoreConnector {
    pub fn new(client: Client, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }
}

impl BlockStoreConnector for HttpBlockStoreConnector {
    fn connect(&self, addr: &str) -> Result<Arc<dyn BlockStore>> {
        Ok(Arc::new(BlockClient::with_client(
            self.client.clone(),
            addr,
            self.retry,
        )))
    }
}
