//! JSON payloads exchanged between the HTTP clients and the server.

use crate::types::{BlockStoreMap, FileInfoMap};
use serde::{Deserialize, Serialize};

pub const HEALTH_PATH: &str = "/health";
pub const META_FILES_PATH: &str = "/api/v1/meta/files";
pub const META_BLOCK_STORE_ADDR_PATH: &str = "/api/v1/meta/block-store-addr";
pub const META_BLOCK_STORE_ADDRS_PATH: &str = "/api/v1/meta/block-store-addrs";
pub const META_BLOCK_STORE_MAP_PATH: &str = "/api/v1/meta/block-store-map";
pub const BLOCKS_PATH: &str = "/api/v1/blocks";
pub const BLOCKS_HAS_PATH: &str = "/api/v1/blocks/has";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_version: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileInfoMapResponse {
    pub file_info_map: FileInfoMap,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateFileResponse {
    pub version: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockStoreAddrResponse {
    pub addr: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockStoreAddrsResponse {
    pub addrs: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockStoreMapResponse {
    pub block_store_map: BlockStoreMap,
}

/// Request body of `block-store-map` and `blocks/has`, and the reply of the
/// latter.
#[derive(Debug, Serialize, Deserialize)]
pub struct BlockHashes {
    pub hashes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PutBlockResponse {
    pub flag: bool,
    pub hash: String,
}
