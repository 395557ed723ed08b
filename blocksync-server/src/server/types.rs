use serde::Serialize;

pub(crate) use blocksync_core::wire::{
    BlockHashes, BlockStoreAddrResponse, BlockStoreAddrsResponse, BlockStoreMapResponse,
    ErrorResponse, FileInfoMapResponse, PutBlockResponse, UpdateFileResponse,
};

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: String,
    pub(crate) role: String,
}
