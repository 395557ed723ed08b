use super::{
    BlockHashes, BlockStoreAddrResponse, BlockStoreAddrsResponse, BlockStoreMapResponse,
    FileInfoMapResponse, ServerState, UpdateFileResponse, error_response, response_error,
};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use blocksync_core::{FileMetaData, MetaStore};
use std::sync::Arc;

fn meta_store(state: &ServerState) -> Result<&Arc<dyn MetaStore>, Response> {
    state
        .meta_store
        .as_ref()
        .ok_or_else(|| response_error(StatusCode::NOT_FOUND, "meta service is not enabled"))
}

pub(crate) async fn get_file_info_map(State(state): State<Arc<ServerState>>) -> Response {
    let store = match meta_store(&state) {
        Ok(store) => store,
        Err(response) => return response,
    };

    match store.get_file_info_map().await {
        Ok(file_info_map) => {
            (StatusCode::OK, Json(FileInfoMapResponse { file_info_map })).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_file(
    State(state): State<Arc<ServerState>>,
    Json(meta): Json<FileMetaData>,
) -> Response {
    let store = match meta_store(&state) {
        Ok(store) => store,
        Err(response) => return response,
    };

    if let Err(error) = meta.validate() {
        tracing::debug!("Rejected metadata for {:?}: {}", meta.filename, error);
        return error_response(error);
    }

    match store.update_file(&meta).await {
        Ok(version) => {
            tracing::info!("Committed {} at version {}", meta.filename, version);
            (StatusCode::OK, Json(UpdateFileResponse { version })).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn get_block_store_addr(State(state): State<Arc<ServerState>>) -> Response {
    let store = match meta_store(&state) {
        Ok(store) => store,
        Err(response) => return response,
    };

    match store.get_block_store_addr().await {
        Ok(addr) => (StatusCode::OK, Json(BlockStoreAddrResponse { addr })).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn get_block_store_addrs(State(state): State<Arc<ServerState>>) -> Response {
    let store = match meta_store(&state) {
        Ok(store) => store,
        Err(response) => return response,
    };

    match store.get_block_store_addrs().await {
        Ok(addrs) => (StatusCode::OK, Json(BlockStoreAddrsResponse { addrs })).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn get_block_store_map(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<BlockHashes>,
) -> Response {
    let store = match meta_store(&state) {
        Ok(store) => store,
        Err(response) => return response,
    };

    match store.get_block_store_map(&request.hashes).await {
        Ok(block_store_map) => {
            (StatusCode::OK, Json(BlockStoreMapResponse { block_store_map })).into_response()
        }
        Err(error) => error_response(error),
    }
}
