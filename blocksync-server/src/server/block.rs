use super::{BlockHashes, PutBlockResponse, ServerState, error_response, response_error};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use blocksync_core::{Block, BlockStore};
use std::sync::Arc;

fn block_store(state: &ServerState) -> Result<&Arc<dyn BlockStore>, Response> {
    state
        .block_store
        .as_ref()
        .ok_or_else(|| response_error(StatusCode::NOT_FOUND, "block service is not enabled"))
}

pub(crate) async fn get_block(
    State(state): State<Arc<ServerState>>,
    Path(hash): Path<String>,
) -> Response {
    let store = match block_store(&state) {
        Ok(store) => store,
        Err(response) => return response,
    };

    match store.get_block(&hash).await {
        Ok(block) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            block.data,
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn put_block(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
    let store = match block_store(&state) {
        Ok(store) => store,
        Err(response) => return response,
    };

    let block = Block::new(body);
    match store.put_block(&block).await {
        Ok(flag) => {
            tracing::debug!("Stored block {} ({} bytes)", block.hash, block.size);
            (
                StatusCode::OK,
                Json(PutBlockResponse {
                    flag,
                    hash: block.hash,
                }),
            )
                .into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn has_blocks(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<BlockHashes>,
) -> Response {
    let store = match block_store(&state) {
        Ok(store) => store,
        Err(response) => return response,
    };

    match store.has_blocks(&request.hashes).await {
        Ok(hashes) => (StatusCode::OK, Json(BlockHashes { hashes })).into_response(),
        Err(error) => error_response(error),
    }
}
