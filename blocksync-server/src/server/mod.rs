use crate::config::{RuntimeConfig, ServiceRole};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use blocksync_core::wire::{
    BLOCKS_HAS_PATH, BLOCKS_PATH, HEALTH_PATH, META_BLOCK_STORE_ADDR_PATH,
    META_BLOCK_STORE_ADDRS_PATH, META_BLOCK_STORE_MAP_PATH, META_FILES_PATH,
};
use blocksync_core::{
    BlockStore, FsBlockStore, MemoryBlockStore, MemoryMetaStore, MetaStore, Result, SyncError,
};
use std::sync::Arc;
use tokio::net::TcpListener;

mod block;
mod meta;
mod types;

use block::{get_block, has_blocks, put_block};
use meta::{
    get_block_store_addr, get_block_store_addrs, get_block_store_map, get_file_info_map,
    update_file,
};
pub(crate) use types::*;

/// Largest request body accepted, bounding the block size clients may use.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

pub struct ServerState {
    pub(crate) role: ServiceRole,
    pub(crate) meta_store: Option<Arc<dyn MetaStore>>,
    pub(crate) block_store: Option<Arc<dyn BlockStore>>,
}

impl ServerState {
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        let mut meta_store: Option<Arc<dyn MetaStore>> = None;
        if config.role.serves_meta() {
            meta_store = Some(Arc::new(MemoryMetaStore::with_policy(
                config.block_store_addrs.clone(),
                config.version_policy,
            )));
        }

        let mut block_store: Option<Arc<dyn BlockStore>> = None;
        if config.role.serves_blocks() {
            let store: Arc<dyn BlockStore> = match &config.data_dir {
                Some(dir) => Arc::new(FsBlockStore::new(dir.clone())?),
                None => Arc::new(MemoryBlockStore::new()),
            };
            block_store = Some(store);
        }

        Ok(Self {
            role: config.role,
            meta_store,
            block_store,
        })
    }
}

pub fn build_router(state: Arc<ServerState>) -> Router {
    let mut app = Router::new().route(HEALTH_PATH, get(health));

    if state.role.serves_meta() {
        app = app
            .route(META_FILES_PATH, get(get_file_info_map).post(update_file))
            .route(META_BLOCK_STORE_ADDR_PATH, get(get_block_store_addr))
            .route(META_BLOCK_STORE_ADDRS_PATH, get(get_block_store_addrs))
            .route(META_BLOCK_STORE_MAP_PATH, post(get_block_store_map));
    }

    if state.role.serves_blocks() {
        app = app
            .route(BLOCKS_PATH, post(put_block))
            .route(BLOCKS_HAS_PATH, post(has_blocks))
            .route(&format!("{}/:hash", BLOCKS_PATH), get(get_block));
    }

    app.layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

pub async fn run_server(config: RuntimeConfig) -> Result<()> {
    let state = Arc::new(ServerState::new(&config)?);

    if let Some(dir) = &config.data_dir {
        tracing::info!("Block data directory: {:?}", dir);
    }
    if config.role.serves_meta() {
        tracing::info!(
            "Block stores: {} (version policy {:?})",
            config.block_store_addrs.join(", "),
            config.version_policy
        );
    }

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(
        "Blocksync {} server listening on {}",
        config.role.as_str(),
        config.bind_addr
    );

    axum::serve(listener, build_router(state))
        .await
        .map_err(|error| SyncError::Network(error.to_string()))?;

    Ok(())
}

pub(crate) async fn health(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        role: state.role.as_str().to_string(),
    })
}

pub(crate) fn response_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            stored_version: None,
        }),
    )
        .into_response()
}

pub(crate) fn error_response(error: SyncError) -> Response {
    match error {
        SyncError::VersionTooOld { stored, .. } => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: error.to_string(),
                stored_version: Some(stored),
            }),
        )
            .into_response(),
        SyncError::BlockNotFound(_) => response_error(StatusCode::NOT_FOUND, error.to_string()),
        SyncError::NoServersAvailable => {
            response_error(StatusCode::SERVICE_UNAVAILABLE, error.to_string())
        }
        SyncError::InvalidRequest(_) | SyncError::HashMismatch { .. } => {
            response_error(StatusCode::BAD_REQUEST, error.to_string())
        }
        _ => {
            tracing::error!("Request failed: {}", error);
            response_error(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
        }
    }
}
