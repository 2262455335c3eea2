use crate::accounts::{ConfigIdentityStore, IdentityStore};
use crate::config::{StashNodeConfig, resolve_path};
use anyhow::Context;
use stash_core::TokenCodec;
use stash_fs::{ArchiveBuilder, FileTree, NamespaceResolver};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub mod accounts;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod identity;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub tree: Arc<FileTree>,
    pub identities: Arc<dyn IdentityStore>,
}

impl AppState {
    pub fn new(tree: FileTree, identities: impl IdentityStore + 'static) -> Self {
        Self {
            tree: Arc::new(tree),
            identities: Arc::new(identities),
        }
    }
}

/// Builds the file tree service described by `config`.
///
/// `config_dir` anchors relative paths in the config.
pub fn create_file_tree(config: &StashNodeConfig, config_dir: Option<&Path>) -> anyhow::Result<FileTree> {
    let key = identity::load_signing_key(&config.identity, config_dir)?;
    let tokens = TokenCodec::new(key, Duration::from_secs(config.token.ttl_secs));

    let base_path = resolve_path(config_dir, &config.storage.base_path);
    let namespaces = NamespaceResolver::new(&base_path)
        .with_context(|| format!("storage base path {base_path:?} is not a usable directory"))?;

    let archives = match &config.storage.archive_tmp_dir {
        Some(dir) => ArchiveBuilder::with_temp_dir(resolve_path(config_dir, dir)),
        None => ArchiveBuilder::new(),
    };
    Ok(FileTree::new(tokens, namespaces, archives))
}

pub async fn run_node(config_file_path: PathBuf, config: StashNodeConfig) -> anyhow::Result<()> {
    let tree = create_file_tree(&config, config_file_path.parent())?;
    let state = AppState::new(tree, ConfigIdentityStore::new(config.account.clone()));
    let max_upload_bytes = usize::try_from(config.http.max_upload_bytes).unwrap_or(usize::MAX);
    let app = api::create_router(state, max_upload_bytes);

    let addr = config.http.listen_addr;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("could not bind {addr}"))?;
    tracing::info!("stash node listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    tracing::info!("stash node shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
