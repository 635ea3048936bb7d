use std::sync::Arc;

use picrelay_core::{RepositoryAllocator, UploadOrchestrator};
use picrelay_store::MetadataStore;
use picrelay_upload::{ContentApi, GitHubContentApi, InMemoryContentApi, ObjectUploader};
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// Connect the metadata store named by `config.database_url`.
pub async fn open_store(config: &ServerConfig) -> ServerResult<Arc<dyn MetadataStore>> {
    Ok(picrelay_store::connect(&config.database_url).await?)
}

/// The GitHub client, or the in-process API when `github.api_base` is
/// `memory:`.
pub fn content_api(config: &ServerConfig) -> ServerResult<Arc<dyn ContentApi>> {
    if config.github.uses_memory_backend() {
        tracing::warn!("using in-memory content API; uploads are not persisted");
        return Ok(Arc::new(InMemoryContentApi::new()));
    }
    Ok(Arc::new(GitHubContentApi::new(config.github.client_config())?))
}

/// Wire store, allocator and uploader into an orchestrator.
pub fn build_orchestrator(
    config: &ServerConfig,
    store: Arc<dyn MetadataStore>,
    api: Arc<dyn ContentApi>,
) -> ServerResult<UploadOrchestrator> {
    let allocator = RepositoryAllocator::new(store.clone(), config.repository_list()?);
    let uploader = ObjectUploader::new(api, config.uploader_settings())?;
    Ok(UploadOrchestrator::new(store, allocator, uploader))
}

/// picrelay HTTP server.
pub struct PicrelayServer {
    config: ServerConfig,
    orchestrator: Arc<UploadOrchestrator>,
}

impl PicrelayServer {
    /// Validate `config`, connect the backends and prepare the schema.
    pub async fn build(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;
        let store = open_store(&config).await?;
        let api = content_api(&config)?;
        let orchestrator = build_orchestrator(&config, store, api)?;

        orchestrator.ensure_schema().await?;
        if config.reset_on_start {
            tracing::warn!("reset_on_start is set; clearing rotation counter and upload log");
            orchestrator.store().reset().await?;
        }
        Ok(Self::from_parts(config, Arc::new(orchestrator)))
    }

    pub fn from_parts(config: ServerConfig, orchestrator: Arc<UploadOrchestrator>) -> Self {
        Self {
            config,
            orchestrator,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<UploadOrchestrator> {
        &self.orchestrator
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(
            AppState::new(Arc::clone(&self.orchestrator)),
            self.config.max_upload_bytes,
        )
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            repositories = self.orchestrator.allocator().repositories().len(),
            store = self.orchestrator.store().backend(),
            "picrelay listening on {}",
            self.config.bind_addr
        );
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
