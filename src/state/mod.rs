use std::sync::Arc;

use crate::core::config::{AppConfig, AppPaths, ConfigService};
use crate::llm::{LlmProvider, LlmService, OpenAiProvider};
use crate::rag::{AnswerPipeline, ChunkStore, SqliteChunkStore};

pub mod error;

use error::InitializationError;

/// Shared, read-only application state.
///
/// Everything here is built once at startup; request handlers only borrow it.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ChunkStore>,
    pub llm: LlmService,
    pub pipeline: Arc<AnswerPipeline>,
}

impl AppState {
    pub async fn initialize() -> Result<Arc<Self>, InitializationError> {
        Self::initialize_with_paths(Arc::new(AppPaths::from_env())).await
    }

    /// Loads configuration, opens the chunk store and connects the model provider.
    pub async fn initialize_with_paths(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone())
            .load_settings()
            .map_err(|e| InitializationError::Config(e.into()))?;

        let store = Arc::new(
            SqliteChunkStore::new(paths.as_ref())
                .await
                .map_err(|e| InitializationError::Store(e.into()))?,
        );
        tracing::info!("Chunk store opened at {}", store.db_path().display());

        let llm = Self::build_llm(&config)?;

        Ok(Arc::new(Self::from_parts(paths, config, store, llm)))
    }

    pub fn from_parts(
        paths: Arc<AppPaths>,
        config: AppConfig,
        store: Arc<dyn ChunkStore>,
        llm: LlmService,
    ) -> Self {
        let pipeline = Arc::new(AnswerPipeline::new(store.clone(), llm.clone(), &config));
        Self {
            paths,
            config: Arc::new(config),
            store,
            llm,
            pipeline,
        }
    }

    pub fn build_llm(config: &AppConfig) -> Result<LlmService, InitializationError> {
        if config.llm.base_url.trim().is_empty() {
            return Err(InitializationError::Llm(anyhow::anyhow!(
                "llm.base_url must not be empty"
            )));
        }
        if config.llm.api_key.is_none() {
            tracing::warn!("No LLM API key configured; requests to the provider may be rejected");
        }

        let provider: Arc<dyn LlmProvider> = Arc::new(OpenAiProvider::new(
            config.llm.base_url.clone(),
            config.llm.api_key.clone(),
        ));
        tracing::info!(
            provider = provider.name(),
            chat_model = %config.llm.chat_model,
            analysis_model = %config.llm.analysis_model,
            embedding_model = %config.llm.embedding_model,
            "LLM provider configured"
        );
        Ok(LlmService::new(provider, config.llm.clone()))
    }
}
