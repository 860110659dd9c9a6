use std::sync::Arc;

use super::provider::{LlmProvider, TokenStream};
use super::types::{ChatMessage, ChatRequest};
use crate::core::config::settings::LlmConfig;
use crate::core::errors::ApiError;

/// Binds a provider to the configured model ids and sampling defaults.
#[derive(Clone)]
pub struct LlmService {
    provider: Arc<dyn LlmProvider>,
    config: LlmConfig,
}

impl LlmService {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmConfig) -> Self {
        Self { provider, config }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Deterministic single-shot call against the analysis model.
    pub async fn analyze(&self, messages: Vec<ChatMessage>) -> Result<String, ApiError> {
        let request = ChatRequest::new(messages).with_temperature(0.0);
        self.provider.chat(request, &self.config.analysis_model).await
    }

    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, ApiError> {
        let request = ChatRequest::new(messages).with_temperature(self.config.temperature);
        self.provider.chat(request, &self.config.chat_model).await
    }

    pub async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<TokenStream, ApiError> {
        let request = ChatRequest::new(messages).with_temperature(self.config.temperature);
        self.provider
            .stream_chat(request, &self.config.chat_model)
            .await
    }

    pub async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        self.provider
            .embed(inputs, &self.config.embedding_model)
            .await
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::Internal("Embedding service returned no vector".to_string()))
    }
}
