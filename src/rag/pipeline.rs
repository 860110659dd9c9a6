//! End-to-end answer pipeline: concepts, retrieval, ranking, filtering, generation.

use std::sync::Arc;
use std::time::Instant;

use super::assembler::AnswerAssembler;
use super::concepts::ConceptExtractor;
use super::filter::{RetrievedContext, ThresholdFilter};
use super::ranker::RelevanceRanker;
use super::retriever::CandidateRetriever;
use super::store::ChunkStore;
use crate::core::config::settings::AppConfig;
use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, LlmService, TokenStream};

/// One question with its caller-supplied framing.
#[derive(Debug, Clone, Default)]
pub struct AnswerInput {
    pub question: String,
    /// Falls back to the configured default when absent.
    pub system_prompt: Option<String>,
    pub history: Vec<ChatMessage>,
}

impl AnswerInput {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }
}

/// Immutable after construction; share it behind an `Arc`.
pub struct AnswerPipeline {
    extractor: ConceptExtractor,
    retriever: CandidateRetriever,
    ranker: RelevanceRanker,
    filter: ThresholdFilter,
    assembler: AnswerAssembler,
    default_system_prompt: String,
}

impl AnswerPipeline {
    pub fn new(store: Arc<dyn ChunkStore>, llm: LlmService, config: &AppConfig) -> Self {
        Self {
            extractor: ConceptExtractor::new(llm.clone()),
            retriever: CandidateRetriever::new(store, llm.clone(), config.retrieval.top_k),
            ranker: RelevanceRanker::new(config.retrieval.concept_boost),
            filter: ThresholdFilter::new(config.retrieval.relevance_threshold),
            assembler: AnswerAssembler::new(llm),
            default_system_prompt: config.answer.system_prompt.clone(),
        }
    }

    /// Runs every stage up to and including filtering.
    pub async fn retrieve_context(&self, question: &str) -> Result<RetrievedContext, ApiError> {
        let question = validate_question(question)?;
        let started = Instant::now();

        let concepts = self.extractor.extract(question).await;
        let candidates = self.retriever.retrieve(question, &concepts.raw).await?;
        tracing::info!("Found {} candidate chunks before filtering", candidates.len());

        let ranked = self.ranker.rank(candidates, &concepts.set);
        let context = self.filter.select(ranked);

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Context ready: {} chunks, {} citations",
            context.context_chunks.len(),
            context.citations.len()
        );
        Ok(context)
    }

    pub async fn answer(&self, input: &AnswerInput) -> Result<String, ApiError> {
        let context = self.retrieve_context(&input.question).await?;
        let started = Instant::now();
        let answer = self
            .assembler
            .answer(
                &context,
                self.system_prompt(input),
                &input.history,
                input.question.trim(),
            )
            .await?;
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generated answer ({} chars)",
            answer.len()
        );
        Ok(answer)
    }

    pub async fn stream_answer(&self, input: &AnswerInput) -> Result<TokenStream, ApiError> {
        let context = self.retrieve_context(&input.question).await?;
        self.assembler
            .stream(
                &context,
                self.system_prompt(input),
                &input.history,
                input.question.trim(),
            )
            .await
    }

    fn system_prompt<'a>(&'a self, input: &'a AnswerInput) -> &'a str {
        input
            .system_prompt
            .as_deref()
            .unwrap_or(&self.default_system_prompt)
    }
}

fn validate_question(question: &str) -> Result<&str, ApiError> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest("Prompt is required".to_string()));
    }
    Ok(trimmed)
}
