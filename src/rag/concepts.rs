//! Concept extraction: one deterministic model call that names the cmdlets,
//! modules and task categories a question is about.

use std::collections::HashSet;
use std::time::Instant;

use crate::llm::{ChatMessage, LlmService};

const EXTRACTION_INSTRUCTION: &str = "You are a PowerShell expert. Given a user's request, identify the most relevant PowerShell cmdlets and modules that would be needed to fulfill their request. Format your response as a comma-separated list. Be specific but concise.

Example User: \"I need to check if a service is running\"
Example Response: Get-Service, Test-Path, Start-Service, Stop-Service, Service Management

Only provide the comma-separated list, no other text.";

/// Ordered, lower-cased, de-duplicated keywords for a single question.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConceptSet {
    terms: Vec<String>,
}

impl ConceptSet {
    /// Parses a comma-separated reply. Blank entries are dropped so that a
    /// trailing comma can never match every URL.
    pub fn parse(raw: &str) -> Self {
        let mut seen = HashSet::new();
        let terms = raw
            .split(',')
            .map(|term| term.trim().to_lowercase())
            .filter(|term| !term.is_empty())
            .filter(|term| seen.insert(term.clone()))
            .collect();
        Self { terms }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Raw extractor output plus its parsed form. The raw string feeds the
/// augmented retrieval query; the set feeds the ranker.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedConcepts {
    pub raw: String,
    pub set: ConceptSet,
}

#[derive(Clone)]
pub struct ConceptExtractor {
    llm: LlmService,
}

impl ConceptExtractor {
    pub fn new(llm: LlmService) -> Self {
        Self { llm }
    }

    /// Never fails: an empty reply or a failed call falls back to the question itself.
    pub async fn extract(&self, question: &str) -> ExtractedConcepts {
        let started = Instant::now();
        let messages = vec![
            ChatMessage::system(EXTRACTION_INSTRUCTION),
            ChatMessage::user(question),
        ];

        let raw = match self.llm.analyze(messages).await {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => {
                tracing::warn!("Concept extraction returned no text; using the question");
                question.to_string()
            }
            Err(err) => {
                tracing::warn!("Concept extraction failed ({}); using the question", err);
                question.to_string()
            }
        };

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Relevant concepts: {}",
            raw
        );

        ExtractedConcepts {
            set: ConceptSet::parse(&raw),
            raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::errors::ApiError;
    use crate::llm::tests::{service_with, ScriptedProvider};
    use crate::llm::Role;

    #[test]
    fn parse_lowercases_trims_and_dedups() {
        let set = ConceptSet::parse(" Restart-Service, Get-Service ,restart-service,, ");
        assert_eq!(set.terms(), ["restart-service", "get-service"]);
    }

    #[test]
    fn parse_of_blank_reply_is_empty() {
        assert!(ConceptSet::parse(" , ,").is_empty());
    }

    #[tokio::test]
    async fn extract_sends_instruction_then_question() {
        let provider = Arc::new(
            ScriptedProvider::new().reply(Ok("  Restart-Service, Get-Service \n".to_string())),
        );
        let extractor = ConceptExtractor::new(service_with(provider.clone()));

        let concepts = extractor.extract("How do I restart a service?").await;

        assert_eq!(concepts.raw, "Restart-Service, Get-Service");
        assert_eq!(concepts.set.terms(), ["restart-service", "get-service"]);

        let chats = provider.recorded_chats();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].temperature, Some(0.0));
        assert_eq!(chats[0].messages[0].role, Role::System);
        assert!(chats[0].messages[0].content.contains("comma-separated"));
        assert_eq!(chats[0].messages[1].content, "How do I restart a service?");
    }

    #[tokio::test]
    async fn empty_reply_falls_back_to_question() {
        let provider = Arc::new(ScriptedProvider::new().reply(Ok("   ".to_string())));
        let extractor = ConceptExtractor::new(service_with(provider));

        let concepts = extractor.extract("list printers").await;
        assert_eq!(concepts.raw, "list printers");
        assert_eq!(concepts.set.terms(), ["list printers"]);
    }

    #[tokio::test]
    async fn failed_call_falls_back_to_question() {
        let provider = Arc::new(
            ScriptedProvider::new().reply(Err(ApiError::Internal("rate limited".to_string()))),
        );
        let extractor = ConceptExtractor::new(service_with(provider));

        let concepts = extractor.extract("Stop a process").await;
        assert_eq!(concepts.raw, "Stop a process");
    }
}
