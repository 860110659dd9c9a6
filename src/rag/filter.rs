//! Threshold filtering and citation de-duplication.

use std::collections::HashSet;

use serde::Serialize;

use super::ranker::RankedCandidate;

/// Unique source URLs in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CitationList {
    urls: Vec<String>,
    #[serde(skip)]
    seen: HashSet<String>,
}

impl CitationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `url` unless it is blank or already present. Returns whether it was added.
    pub fn push(&mut self, url: &str) -> bool {
        if url.trim().is_empty() || self.seen.contains(url) {
            return false;
        }
        self.seen.insert(url.to_string());
        self.urls.push(url.to_string());
        true
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for CitationList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = Self::new();
        for url in iter {
            list.push(url.as_ref());
        }
        list
    }
}

/// Context passages and citations that survived the relevance threshold.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievedContext {
    pub context_chunks: Vec<String>,
    pub citations: CitationList,
}

impl RetrievedContext {
    pub fn is_empty(&self) -> bool {
        self.context_chunks.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ThresholdFilter {
    threshold: f32,
}

impl ThresholdFilter {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Keeps ranked candidates at or above the threshold, preserving rank order.
    pub fn retain(&self, ranked: Vec<RankedCandidate>) -> Vec<RankedCandidate> {
        ranked
            .into_iter()
            .filter(|r| r.enhanced_score >= self.threshold)
            .collect()
    }

    /// Filters, then splits survivors into context passages and de-duplicated citations.
    pub fn select(&self, ranked: Vec<RankedCandidate>) -> RetrievedContext {
        let total = ranked.len();
        let relevant = self.retain(ranked);

        let mut context = RetrievedContext::default();
        for r in &relevant {
            context.context_chunks.push(r.candidate.content.clone());
            if let Some(url) = r.candidate.url() {
                context.citations.push(url);
            }
        }

        tracing::info!(
            "After filtering ({:.0}% threshold): {}/{} chunks, {} citations",
            self.threshold * 100.0,
            relevant.len(),
            total,
            context.citations.len()
        );
        if relevant.is_empty() {
            tracing::info!("No chunks met the relevance threshold");
        }

        context
    }
}
