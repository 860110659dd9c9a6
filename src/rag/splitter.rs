//! Fixed-size overlapping text windows for ingestion.

use serde::{Deserialize, Serialize};

use crate::core::config::settings::IngestConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// Maximum window size in characters
    pub chunk_size: usize,
    /// Characters shared between consecutive windows
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self::from(&IngestConfig::default())
    }
}

impl From<&IngestConfig> for SplitterConfig {
    fn from(config: &IngestConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextWindow {
    pub text: String,
    /// Character offset in the original document
    pub start_offset: usize,
    /// Window index within the document
    pub index: usize,
}

pub struct TextSplitter {
    config: SplitterConfig,
}

impl TextSplitter {
    pub fn new(config: SplitterConfig) -> Self {
        Self { config }
    }

    /// Split text into overlapping windows, preferring to cut at a sentence end
    /// near the window boundary. Whitespace-only windows are dropped.
    pub fn split(&self, text: &str) -> Vec<TextWindow> {
        let chunk_size = self.config.chunk_size.max(1);
        let overlap = self.config.chunk_overlap.min(chunk_size - 1);

        let chars: Vec<char> = text.chars().collect();
        let total_chars = chars.len();
        let mut windows = Vec::new();
        let mut start = 0;

        while start < total_chars {
            let end = (start + chunk_size).min(total_chars);
            let cut = if end < total_chars {
                sentence_boundary(&chars[start..end]).map_or(end, |b| start + b)
            } else {
                end
            };

            let window: String = chars[start..cut].iter().collect();
            let trimmed = window.trim();
            if !trimmed.is_empty() {
                windows.push(TextWindow {
                    text: trimmed.to_string(),
                    start_offset: start,
                    index: windows.len(),
                });
            }

            if cut >= total_chars {
                break;
            }
            start = cut.saturating_sub(overlap).max(start + 1);
        }

        windows
    }
}

/// Position just past the last sentence terminator in the final fifth of the window.
fn sentence_boundary(window: &[char]) -> Option<usize> {
    let search_start = window.len() * 80 / 100;
    (search_start..window.len().saturating_sub(1))
        .rev()
        .find(|&i| matches!(window[i], '.' | '!' | '?') && window[i + 1].is_whitespace())
        .map(|i| i + 2)
}
