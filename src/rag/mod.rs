//! Retrieval-augmented answering over an indexed documentation corpus.
//!
//! Request path: `ConceptExtractor` -> `CandidateRetriever` -> `RelevanceRanker`
//! -> `ThresholdFilter` -> `AnswerAssembler`, wired together by `AnswerPipeline`.
//! Offline path: `Ingestor` splits and embeds documents into a `ChunkStore`.

pub mod assembler;
pub mod concepts;
pub mod filter;
pub mod ingest;
pub mod pipeline;
pub mod ranker;
pub mod retriever;
pub mod splitter;
pub mod sqlite;
pub mod store;

pub use assembler::{format_learn_more, AnswerAssembler};
pub use concepts::{ConceptExtractor, ConceptSet};
pub use filter::{CitationList, RetrievedContext, ThresholdFilter};
pub use ingest::{IngestReport, Ingestor, SourceDocument};
pub use pipeline::{AnswerInput, AnswerPipeline};
pub use ranker::{RankedCandidate, RelevanceRanker};
pub use retriever::{Candidate, CandidateRetriever};
pub use sqlite::SqliteChunkStore;
pub use store::{Chunk, ChunkMetadata, ChunkStore, QueryMatch, QueryRequest};
