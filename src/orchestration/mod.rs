//! Run orchestration: ingestion and the one-shot journal pipeline.

pub mod ingest;
pub mod pipeline;

pub use ingest::{discover_symbols, Ingestor};
pub use pipeline::{JournalPipeline, PipelineError, RunReport};
