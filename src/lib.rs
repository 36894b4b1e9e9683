pub mod browser;
pub mod chunker;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod geocode;
pub mod llm;
pub mod parsers;
pub mod pipeline;
pub mod records;
pub mod results;
pub mod retry;
pub mod search;
pub mod summarize;
pub mod utils;
pub mod verify;

#[cfg(test)]
mod testing;

// Re-export commonly used types for convenience
pub use config::Config;
pub use error::{PipelineError, Result};
pub use pipeline::{EnrichReport, Enricher};
pub use records::{AttractionRecord, ContentBlock, RecordStore};
pub use results::{FetchResult, PageContent, Snapshot};
