pub mod duckduckgo;

use crate::error::Result;
use crate::utils;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use duckduckgo::DuckDuckGoProvider;

/// One ranked search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

/// A provider of ranked web search results
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Search for `query`, returning at most `max_results` hits in rank order
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Contents of a search-result cache file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub query: String,
    pub results: Vec<SearchHit>,
}

/// Directory of timestamped search-result files
#[derive(Debug, Clone)]
pub struct SearchCache {
    dir: PathBuf,
}

impl SearchCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write `{query, results}` to a new timestamped file and return its path
    pub fn save(&self, query: &str, hits: &[SearchHit]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let record = SearchRecord {
            query: query.to_string(),
            results: hits.to_vec(),
        };
        let path = utils::unique_json_path(&self.dir, &utils::timestamp());
        fs::write(&path, serde_json::to_string_pretty(&record)?)?;
        ::log::info!("Search results saved to: {}", path.display());
        Ok(path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<SearchRecord> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// Query used to find introductions of an attraction
pub fn attraction_query(name: &str) -> String {
    format!("{} 旅游 景点介绍", name)
}
