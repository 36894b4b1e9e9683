use crate::error::Result;
use crate::utils;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

/// An image found on a page, with its source resolved to an absolute URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    #[serde(default)]
    pub alt: String,
}

/// An anchor with both a target and visible text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
    pub text: String,
}

/// Content extracted from one rendered page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    /// Visible text, script/style removed, joined by single spaces
    pub text: String,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub links: Vec<Link>,
}

/// Outcome of fetching one URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    pub url: String,
    pub timestamp: String,
    pub content: PageContent,
}

/// All successful results of one batch, written once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: String,
    pub total_urls: usize,
    pub results: Vec<FetchResult>,
}

impl Snapshot {
    pub fn new(results: Vec<FetchResult>) -> Self {
        Self {
            timestamp: utils::timestamp(),
            total_urls: results.len(),
            results,
        }
    }

    /// Text of every result joined by a single space
    pub fn combined_text(&self) -> String {
        self.results
            .iter()
            .map(|r| r.content.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Images of every result, in result order
    pub fn all_images(&self) -> Vec<Image> {
        self.results
            .iter()
            .flat_map(|r| r.content.images.iter().cloned())
            .collect()
    }
}

/// Thread-safe collection of per-URL results
#[derive(Debug, Default)]
pub struct ResultCollector {
    results: Mutex<Vec<FetchResult>>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the content fetched for `url`
    pub fn add_result(&self, url: &str, content: PageContent) {
        let entry = FetchResult {
            url: url.to_string(),
            timestamp: utils::timestamp(),
            content,
        };
        let mut results = self.results.lock().unwrap_or_else(|e| e.into_inner());
        results.push(entry);
        ::log::trace!("Collected result for {} ({} total)", url, results.len());
    }

    pub fn len(&self) -> usize {
        self.results.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the collector into a snapshot
    pub fn into_snapshot(self) -> Snapshot {
        let results = self.results.into_inner().unwrap_or_else(|e| e.into_inner());
        Snapshot::new(results)
    }
}

/// Directory of timestamped snapshot files.
///
/// "Latest" is decided by file creation time, so two pipeline runs sharing
/// one directory at the same time can pick up each other's snapshots. Give
/// concurrent runs separate directories.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the snapshot to a new timestamped file and return its path
    pub fn save(&self, snapshot: &Snapshot) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = utils::unique_json_path(&self.dir, &snapshot.timestamp);
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&path, json)?;
        ::log::info!(
            "Saved snapshot with {} results to {}",
            snapshot.total_urls,
            path.display()
        );
        Ok(path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Snapshot> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Newest `.json` file in the directory by creation time
    pub fn latest(&self) -> Result<Option<PathBuf>> {
        newest_json_file(&self.dir)
    }
}

/// Newest `.json` file in `dir`, by creation time where the platform records
/// it and modification time otherwise
pub fn newest_json_file(dir: &Path) -> Result<Option<PathBuf>> {
    if !dir.exists() {
        return Ok(None);
    }
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let meta = fs::metadata(&path)?;
        let created = meta.created().or_else(|_| meta.modified())?;
        if newest.as_ref().is_none_or(|(t, _)| created >= *t) {
            newest = Some((created, path));
        }
    }
    Ok(newest.map(|(_, p)| p))
}
