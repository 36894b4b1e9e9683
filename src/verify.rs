use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::llm::LlmProvider;
use crate::records::{AttractionRecord, write_atomic};
use crate::retry::RetryPolicy;
use crate::search::{SearchHit, SearchProvider};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Search hits shown to the LLM per address
const HITS_IN_PROMPT: usize = 5;

const VERIFY_SYSTEM_PROMPT: &str =
    "You extract and verify street addresses. Reply with the address only and nothing else.";

/// A city document: `{"city": ..., "attractions": [...]}`
#[derive(Debug, Serialize, Deserialize)]
struct AttractionDocument {
    #[serde(default)]
    city: String,
    attractions: Vec<AttractionRecord>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Counts from one verification pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Checks each attraction's `location` against web search results and
/// replaces it when the LLM finds a more precise address.
pub struct AddressVerifier {
    search: Arc<dyn SearchProvider>,
    llm: Arc<dyn LlmProvider>,
    search_retry: RetryPolicy,
    llm_retry: RetryPolicy,
    search_results: usize,
    delay: Duration,
}

impl AddressVerifier {
    pub fn new(
        config: &Config,
        search: Arc<dyn SearchProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            search,
            llm,
            search_retry: config.retry.search_policy(),
            llm_retry: config.retry.llm_policy(),
            search_results: config.search_results,
            delay: config.verify_delay(),
        }
    }

    /// Best known address for `name`; `current` when nothing better turns up
    pub async fn verify(&self, city: &str, name: &str, current: &str) -> Result<String> {
        let query = address_query(city, name);
        let search = self.search.as_ref();
        let limit = self.search_results;
        let hits = self
            .search_retry
            .execute(&format!("Searching {:?}", query), || {
                search.search(&query, limit)
            })
            .await?;

        let prompt = verify_prompt(city, name, current, &hits)?;
        let llm = self.llm.as_ref();
        let reply = self
            .llm_retry
            .execute(&format!("Verifying address of {}", name), || {
                llm.complete(&prompt, Some(VERIFY_SYSTEM_PROMPT))
            })
            .await?;

        let address = reply.trim();
        if address.is_empty() {
            ::log::warn!("Empty address reply for {}, keeping {}", name, current);
            return Ok(current.to_string());
        }
        Ok(address.to_string())
    }

    /// Verify every attraction in a city document.
    ///
    /// The file is rewritten once at the end, and only when an address
    /// changed. A failed lookup keeps the current address.
    pub async fn verify_file(&self, path: &Path) -> Result<VerifyReport> {
        let contents = fs::read_to_string(path)?;
        let mut doc: AttractionDocument = serde_json::from_str(&contents)?;
        if doc.city.trim().is_empty() {
            return Err(PipelineError::Configuration(format!(
                "{} has no \"city\" field",
                path.display()
            )));
        }

        let total = doc.attractions.len();
        ::log::info!("Verifying {} addresses in {}", total, doc.city);
        let mut report = VerifyReport::default();

        for (i, attraction) in doc.attractions.iter_mut().enumerate() {
            let (Some(name), Some(current)) =
                (attraction.display_name(), attraction.location.as_deref())
            else {
                ::log::debug!("[{}/{}] Skipping record without name or location", i + 1, total);
                continue;
            };
            let name = name.to_string();
            let current = current.to_string();
            ::log::info!("[{}/{}] Verifying {} ({})", i + 1, total, name, current);

            match self.verify(&doc.city, &name, &current).await {
                Ok(address) if address != current => {
                    ::log::info!("Updating {}: {} -> {}", name, current, address);
                    attraction.location = Some(address);
                    report.updated += 1;
                }
                Ok(_) => report.unchanged += 1,
                Err(e) => {
                    ::log::error!("Failed to verify {}: {}", name, e);
                    report.failed += 1;
                }
            }

            tokio::time::sleep(self.delay).await;
        }

        if report.updated > 0 {
            let json = serde_json::to_string_pretty(&doc)?;
            write_atomic(path, json.as_bytes())?;
            ::log::info!("Updated {} addresses in {}", report.updated, path.display());
        } else {
            ::log::info!("All addresses are current, nothing written");
        }
        Ok(report)
    }
}

pub fn address_query(city: &str, name: &str) -> String {
    format!("{}{}具体地址", city, name)
}

fn verify_prompt(city: &str, name: &str, current: &str, hits: &[SearchHit]) -> Result<String> {
    let shown = &hits[..hits.len().min(HITS_IN_PROMPT)];
    let listing = serde_json::to_string_pretty(shown)?;
    Ok(format!(
        "Find the exact address of {city}{name} in the search results below.\n\
The currently recorded address is: {current}\n\n\
Search results:\n{listing}\n\n\
Return the most accurate address. If the results contain no clear address, or the \
current address is more accurate, return the current address.\n\
Return only the address, as detailed as possible and including at least the city name.",
        city = city,
        name = name,
        current = current,
        listing = listing
    ))
}
