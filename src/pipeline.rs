use crate::browser::RendererFactory;
use crate::chunker::DelimiterSplitter;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::llm::LlmProvider;
use crate::records::{ContentBlock, RecordStore};
use crate::results::SnapshotStore;
use crate::retry::RetryPolicy;
use crate::search::{SearchCache, SearchProvider, attraction_query};
use crate::summarize::Summarizer;
use std::sync::Arc;
use std::time::Duration;

/// Counts from one pass over a store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Record-by-record enrichment of an NDJSON store.
///
/// For each record: search, let the LLM pick URLs, fetch them, summarize the
/// pages, then rewrite the whole store. Records run one at a time. A crash
/// loses at most the record in flight, and a later run picks up at the first
/// record still lacking content.
pub struct Enricher {
    search: Arc<dyn SearchProvider>,
    search_cache: SearchCache,
    search_retry: RetryPolicy,
    search_results: usize,
    max_urls: usize,
    dispatcher: Dispatcher,
    snapshots: SnapshotStore,
    summarizer: Summarizer,
    record_delay: Duration,
}

impl Enricher {
    pub fn new(
        config: &Config,
        search: Arc<dyn SearchProvider>,
        llm: Arc<dyn LlmProvider>,
        factory: Arc<dyn RendererFactory>,
    ) -> Self {
        let summarizer = Summarizer::new(
            llm,
            Box::new(DelimiterSplitter::new(&config.sentence_terminators)),
            config.retry.llm_policy(),
        );
        Self {
            search,
            search_cache: SearchCache::new(&config.search_cache_dir),
            search_retry: config.retry.search_policy(),
            search_results: config.search_results,
            max_urls: config.max_urls,
            dispatcher: Dispatcher::from_config(config, factory),
            snapshots: SnapshotStore::new(&config.url_cache_dir),
            summarizer,
            record_delay: config.record_delay(),
        }
    }

    /// Produce content blocks for one attraction
    pub async fn enrich_record(&self, name: &str) -> Result<Vec<ContentBlock>> {
        ::log::info!("Enriching {}", name);

        let query = attraction_query(name);
        let search = self.search.as_ref();
        let limit = self.search_results;
        let hits = self
            .search_retry
            .execute(&format!("Searching {:?}", query), || {
                search.search(&query, limit)
            })
            .await?;
        ::log::debug!("{} returned {} hits for {}", search.name(), hits.len(), name);
        self.search_cache.save(&query, &hits)?;

        let urls = self
            .summarizer
            .select_urls(name, &hits, self.max_urls)
            .await?;

        let (path, outcome) = self.dispatcher.dispatch_to(&urls, &self.snapshots).await?;
        ::log::debug!(
            "Snapshot for {} at {} ({} failed URLs)",
            name,
            path.display(),
            outcome.failures.len()
        );

        let blocks = self.summarizer.summarize(name, &outcome.snapshot).await?;
        ::log::info!("Produced {} content blocks for {}", blocks.len(), name);
        Ok(blocks)
    }

    /// Enrich every record that has a name and no content yet.
    ///
    /// The store is rewritten after each success. A failing record is logged
    /// and left untouched. Only errors reading or writing the store itself
    /// end the pass.
    pub async fn enrich_store(&self, store: &RecordStore) -> Result<EnrichReport> {
        let mut records = store.load()?;
        let total = records.len();
        let mut report = EnrichReport::default();
        ::log::info!("Loaded {} records from {}", total, store.path().display());

        for i in 0..total {
            let record = &records[i];
            let name = match record.display_name() {
                Some(name) if !record.has_content() => name.to_string(),
                Some(name) => {
                    ::log::debug!("[{}/{}] Skipping {}: already has content", i + 1, total, name);
                    report.skipped += 1;
                    continue;
                }
                None => {
                    ::log::debug!("[{}/{}] Skipping record without a name", i + 1, total);
                    report.skipped += 1;
                    continue;
                }
            };

            ::log::info!("[{}/{}] Processing {}", i + 1, total, name);
            match self.enrich_record(&name).await {
                Ok(blocks) if blocks.is_empty() => {
                    ::log::warn!("[{}/{}] No content produced for {}", i + 1, total, name);
                    report.failed += 1;
                }
                Ok(blocks) => {
                    records[i].content = Some(blocks);
                    store.save(&records)?;
                    ::log::info!("[{}/{}] Saved content for {}", i + 1, total, name);
                    report.processed += 1;
                }
                Err(e) => {
                    ::log::error!("[{}/{}] Failed to enrich {}: {}", i + 1, total, name, e);
                    report.failed += 1;
                }
            }

            tokio::time::sleep(self.record_delay).await;
        }

        ::log::info!(
            "Done: {} enriched, {} skipped, {} failed",
            report.processed,
            report.skipped,
            report.failed
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::records::AttractionRecord;
    use crate::testing::{MockLlm, MockPage, MockRendererFactory, MockSearch, hit};
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    const SECTION_REPLY: &str = r#"{"content": [{"type": "heading2", "text": "About"}, {"type": "paragraph", "text": "Worth a visit."}]}"#;

    fn test_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.search_cache_dir = dir.join("search");
        config.url_cache_dir = dir.join("urls");
        config.record_delay_ms = 0;
        config.retry.max_retries = 0;
        config
    }

    /// Every query gets one hit on a per-attraction page
    fn page_url(query: &str) -> String {
        let name = query.split_whitespace().next().unwrap_or_default();
        format!("https://travel.example.com/{}", name)
    }

    fn llm() -> Arc<MockLlm> {
        Arc::new(MockLlm::new(1000, |prompt| {
            if prompt.contains("choose the") {
                let url = prompt
                    .split('"')
                    .find(|s| s.starts_with("https://"))
                    .unwrap_or_default()
                    .to_string();
                Ok(url)
            } else {
                Ok(SECTION_REPLY.to_string())
            }
        }))
    }

    fn factory(names: &[&str]) -> MockRendererFactory {
        names.iter().fold(MockRendererFactory::new(), |f, name| {
            f.with_page(
                &format!("https://travel.example.com/{}", name),
                MockPage::html(&format!("<p>{} is famous.</p>", name)),
            )
        })
    }

    fn write_store(path: &Path, records: &[serde_json::Value]) {
        let lines: Vec<String> = records.iter().map(|r| r.to_string()).collect();
        fs::write(path, lines.join("\n") + "\n").unwrap();
    }

    #[tokio::test]
    async fn test_enrich_record_runs_full_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let search = Arc::new(MockSearch::new(|q| Ok(vec![hit(&page_url(q))])));
        let llm = llm();
        let enricher = Enricher::new(
            &config,
            search.clone(),
            llm.clone(),
            Arc::new(factory(&["Lake"])),
        );

        let blocks = enricher.enrich_record("Lake").await.unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(search.queries(), vec!["Lake 旅游 景点介绍"]);
        assert_eq!(llm.calls(), 2);
        assert!(llm.prompts()[1].contains("Lake is famous."));

        assert_eq!(fs::read_dir(&config.search_cache_dir).unwrap().count(), 1);
        assert_eq!(fs::read_dir(&config.url_cache_dir).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_search_failure_fails_record() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let search = Arc::new(MockSearch::new(|q| {
            Err(PipelineError::NoResults(format!("nothing for {}", q)))
        }));
        let llm = llm();
        let enricher = Enricher::new(&config, search, llm.clone(), Arc::new(factory(&[])));

        let result = enricher.enrich_record("Lake").await;
        assert!(matches!(result, Err(PipelineError::NoResults(_))));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_skips_enriched_and_unnamed_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spots.ndjson");
        write_store(
            &path,
            &[
                json!({"name": "Done", "location": "X", "content": [{"type": "paragraph", "text": "old"}]}),
                json!({"location": "nameless"}),
                json!({"name": "Fresh", "location": "Y"}),
            ],
        );
        let config = test_config(dir.path());
        let search = Arc::new(MockSearch::new(|q| Ok(vec![hit(&page_url(q))])));
        let enricher = Enricher::new(&config, search.clone(), llm(), Arc::new(factory(&["Fresh"])));

        let report = enricher.enrich_store(&RecordStore::new(&path)).await.unwrap();
        assert_eq!(
            report,
            EnrichReport {
                processed: 1,
                skipped: 2,
                failed: 0
            }
        );
        assert_eq!(search.queries(), vec!["Fresh 旅游 景点介绍"]);

        let records = RecordStore::new(&path).load().unwrap();
        assert_eq!(
            records[0].content,
            Some(vec![ContentBlock::Paragraph { text: "old".into() }])
        );
        assert_eq!(
            records[1],
            AttractionRecord {
                location: Some("nameless".into()),
                ..AttractionRecord::default()
            }
        );
        assert!(records[2].has_content());
    }

    #[tokio::test]
    async fn test_interrupted_run_resumes_after_last_saved_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spots.ndjson");
        let names = ["A", "B", "C", "D"];
        let originals: Vec<serde_json::Value> = names
            .iter()
            .map(|n| json!({"name": n, "location": format!("{} road", n), "rating": 5}))
            .collect();
        write_store(&path, &originals);

        let config = test_config(dir.path());
        let first_run = Arc::new(AtomicBool::new(true));
        let a_saved_before_b = Arc::new(Mutex::new(None));

        let search = {
            let first_run = first_run.clone();
            let a_saved_before_b = a_saved_before_b.clone();
            let path = path.clone();
            Arc::new(MockSearch::new(move |q| {
                if q.starts_with("B ") {
                    let on_disk = RecordStore::new(&path).load().unwrap();
                    *a_saved_before_b.lock().unwrap() = Some(on_disk[0].has_content());
                }
                // During the first run everything from C on fails, as if the
                // run died there
                let cut_off = q.starts_with("C ") || q.starts_with("D ");
                if cut_off && first_run.load(Ordering::SeqCst) {
                    return Err(PipelineError::Api("service gone".into()));
                }
                Ok(vec![hit(&page_url(q))])
            }))
        };
        let enricher = Enricher::new(&config, search.clone(), llm(), Arc::new(factory(&names)));
        let store = RecordStore::new(&path);

        let first = enricher.enrich_store(&store).await.unwrap();
        assert_eq!(first.processed, 2);
        assert_eq!(first.failed, 2);
        assert_eq!(*a_saved_before_b.lock().unwrap(), Some(true));

        let after_first = store.load().unwrap();
        assert!(after_first[0].has_content());
        assert!(after_first[1].has_content());
        for (record, original) in after_first[2..].iter().zip(&originals[2..]) {
            assert_eq!(serde_json::to_value(record).unwrap(), *original);
        }
        let enriched_a = after_first[0].content.clone();

        first_run.store(false, Ordering::SeqCst);
        let resumed = Enricher::new(&config, search.clone(), llm(), Arc::new(factory(&names)));
        let second = resumed.enrich_store(&store).await.unwrap();
        assert_eq!(
            second,
            EnrichReport {
                processed: 2,
                skipped: 2,
                failed: 0
            }
        );

        // A and B are not searched again
        let queries = search.queries();
        assert_eq!(queries.len(), 6);
        assert_eq!(&queries[queries.len() - 2..], ["C 旅游 景点介绍", "D 旅游 景点介绍"]);

        let after_second = store.load().unwrap();
        assert!(after_second.iter().all(|r| r.has_content()));
        assert_eq!(after_second[0].content, enriched_a);
        assert_eq!(after_second[3].extra["rating"], json!(5));
    }

    #[tokio::test]
    async fn test_unreadable_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let search = Arc::new(MockSearch::new(|_| Ok(Vec::new())));
        let enricher = Enricher::new(&config, search, llm(), Arc::new(factory(&[])));

        let result = enricher
            .enrich_store(&RecordStore::new(dir.path().join("missing.ndjson")))
            .await;
        assert!(matches!(result, Err(PipelineError::Io(_))));
    }
}
