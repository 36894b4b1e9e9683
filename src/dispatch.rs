use crate::browser::{RendererFactory, fetch_page};
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::results::{PageContent, ResultCollector, Snapshot, SnapshotStore};
use crate::retry::RetryPolicy;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore, mpsc};

/// One URL of a batch and its position in the input list
#[derive(Debug, Clone)]
pub struct UrlTask {
    pub url: String,
    pub position: usize,
}

/// A URL that could not be fetched
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub url: String,
    pub error: String,
}

/// Successful results of a batch plus the URLs that failed
#[derive(Debug)]
pub struct DispatchOutcome {
    pub snapshot: Snapshot,
    pub failures: Vec<FetchFailure>,
}

/// Bounded concurrent acquisition of a fixed list of URLs.
///
/// Each URL runs as its own task with its own browser session. At most
/// `max_workers` tasks hold a session at once. Task outcomes come back over a
/// channel and are merged into the [`ResultCollector`] by the dispatching
/// task alone, so a failing URL never affects its siblings.
pub struct Dispatcher {
    factory: Arc<dyn RendererFactory>,
    max_workers: usize,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(factory: Arc<dyn RendererFactory>, max_workers: usize, retry: RetryPolicy) -> Self {
        Self {
            factory,
            max_workers: max_workers.max(1),
            retry,
        }
    }

    pub fn from_config(config: &Config, factory: Arc<dyn RendererFactory>) -> Self {
        Self::new(factory, config.max_workers, config.retry.fetch_policy())
    }

    /// Fetch every URL and collect the successes.
    ///
    /// Completion order is not preserved. Fails with `NoResults` when the list
    /// is empty or no URL could be fetched.
    pub async fn dispatch(&self, urls: &[String]) -> Result<DispatchOutcome> {
        if urls.is_empty() {
            return Err(PipelineError::NoResults("no URLs to fetch".into()));
        }
        ::log::info!(
            "Fetching {} URLs with up to {} workers",
            urls.len(),
            self.max_workers
        );

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let (outcome_tx, mut outcome_rx) = mpsc::channel(urls.len());

        for (position, url) in urls.iter().enumerate() {
            let task = UrlTask {
                url: url.clone(),
                position,
            };
            let semaphore = Arc::clone(&semaphore);
            let factory = Arc::clone(&self.factory);
            let retry = self.retry.clone();
            let outcome_tx = outcome_tx.clone();

            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let outcome = run_task(factory.as_ref(), &retry, &task).await;
                let _ = outcome_tx.send((task, outcome)).await;
            });
        }

        // Drop the original sender so the loop below ends with the last task
        drop(outcome_tx);

        let collector = ResultCollector::new();
        let mut failures = Vec::new();
        while let Some((task, outcome)) = outcome_rx.recv().await {
            match outcome {
                Ok(content) => {
                    ::log::debug!("Fetched {} (#{})", task.url, task.position);
                    collector.add_result(&task.url, content);
                }
                Err(e) => {
                    ::log::warn!("Giving up on {}: {}", task.url, e);
                    failures.push(FetchFailure {
                        url: task.url,
                        error: e.to_string(),
                    });
                }
            }
        }

        if collector.is_empty() {
            return Err(PipelineError::NoResults(format!(
                "all {} URLs failed",
                urls.len()
            )));
        }

        let snapshot = collector.into_snapshot();
        ::log::info!(
            "Fetched {}/{} URLs",
            snapshot.total_urls,
            urls.len()
        );
        Ok(DispatchOutcome { snapshot, failures })
    }

    /// Dispatch, then write the batch as one snapshot file
    pub async fn dispatch_to(
        &self,
        urls: &[String],
        store: &SnapshotStore,
    ) -> Result<(PathBuf, DispatchOutcome)> {
        let outcome = self.dispatch(urls).await?;
        let path = store.save(&outcome.snapshot)?;
        Ok((path, outcome))
    }
}

/// Fetch one URL with retries on a dedicated session, closing it afterwards
async fn run_task(
    factory: &dyn RendererFactory,
    retry: &RetryPolicy,
    task: &UrlTask,
) -> Result<PageContent> {
    let renderer = Arc::new(Mutex::new(factory.create(task.position)));
    let label = format!("Fetching {}", task.url);

    let result = retry
        .execute(&label, || {
            let renderer = Arc::clone(&renderer);
            let url = task.url.clone();
            async move {
                let mut session = renderer.lock().await;
                fetch_page(&mut **session, &url).await
            }
        })
        .await;

    renderer.lock().await.close().await;
    result
}
