use clap::Parser;
use poi_enrich::browser::{BrowserSettings, WebDriverFactory};
use poi_enrich::chunker::DelimiterSplitter;
use poi_enrich::config::Config;
use poi_enrich::dispatch::Dispatcher;
use poi_enrich::error::{PipelineError, Result};
use poi_enrich::geocode::{TencentGeocoder, enrich_coordinates};
use poi_enrich::llm::OpenAiClient;
use poi_enrich::pipeline::Enricher;
use poi_enrich::records::{RecordStore, import_json};
use poi_enrich::results::SnapshotStore;
use poi_enrich::search::{DuckDuckGoProvider, SearchCache, SearchProvider};
use poi_enrich::summarize::Summarizer;
use poi_enrich::verify::AddressVerifier;
use std::process::ExitCode;
use std::sync::Arc;

mod args;
use args::{Args, Command};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env first so it can set RUST_LOG too
    let dotenv = dotenvy::dotenv();
    env_logger::init();
    if let Err(e) = dotenv {
        if !e.not_found() {
            ::log::warn!("Failed to load .env: {}", e);
        }
    }

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ::log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::load(args.config.as_deref())?;

    match args.command {
        Command::Enrich { store, max_urls } => {
            if let Some(max_urls) = max_urls {
                config.max_urls = max_urls;
            }
            println!("Note: enrichment requires a WebDriver server (e.g., ChromeDriver).");
            println!(
                "Set WEBDRIVER_URL environment variable if not using the default {}",
                config.webdriver_url
            );

            let llm = Arc::new(OpenAiClient::new(&config.llm)?);
            let search = Arc::new(DuckDuckGoProvider::new()?);
            let factory = Arc::new(WebDriverFactory::new(BrowserSettings::from_config(&config)));
            let enricher = Enricher::new(&config, search, llm, factory);

            let start_time = std::time::Instant::now();
            let report = enricher.enrich_store(&RecordStore::new(store)).await?;
            ::log::info!(
                "Enrichment complete - {} enriched, {} skipped, {} failed in {:.2} seconds",
                report.processed,
                report.skipped,
                report.failed,
                start_time.elapsed().as_secs_f64()
            );
        }

        Command::Fetch { urls, workers, wait } => {
            if let Some(workers) = workers {
                config.max_workers = workers;
            }
            if let Some(wait) = wait {
                config.set_settle_delay_secs(wait);
            }
            let factory = Arc::new(WebDriverFactory::new(BrowserSettings::from_config(&config)));
            let dispatcher = Dispatcher::from_config(&config, factory);
            let store = SnapshotStore::new(&config.url_cache_dir);

            let (path, outcome) = dispatcher.dispatch_to(&urls, &store).await?;
            for failure in &outcome.failures {
                ::log::warn!("Failed: {} ({})", failure.url, failure.error);
            }
            println!("{}", path.display());
        }

        Command::Search { query, max_results } => {
            let provider = DuckDuckGoProvider::new()?;
            let limit = max_results.unwrap_or(config.search_results);
            let hits = config
                .retry
                .search_policy()
                .execute("Searching", || provider.search(&query, limit))
                .await?;
            let path = SearchCache::new(&config.search_cache_dir).save(&query, &hits)?;
            println!("Search results saved to: {}", path.display());
        }

        Command::Summarize { name, snapshot } => {
            let path = match snapshot {
                Some(path) => path,
                None => {
                    let store = SnapshotStore::new(&config.url_cache_dir);
                    store.latest()?.ok_or_else(|| {
                        PipelineError::NoResults(format!(
                            "no snapshot in {}",
                            store.dir().display()
                        ))
                    })?
                }
            };
            ::log::info!("Summarizing {} from {}", name, path.display());
            let snapshot = SnapshotStore::load(&path)?;

            let summarizer = Summarizer::new(
                Arc::new(OpenAiClient::new(&config.llm)?),
                Box::new(DelimiterSplitter::new(&config.sentence_terminators)),
                config.retry.llm_policy(),
            );
            let blocks = summarizer.summarize(&name, &snapshot).await?;
            println!("{}", serde_json::to_string_pretty(&blocks)?);
        }

        Command::Geocode { store, output } => {
            let geocoder = TencentGeocoder::new(config.require_geocoder_key()?)?;
            let report = enrich_coordinates(
                &RecordStore::new(store),
                &geocoder,
                config.record_delay(),
                output.as_deref(),
            )
            .await?;
            ::log::info!(
                "Geocoding complete - {} resolved, {} unresolved",
                report.resolved,
                report.unresolved
            );
        }

        Command::Verify { file } => {
            let llm = Arc::new(OpenAiClient::new(&config.llm)?);
            let search = Arc::new(DuckDuckGoProvider::new()?);
            let verifier = AddressVerifier::new(&config, search, llm);
            let report = verifier.verify_file(&file).await?;
            ::log::info!(
                "Verification complete - {} updated, {} unchanged, {} failed",
                report.updated,
                report.unchanged,
                report.failed
            );
        }

        Command::Convert { input, output } => {
            let path = import_json(&input, output.as_deref())?;
            println!("{}", path.display());
        }
    }

    Ok(())
}
