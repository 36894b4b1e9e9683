use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "poi-enrich")]
#[command(about = "Enriches point-of-interest records with web content summarized by an LLM")]
#[command(version)]
pub struct Args {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add content to every record of an NDJSON store that has none
    Enrich {
        /// NDJSON record store, rewritten after each enriched record
        store: PathBuf,

        /// Number of URLs fetched per record
        #[arg(long)]
        max_urls: Option<usize>,
    },

    /// Fetch URLs with headless browsers and write a snapshot
    Fetch {
        #[arg(required = true)]
        urls: Vec<String>,

        /// Number of concurrent browser sessions
        #[arg(short, long)]
        workers: Option<usize>,

        /// Seconds to wait after navigation for dynamic content
        #[arg(long)]
        wait: Option<u64>,
    },

    /// Search the web and write the results to the search cache
    Search {
        query: String,

        /// Number of results to keep
        #[arg(short = 'n', long)]
        max_results: Option<usize>,
    },

    /// Summarize a snapshot into content blocks and print them as JSON
    Summarize {
        /// Attraction name used in the prompts
        name: String,

        /// Snapshot file; defaults to the newest one in the URL cache
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },

    /// Add coordinates to records that have a location but no coordinate
    Geocode {
        store: PathBuf,

        /// Write here instead of over the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check each attraction's address against web search results
    Verify {
        /// City document: `{"city": ..., "attractions": [...]}`
        file: PathBuf,
    },

    /// Convert `{"attractions": [...]}` JSON into an NDJSON store
    Convert {
        input: PathBuf,

        /// Defaults to the input path with an `.ndjson` extension
        output: Option<PathBuf>,
    },
}
