use super::{SearchHit, SearchProvider};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use url::Url;

const DDG_HTML_URL: &str = "https://html.duckduckgo.com/html/";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// DuckDuckGo search through its HTML endpoint. No API key required.
pub struct DuckDuckGoProvider {
    client: Client,
}

impl DuckDuckGoProvider {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PipelineError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let response = self
            .client
            .post(DDG_HTML_URL)
            .form(&[("q", query)])
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(PipelineError::RateLimit("DuckDuckGo returned 429".into()));
        }
        if status.is_server_error() {
            return Err(PipelineError::TransientNetwork(format!(
                "DuckDuckGo returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(PipelineError::Api(format!("DuckDuckGo returned {}", status)));
        }

        let html = response.text().await?;
        if looks_rate_limited(&html) {
            return Err(PipelineError::RateLimit(
                "DuckDuckGo served a bot challenge".into(),
            ));
        }

        let hits = parse_results(&html, max_results);
        ::log::debug!("DuckDuckGo returned {} hits for {:?}", hits.len(), query);
        if hits.is_empty() {
            return Err(PipelineError::NoResults(format!(
                "no search results for {:?}",
                query
            )));
        }
        Ok(hits)
    }

    fn name(&self) -> &'static str {
        "duckduckgo"
    }
}

fn looks_rate_limited(html: &str) -> bool {
    html.contains("anomaly-modal") || html.to_lowercase().contains("rate limit")
}

/// Extract organic results from a DuckDuckGo HTML results page
pub fn parse_results(html: &str, max_results: usize) -> Vec<SearchHit> {
    let doc = Html::parse_document(html);
    let result_selector = Selector::parse("div.result").unwrap();
    let title_selector = Selector::parse("a.result__a").unwrap();
    let snippet_selector = Selector::parse(".result__snippet").unwrap();

    doc.select(&result_selector)
        .filter(|r| !r.value().classes().any(|c| c == "result--ad"))
        .filter_map(|result| {
            let anchor = result.select(&title_selector).next()?;
            let link = resolve_redirect(anchor.value().attr("href")?)?;
            let title = collapse(anchor.text());
            let snippet = result
                .select(&snippet_selector)
                .next()
                .map(|s| collapse(s.text()))
                .unwrap_or_default();
            Some(SearchHit {
                title,
                link,
                snippet,
            })
        })
        .take(max_results)
        .collect()
}

/// DuckDuckGo wraps targets as `//duckduckgo.com/l/?uddg=<encoded>&...`
fn resolve_redirect(href: &str) -> Option<String> {
    let absolute_target = href.starts_with("http://") || href.starts_with("https://");
    if absolute_target && !href.contains("duckduckgo.com/l/") {
        return Some(href.to_string());
    }
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{}", href)
    } else {
        href.to_string()
    };
    let url = Url::parse(&absolute).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "uddg")
        .map(|(_, v)| v.into_owned())
}

fn collapse<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
