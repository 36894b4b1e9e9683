use crate::browser::{PageRenderer, RenderedPage, RendererFactory};
use crate::error::{PipelineError, Result};
use crate::llm::{LlmProvider, TokenCounter};
use crate::search::{SearchHit, SearchProvider};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Counts whitespace-separated words, one token each
pub struct WordCounter;

impl TokenCounter for WordCounter {
    fn count_tokens(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

#[derive(Debug, Clone)]
pub enum MockPage {
    Html {
        final_url: Option<String>,
        html: String,
    },
    Fail,
}

impl MockPage {
    pub fn html(html: &str) -> Self {
        MockPage::Html {
            final_url: None,
            html: html.to_string(),
        }
    }

    pub fn redirected(final_url: &str, html: &str) -> Self {
        MockPage::Html {
            final_url: Some(final_url.to_string()),
            html: html.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MockStats {
    created: AtomicUsize,
    renders: AtomicUsize,
    closes: AtomicUsize,
    open: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockStats {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Sessions rendered into and not yet closed
    pub fn open_sessions(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

pub struct MockRendererFactory {
    pages: HashMap<String, MockPage>,
    stats: Arc<MockStats>,
    render_delay: Duration,
}

impl MockRendererFactory {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            stats: Arc::new(MockStats::default()),
            render_delay: Duration::ZERO,
        }
    }

    pub fn with_page(mut self, url: &str, page: MockPage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    pub fn stats(&self) -> Arc<MockStats> {
        self.stats.clone()
    }
}

impl RendererFactory for MockRendererFactory {
    fn create(&self, _task_id: usize) -> Box<dyn PageRenderer> {
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        Box::new(MockRenderer {
            pages: self.pages.clone(),
            stats: self.stats.clone(),
            render_delay: self.render_delay,
            open: false,
        })
    }
}

struct MockRenderer {
    pages: HashMap<String, MockPage>,
    stats: Arc<MockStats>,
    render_delay: Duration,
    open: bool,
}

#[async_trait]
impl PageRenderer for MockRenderer {
    async fn render(&mut self, url: &str) -> Result<RenderedPage> {
        if !self.open {
            self.open = true;
            self.stats.open.fetch_add(1, Ordering::SeqCst);
        }
        self.stats.renders.fetch_add(1, Ordering::SeqCst);
        let active = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_active.fetch_max(active, Ordering::SeqCst);
        tokio::time::sleep(self.render_delay).await;
        self.stats.active.fetch_sub(1, Ordering::SeqCst);

        match self.pages.get(url) {
            Some(MockPage::Html { final_url, html }) => Ok(RenderedPage {
                html: html.clone(),
                url: final_url.clone().unwrap_or_else(|| url.to_string()),
            }),
            _ => Err(PipelineError::Browser(format!("mock failure for {}", url))),
        }
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            self.stats.open.fetch_sub(1, Ordering::SeqCst);
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

type LlmResponder = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// LLM double that answers through a closure and records every prompt
pub struct MockLlm {
    max_tokens: usize,
    responder: LlmResponder,
    prompts: Mutex<Vec<String>>,
}

impl MockLlm {
    pub fn new<F>(max_tokens: usize, responder: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            max_tokens,
            responder: Box::new(responder),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl TokenCounter for MockLlm {
    fn count_tokens(&self, text: &str) -> usize {
        WordCounter.count_tokens(text)
    }
}

#[async_trait]
impl LlmProvider for MockLlm {
    async fn complete(&self, prompt: &str, _system_prompt: Option<&str>) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.responder)(prompt)
    }

    fn max_tokens(&self) -> usize {
        self.max_tokens
    }
}

type SearchResponder = Box<dyn Fn(&str) -> Result<Vec<SearchHit>> + Send + Sync>;

/// Search double that answers through a closure and records every query
pub struct MockSearch {
    responder: SearchResponder,
    queries: Mutex<Vec<String>>,
}

impl MockSearch {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<Vec<SearchHit>> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<SearchHit>> {
        self.queries.lock().unwrap().push(query.to_string());
        (self.responder)(query)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

pub fn hit(link: &str) -> SearchHit {
    SearchHit {
        title: format!("Title of {}", link),
        link: link.to_string(),
        snippet: "snippet".to_string(),
    }
}
