pub mod webdriver;

use crate::error::Result;
use crate::parsers::extract_content;
use crate::results::PageContent;
use async_trait::async_trait;

pub use webdriver::{BrowserSettings, WebDriverFactory, WebDriverSession};

/// A rendered document and the URL it ended up at after redirects
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
    pub url: String,
}

/// A browser session able to render one page at a time
#[async_trait]
pub trait PageRenderer: Send {
    /// Navigate to `url`, let dynamic content settle, and return the document
    async fn render(&mut self, url: &str) -> Result<RenderedPage>;

    /// Release the underlying browser. Safe to call more than once.
    async fn close(&mut self);
}

/// Creates independent renderer sessions, one per acquisition task
pub trait RendererFactory: Send + Sync {
    fn create(&self, task_id: usize) -> Box<dyn PageRenderer>;
}

/// Render `url` and extract its content.
///
/// On failure the session is closed before the error is returned, so a
/// broken browser process is never left running.
pub async fn fetch_page(renderer: &mut dyn PageRenderer, url: &str) -> Result<PageContent> {
    match renderer.render(url).await {
        Ok(page) => Ok(extract_content(&page.html, &page.url)),
        Err(e) => {
            ::log::warn!("Failed to render {}: {}", url, e);
            renderer.close().await;
            Err(e)
        }
    }
}
