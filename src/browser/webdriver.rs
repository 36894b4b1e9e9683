use super::{PageRenderer, RenderedPage, RendererFactory};
use crate::config::Config;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use fantoccini::wd::Capabilities;
use fantoccini::{Client, ClientBuilder};
use serde_json::json;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Alternative WebDriver endpoints tried when the configured one is down
const FALLBACK_WEBDRIVER_URLS: [&str; 3] = [
    "http://localhost:9515", // ChromeDriver default
    "http://localhost:4444", // Selenium / geckodriver default
    "http://127.0.0.1:4444", // Try with IP instead of localhost
];

/// Settings shared by every WebDriver session of a run
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub webdriver_url: String,
    pub chrome_path: Option<String>,
    pub settle_delay: Duration,
}

impl BrowserSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            webdriver_url: config.webdriver_url.clone(),
            chrome_path: config.chrome_path.clone(),
            settle_delay: config.settle_delay(),
        }
    }
}

/// Headless Chrome session driven over WebDriver.
///
/// The session is created on first use and torn down by [`PageRenderer::close`]
/// or after a failed render. If the value is dropped without closing, the
/// last `Client` handle going away ends the WebDriver session as well.
pub struct WebDriverSession {
    id: usize,
    settings: BrowserSettings,
    client: Option<Client>,
}

impl WebDriverSession {
    pub fn new(id: usize, settings: BrowserSettings) -> Self {
        Self {
            id,
            settings,
            client: None,
        }
    }

    /// Current client, connecting if this session has none yet
    async fn acquire(&mut self) -> Result<Client> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }
        ::log::debug!("Session {} connecting to WebDriver", self.id);
        let client = connect_to_webdriver(self.id, &self.settings).await?;
        self.client = Some(client.clone());
        Ok(client)
    }
}

#[async_trait]
impl PageRenderer for WebDriverSession {
    async fn render(&mut self, url: &str) -> Result<RenderedPage> {
        let settle_delay = self.settings.settle_delay;
        let client = self.acquire().await?;

        client
            .goto(url)
            .await
            .map_err(|e| command_error(self.id, "navigating to", url, e))?;

        // Give client-side rendering time to fill in the document
        tokio::time::sleep(settle_delay).await;

        let html = client
            .source()
            .await
            .map_err(|e| command_error(self.id, "reading source of", url, e))?;
        let current_url = client
            .current_url()
            .await
            .map_err(|e| command_error(self.id, "reading current URL of", url, e))?;

        ::log::debug!(
            "Session {} rendered {} ({} bytes, final URL {})",
            self.id,
            url,
            html.len(),
            current_url
        );

        Ok(RenderedPage {
            html,
            url: current_url.to_string(),
        })
    }

    async fn close(&mut self) {
        if let Some(client) = self.client.take() {
            if let Err(e) = client.close().await {
                ::log::warn!("Session {} failed to close client: {}", self.id, e);
            } else {
                ::log::debug!("Session {} closed", self.id);
            }
        }
    }
}

/// Builds one [`WebDriverSession`] per acquisition task
#[derive(Debug, Clone)]
pub struct WebDriverFactory {
    settings: BrowserSettings,
}

impl WebDriverFactory {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }
}

impl RendererFactory for WebDriverFactory {
    fn create(&self, task_id: usize) -> Box<dyn PageRenderer> {
        Box::new(WebDriverSession::new(task_id, self.settings.clone()))
    }
}

/// Headless Chrome capabilities with automation fingerprints turned down
pub fn chrome_capabilities(chrome_path: Option<&str>) -> Capabilities {
    let mut options = json!({
        "args": [
            "--headless",
            "--disable-gpu",
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--disable-blink-features=AutomationControlled",
            format!("--user-agent={}", USER_AGENT),
        ],
        "excludeSwitches": ["enable-automation"],
        "useAutomationExtension": false,
    });
    if let Some(path) = chrome_path.filter(|p| !p.is_empty()) {
        options["binary"] = json!(path);
    }

    let mut caps = Capabilities::new();
    caps.insert("goog:chromeOptions".to_string(), options);
    caps
}

/// Connects to the configured WebDriver, then to the common fallbacks
async fn connect_to_webdriver(session_id: usize, settings: &BrowserSettings) -> Result<Client> {
    let caps = chrome_capabilities(settings.chrome_path.as_deref());

    let first_error = match ClientBuilder::native()
        .capabilities(caps.clone())
        .connect(&settings.webdriver_url)
        .await
    {
        Ok(client) => {
            ::log::debug!(
                "Session {} connected to WebDriver at {}",
                session_id,
                settings.webdriver_url
            );
            return Ok(client);
        }
        Err(e) => {
            ::log::error!(
                "Session {} failed to connect to WebDriver at {}: {}",
                session_id,
                settings.webdriver_url,
                e
            );
            e.to_string()
        }
    };

    for url in FALLBACK_WEBDRIVER_URLS.iter() {
        if *url == settings.webdriver_url {
            continue;
        }
        ::log::info!("Session {} trying fallback WebDriver URL: {}", session_id, url);
        if let Ok(client) = ClientBuilder::native()
            .capabilities(caps.clone())
            .connect(url)
            .await
        {
            ::log::debug!("Session {} connected to fallback WebDriver at {}", session_id, url);
            return Ok(client);
        }
    }

    ::log::error!(
        "Make sure a WebDriver server is running or set the WEBDRIVER_URL environment variable"
    );
    Err(PipelineError::Browser(format!(
        "no WebDriver reachable at {}: {}",
        settings.webdriver_url, first_error
    )))
}

fn command_error(
    session_id: usize,
    context: &str,
    url: &str,
    error: fantoccini::error::CmdError,
) -> PipelineError {
    if error.to_string().contains("Unable to find session") {
        ::log::warn!("Session {} lost its browser while {} {}", session_id, context, url);
    }
    PipelineError::Browser(format!("{} {}: {}", context, url, error))
}
