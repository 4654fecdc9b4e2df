//! Headless-browser render fallback.
//!
//! Some documentation sites only produce their content after running
//! JavaScript. [`ChromiumRenderer`] launches a browser for a single render and
//! always shuts it down before returning, so no idle browser process outlives
//! the call.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use freshdocs_shared::{FreshDocsError, Result};

/// Backend that renders a page and returns its visible body text (unnormalized).
#[async_trait]
pub trait RenderBackend: Send + Sync {
    async fn render_text(&self, url: &str) -> Result<String>;
}

/// Chromium via the DevTools protocol, one browser per render.
pub struct ChromiumRenderer {
    timeout: Duration,
    executable: Option<PathBuf>,
}

impl ChromiumRenderer {
    pub fn new(timeout: Duration, executable: Option<PathBuf>) -> Self {
        Self {
            timeout,
            executable,
        }
    }

    async fn launch(&self) -> Result<(Browser, JoinHandle<()>)> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(self.timeout)
            .launch_timeout(self.timeout)
            .no_sandbox();
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| FreshDocsError::fetch(format!("invalid browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FreshDocsError::fetch(format!("failed to launch browser: {e}")))?;

        // The handler must be polled for the browser connection to make progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok((browser, handler_task))
    }
}

#[async_trait]
impl RenderBackend for ChromiumRenderer {
    #[instrument(skip_all, fields(url = %url))]
    async fn render_text(&self, url: &str) -> Result<String> {
        let (mut browser, handler_task) = self.launch().await?;
        debug!("browser launched");

        let result = match tokio::time::timeout(self.timeout, body_text(&browser, url)).await {
            Ok(result) => result,
            Err(_) => Err(FreshDocsError::fetch(format!(
                "{url}: render timed out after {}s",
                self.timeout.as_secs()
            ))),
        };

        if let Err(e) = browser.close().await {
            warn!(error = %e, "failed to close browser");
        }
        if let Err(e) = browser.wait().await {
            warn!(error = %e, "failed to reap browser process");
        }
        handler_task.abort();

        result
    }
}

async fn body_text(browser: &Browser, url: &str) -> Result<String> {
    let page = browser
        .new_page(url)
        .await
        .map_err(|e| FreshDocsError::fetch(format!("{url}: {e}")))?;
    page.wait_for_navigation()
        .await
        .map_err(|e| FreshDocsError::fetch(format!("{url}: navigation failed: {e}")))?;

    let text = page
        .evaluate("document.body.innerText")
        .await
        .map_err(|e| FreshDocsError::fetch(format!("{url}: evaluate failed: {e}")))?
        .into_value::<String>()
        .map_err(|e| FreshDocsError::fetch(format!("{url}: unexpected body text: {e}")))?;

    if let Err(e) = page.close().await {
        debug!(error = %e, "failed to close page");
    }
    Ok(text)
}
