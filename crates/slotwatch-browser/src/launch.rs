use crate::{Error, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// One owned browser process plus its CDP message-pump task.
///
/// The handler task must run for the lifetime of the browser or no CDP
/// command completes; it is aborted when the handle is closed.
pub struct BrowserHandle {
    browser: Mutex<Browser>,
    handler_task: JoinHandle<()>,
}

impl BrowserHandle {
    /// Launch a browser process and start draining its CDP event stream.
    pub async fn launch(headless: bool) -> Result<Self> {
        let mut builder = BrowserConfig::builder().window_size(1280, 900);
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(Error::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| Error::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    // Some CDP events are not fully parseable; keep pumping.
                    tracing::debug!("CDP handler event error (continuing): {}", e);
                }
            }
        });

        Ok(Self {
            browser: Mutex::new(browser),
            handler_task,
        })
    }

    /// Open a fresh blank page in this browser.
    pub async fn new_page(&self) -> Result<Page> {
        let browser = self.browser.lock().await;
        Ok(browser.new_page("about:blank").await?)
    }

    /// Shut the browser process down and stop the message pump.
    pub async fn close(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            tracing::debug!("browser close failed: {}", e);
        }
        if let Err(e) = browser.wait().await {
            tracing::debug!("browser wait failed: {}", e);
        }
        self.handler_task.abort();
    }
}

impl std::fmt::Debug for BrowserHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserHandle").finish_non_exhaustive()
    }
}
