use crate::{BrowserHandle, Result};
use chromiumoxide::cdp::browser_protocol::network::{EnableParams, SetBlockedUrLsParams};
use chromiumoxide::page::Page;

/// URL patterns blocked when heavy-resource blocking is enabled.
const BLOCKED_RESOURCE_PATTERNS: &[&str] = &[
    "*.png", "*.jpg", "*.jpeg", "*.gif", "*.svg", "*.ico", "*.woff", "*.woff2", "*.ttf", "*.mp4",
    "*.webm",
];

/// Browser execution context for exactly one application check.
///
/// The page is created fresh per check and `close` consumes the session, so
/// a context can never be reused across checks or outlive its navigation.
pub struct CheckSession {
    page: Page,
}

impl CheckSession {
    /// Open a fresh page on the leased browser.
    ///
    /// With `block_heavy_resources` set, image/font/media requests are
    /// blocked via `Network.setBlockedURLs` to speed navigation up.
    pub async fn open(handle: &BrowserHandle, block_heavy_resources: bool) -> Result<Self> {
        let page = handle.new_page().await?;

        if block_heavy_resources {
            page.execute(EnableParams::default()).await?;
            let patterns = BLOCKED_RESOURCE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect();
            page.execute(SetBlockedUrLsParams::new(patterns)).await?;
        }

        Ok(Self { page })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Close the page. Consumes the session; failures are logged, not
    /// surfaced, since the check outcome is already decided by now.
    pub async fn close(self) {
        if let Err(e) = self.page.close().await {
            tracing::debug!("failed to close check page: {}", e);
        }
    }
}
