use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::{
    browser::{Browser, BrowserConfig},
    cdp::browser_protocol::page::{PrintToPdfParams, PrintToPdfParamsBuilder},
};
use futures::StreamExt;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use crate::options::PrintOptions;

/// One launched browser process, owned by a single request.
#[async_trait]
pub trait BrowserSession: Send {
    /// Loads `html` into a fresh page and prints it.
    async fn print_to_pdf(&mut self, html: &str, options: &PrintOptions) -> Result<Vec<u8>>;

    /// Shuts the browser down. Called exactly once per session.
    async fn close(&mut self) -> Result<()>;
}

pub struct ChromeSession {
    browser: Browser,
    handler: JoinHandle<()>,
    wait_for_fonts: bool,
    // Removed from disk when the session is dropped, after the browser exits.
    _profile: TempDir,
}

impl ChromeSession {
    pub async fn launch(
        executable: Option<&Path>,
        args: &[&str],
        wait_for_fonts: bool,
    ) -> Result<Self> {
        // Concurrent browsers must not share a profile directory.
        let profile = tempfile::Builder::new()
            .prefix("pdf-render-gateway-")
            .tempdir()
            .context("failed to create browser profile directory")?;

        let mut builder = BrowserConfig::builder()
            .viewport(None)
            .user_data_dir(profile.path())
            .args(args.iter().copied());

        if let Some(executable) = executable {
            builder = builder.chrome_executable(executable);
        }

        let config = builder.build().map_err(|e| {
            tracing::error!("Failed to create browser config: {}", e);
            anyhow::anyhow!("Browser config error: {}", e)
        })?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch browser")?;

        // The handler must be polled for any CDP command to complete. Some
        // websocket deserialization errors are normal, so keep going.
        let handler = tokio::task::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    tracing::trace!("browser handler event error: {}", err);
                }
            }
        });

        Ok(ChromeSession {
            browser,
            handler,
            wait_for_fonts,
            _profile: profile,
        })
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn print_to_pdf(&mut self, html: &str, options: &PrintOptions) -> Result<Vec<u8>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to open page")?;

        // Resolves once the document has loaded.
        page.set_content(html)
            .await
            .context("failed to load HTML content")?;

        if self.wait_for_fonts {
            page.evaluate("document.fonts.ready.then(() => true)")
                .await
                .context("failed waiting for fonts")?;
        }

        let pdf = page
            .pdf(pdf_params(options))
            .await
            .context("failed to print page to PDF")?;

        Ok(pdf)
    }

    async fn close(&mut self) -> Result<()> {
        let closed = self.browser.close().await;

        if let Err(err) = &closed {
            tracing::warn!("Graceful browser close failed, killing it: {}", err);
            if let Some(Err(kill_err)) = self.browser.kill().await {
                tracing::warn!("Failed to kill browser: {}", kill_err);
            }
        }

        // Reap the child so no zombie is left behind.
        self.browser
            .wait()
            .await
            .context("failed waiting for browser exit")?;
        self.handler.abort();

        closed.context("failed to close browser")?;
        Ok(())
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

pub fn pdf_params(options: &PrintOptions) -> PrintToPdfParams {
    let (paper_width, paper_height) = options.layout.inches();
    let margins = &options.margins;

    PrintToPdfParamsBuilder::default()
        .print_background(options.print_background)
        .landscape(options.landscape)
        .paper_width(paper_width)
        .paper_height(paper_height)
        .margin_top(margins.top.inches())
        .margin_right(margins.right.inches())
        .margin_bottom(margins.bottom.inches())
        .margin_left(margins.left.inches())
        .scale(options.scale)
        .prefer_css_page_size(options.prefer_css_page_size)
        .build()
}
