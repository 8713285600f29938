use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, anyhow, bail};

use crate::{
    launcher::BrowserLauncher,
    options::{PrintOptions, RenderDefaults},
};

/// Renders HTML to PDF with a fresh browser per call.
pub struct Gateway {
    launcher: Arc<dyn BrowserLauncher>,
    defaults: RenderDefaults,
    render_timeout: Duration,
}

impl Gateway {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        defaults: RenderDefaults,
        render_timeout: Duration,
    ) -> Self {
        Self {
            launcher,
            defaults,
            render_timeout,
        }
    }

    pub fn defaults(&self) -> &RenderDefaults {
        &self.defaults
    }

    /// Launches a browser, prints `html`, and closes the browser again.
    ///
    /// Once the launch succeeds the browser is closed exactly once, whether
    /// printing succeeded, failed or ran past the render timeout. A close
    /// failure is logged but does not discard a finished PDF.
    pub async fn render(&self, html: &str, options: &PrintOptions) -> Result<Vec<u8>> {
        let started = Instant::now();

        let mut session = self
            .launcher
            .launch()
            .await
            .with_context(|| format!("{} browser launch failed", self.launcher.name()))?;
        tracing::debug!(
            launcher = self.launcher.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "browser launched"
        );

        let printed = match tokio::time::timeout(
            self.render_timeout,
            session.print_to_pdf(html, options),
        )
        .await
        {
            Ok(printed) => printed,
            Err(_) => Err(anyhow!(
                "rendering timed out after {}s",
                self.render_timeout.as_secs_f64()
            )),
        };

        if let Err(err) = session.close().await {
            tracing::warn!("Failed to close browser: {:#}", err);
        }

        let pdf = printed?;
        if pdf.is_empty() {
            bail!("browser produced an empty PDF");
        }

        tracing::info!(
            bytes = pdf.len(),
            html_bytes = html.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "PDF rendered"
        );

        Ok(pdf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::testing::{Outcome, Record, STUB_PDF, StubLauncher};
    use crate::options::RenderRequest;

    fn gateway(outcome: Outcome) -> (Gateway, Arc<Record>) {
        let (launcher, record) = StubLauncher::new(outcome);
        let gateway = Gateway::new(
            launcher,
            RenderDefaults::default(),
            Duration::from_millis(100),
        );
        (gateway, record)
    }

    fn print_options() -> PrintOptions {
        RenderRequest {
            html: Some("<h1>Hi</h1>".into()),
            ..Default::default()
        }
        .normalize(&RenderDefaults::default())
        .unwrap()
        .print
    }

    #[tokio::test]
    async fn closes_browser_after_success() {
        let (gateway, record) = gateway(Outcome::Pdf);

        let pdf = gateway.render("<h1>Hi</h1>", &print_options()).await.unwrap();

        assert_eq!(pdf, STUB_PDF);
        assert_eq!(record.launches(), 1);
        assert_eq!(record.closes(), 1);
        assert_eq!(record.last_printed(), Some(print_options()));
    }

    #[tokio::test]
    async fn closes_browser_after_print_failure() {
        let (gateway, record) = gateway(Outcome::PrintFails);

        assert!(gateway.render("x", &print_options()).await.is_err());
        assert_eq!(record.closes(), 1);
    }

    #[tokio::test]
    async fn closes_browser_after_timeout() {
        let (gateway, record) = gateway(Outcome::Hangs);

        let err = gateway.render("x", &print_options()).await.unwrap_err();

        assert!(err.to_string().contains("timed out"));
        assert_eq!(record.closes(), 1);
    }

    #[tokio::test]
    async fn empty_pdf_is_an_error() {
        let (gateway, record) = gateway(Outcome::Empty);

        assert!(gateway.render("x", &print_options()).await.is_err());
        assert_eq!(record.closes(), 1);
    }

    #[tokio::test]
    async fn nothing_to_close_when_launch_fails() {
        let (gateway, record) = gateway(Outcome::LaunchFails);

        assert!(gateway.render("x", &print_options()).await.is_err());
        assert_eq!(record.launches(), 1);
        assert_eq!(record.closes(), 0);
    }

    #[tokio::test]
    async fn every_render_gets_its_own_browser() {
        let (gateway, record) = gateway(Outcome::Pdf);

        gateway.render("x", &print_options()).await.unwrap();
        gateway.render("x", &print_options()).await.unwrap();

        assert_eq!(record.launches(), 2);
        assert_eq!(record.closes(), 2);
    }
}
