use std::{path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result, anyhow};
use dotenv::dotenv;

use crate::options::{Length, RenderDefaults};

/// Set (to anything non-empty) by the serverless platform.
pub const MANAGED_ENV_FLAG: &str = "VERCEL_ENV";

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum Runtime {
    #[default]
    Local,
    Managed,
}

#[derive(Debug, PartialEq, Clone)]
pub struct AppConfig {
    pub runtime: Runtime,
    pub port: u16,

    pub chrome_path: Option<PathBuf>,
    pub chromium_path: Option<PathBuf>,
    pub chromium_bundle_dir: PathBuf,
    pub wait_for_fonts: bool,

    pub defaults: RenderDefaults,
    pub render_timeout: Duration,
    pub max_body_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            runtime: Runtime::Local,
            port: 3000,
            chrome_path: None,
            chromium_path: None,
            chromium_bundle_dir: PathBuf::from("/opt/chromium"),
            wait_for_fonts: true,
            defaults: RenderDefaults::default(),
            render_timeout: Duration::from_secs(55),
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Reads `.env` (if present) and the process environment.
pub fn load_config() -> Result<AppConfig> {
    dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<AppConfig> {
    // Empty values count as unset.
    let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
    let mut config = AppConfig::default();

    if var(MANAGED_ENV_FLAG).is_some() {
        config.runtime = Runtime::Managed;
    }

    if let Some(port) = var("PORT") {
        config.port = parse_value("PORT", &port)?;
    }

    config.chrome_path = var("CHROME_PATH").map(PathBuf::from);
    config.chromium_path = var("CHROMIUM_PATH").map(PathBuf::from);
    if let Some(dir) = var("CHROMIUM_BUNDLE_DIR") {
        config.chromium_bundle_dir = PathBuf::from(dir);
    }

    if let Some(value) = var("PDF_WAIT_FOR_FONTS") {
        config.wait_for_fonts = parse_value("PDF_WAIT_FOR_FONTS", &value)?;
    }

    if let Some(value) = var("PDF_DEFAULT_MARGIN") {
        config.defaults.margin = Length::parse(&value)
            .ok_or_else(|| anyhow!("Invalid PDF_DEFAULT_MARGIN value: {}", value))?;
    }
    if let Some(value) = var("PDF_SCALE") {
        let scale: f64 = parse_value("PDF_SCALE", &value)?;
        if !(0.1..=2.0).contains(&scale) {
            return Err(anyhow!("PDF_SCALE must be between 0.1 and 2.0, got {}", scale));
        }
        config.defaults.scale = scale;
    }
    if let Some(value) = var("PDF_PREFER_CSS_PAGE_SIZE") {
        config.defaults.prefer_css_page_size = parse_value("PDF_PREFER_CSS_PAGE_SIZE", &value)?;
    }

    if let Some(value) = var("RENDER_TIMEOUT_SECS") {
        config.render_timeout = Duration::from_secs(parse_value("RENDER_TIMEOUT_SECS", &value)?);
    }
    if let Some(value) = var("MAX_BODY_BYTES") {
        config.max_body_bytes = parse_value("MAX_BODY_BYTES", &value)?;
    }

    Ok(config)
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid {} value: {}", key, value))
}
