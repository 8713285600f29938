//! Browser launch strategies.
//!
//! The gateway never decides how to find a browser itself. It is handed a
//! [`BrowserLauncher`] at startup: [`ManagedLauncher`] for serverless
//! deployments that ship their own headless Chromium, [`LocalLauncher`] for a
//! browser installed on the machine.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;

use crate::browser::{BrowserSession, ChromeSession};
use crate::cnfg::{AppConfig, Runtime};

/// Flags for the bundled serverless Chromium build.
pub const MANAGED_ARGS: &[&str] = &[
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-extensions",
    "--disable-background-networking",
    "--no-sandbox",
    "--no-zygote",
    "--no-first-run",
    "--hide-scrollbars",
    "--mute-audio",
    "--font-render-hinting=none",
    "--use-gl=angle",
    "--use-angle=swiftshader",
];

/// Sandbox-disabling flags for running a full browser inside containers/CI.
pub const LOCAL_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
];

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Starts a fresh headless browser. Nothing is reused between calls.
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

pub fn from_config(config: &AppConfig) -> Arc<dyn BrowserLauncher> {
    match config.runtime {
        Runtime::Managed => Arc::new(ManagedLauncher {
            executable: config.chromium_path.clone(),
            bundle_dir: config.chromium_bundle_dir.clone(),
            wait_for_fonts: config.wait_for_fonts,
        }),
        Runtime::Local => Arc::new(LocalLauncher {
            executable: config.chrome_path.clone(),
            wait_for_fonts: config.wait_for_fonts,
        }),
    }
}

pub struct ManagedLauncher {
    pub executable: Option<PathBuf>,
    pub bundle_dir: PathBuf,
    pub wait_for_fonts: bool,
}

impl ManagedLauncher {
    /// Finds the bundled binary for this machine's architecture. Runs on every
    /// launch, so a bundle unpacked after startup is still picked up.
    pub async fn resolve_executable(&self) -> Result<PathBuf> {
        let path = match &self.executable {
            Some(path) => path.clone(),
            None => self
                .bundle_dir
                .join(bundle_arch(std::env::consts::ARCH)?)
                .join("chromium"),
        };

        let metadata = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("bundled Chromium not found at {}", path.display()))?;
        if !metadata.is_file() {
            bail!("bundled Chromium at {} is not a file", path.display());
        }

        Ok(path)
    }
}

fn bundle_arch(arch: &str) -> Result<&'static str> {
    match arch {
        "x86_64" => Ok("x64"),
        "aarch64" => Ok("arm64"),
        other => bail!("no bundled Chromium for architecture {}", other),
    }
}

#[async_trait]
impl BrowserLauncher for ManagedLauncher {
    fn name(&self) -> &'static str {
        "managed"
    }

    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let executable = self.resolve_executable().await?;
        tracing::debug!(executable = %executable.display(), "launching bundled Chromium");

        let session =
            ChromeSession::launch(Some(&executable), MANAGED_ARGS, self.wait_for_fonts).await?;
        Ok(Box::new(session))
    }
}

pub struct LocalLauncher {
    /// `None` lets chromiumoxide look for an installed Chrome/Chromium.
    pub executable: Option<PathBuf>,
    pub wait_for_fonts: bool,
}

#[async_trait]
impl BrowserLauncher for LocalLauncher {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let session = ChromeSession::launch(
            self.executable.as_deref(),
            LOCAL_ARGS,
            self.wait_for_fonts,
        )
        .await?;
        Ok(Box::new(session))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_rust_architectures_to_bundle_names() {
        assert_eq!(bundle_arch("x86_64").unwrap(), "x64");
        assert_eq!(bundle_arch("aarch64").unwrap(), "arm64");
        assert!(bundle_arch("riscv64").is_err());
    }

    #[tokio::test]
    async fn managed_launcher_finds_architecture_matched_binary() {
        let Ok(arch) = bundle_arch(std::env::consts::ARCH) else {
            return;
        };
        let bundle = tempfile::tempdir().unwrap();
        let binary = bundle.path().join(arch).join("chromium");
        std::fs::create_dir_all(binary.parent().unwrap()).unwrap();
        std::fs::write(&binary, b"").unwrap();

        let launcher = ManagedLauncher {
            executable: None,
            bundle_dir: bundle.path().to_path_buf(),
            wait_for_fonts: true,
        };

        assert_eq!(launcher.resolve_executable().await.unwrap(), binary);
    }

    #[tokio::test]
    async fn managed_launcher_fails_without_a_bundle() {
        let bundle = tempfile::tempdir().unwrap();
        let launcher = ManagedLauncher {
            executable: None,
            bundle_dir: bundle.path().to_path_buf(),
            wait_for_fonts: true,
        };

        assert!(launcher.resolve_executable().await.is_err());
        assert!(launcher.launch().await.is_err());
    }

    #[tokio::test]
    async fn explicit_managed_path_overrides_bundle_dir() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("headless-shell");
        std::fs::write(&binary, b"").unwrap();

        let launcher = ManagedLauncher {
            executable: Some(binary.clone()),
            bundle_dir: PathBuf::from("/nonexistent"),
            wait_for_fonts: false,
        };

        assert_eq!(launcher.resolve_executable().await.unwrap(), binary);
    }

    #[test]
    fn runtime_selects_launcher() {
        let local = AppConfig::default();
        assert_eq!(from_config(&local).name(), "local");

        let managed = AppConfig {
            runtime: Runtime::Managed,
            ..AppConfig::default()
        };
        assert_eq!(from_config(&managed).name(), "managed");
    }
}
