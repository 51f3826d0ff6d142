//! Chromium implementation of `BrowserEngine` over the DevTools protocol

#![allow(clippy::uninlined_format_args)]

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::infrastructure::browser::{BrowserEngine, BrowserError, BrowserLauncher, WaitPolicy};
use crate::infrastructure::config::BrowserSettings;

/// One browser process with a single page, owned by one harvest run
pub struct ChromiumBrowser {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler: JoinHandle<()>,
    navigation_timeout: Duration,
}

impl ChromiumBrowser {
    pub async fn launch(
        settings: &BrowserSettings,
        navigation_timeout: Duration,
    ) -> Result<Self, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .window_size(settings.viewport_width, settings.viewport_height)
            .launch_timeout(Duration::from_secs(settings.launch_timeout_secs))
            .arg(format!("--user-agent={}", settings.user_agent))
            .arg("--lang=ko-KR")
            .arg("--disable-blink-features=AutomationControlled");

        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &settings.executable_path {
            builder = builder.chrome_executable(path);
        }

        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler stopped: {}", e);
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        info!(
            "🌐 Chromium launched (headless: {}, viewport: {}x{})",
            settings.headless, settings.viewport_width, settings.viewport_height
        );

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            page,
            handler,
            navigation_timeout,
        })
    }

    async fn ensure_open(&self) -> Result<(), BrowserError> {
        if self.browser.lock().await.is_none() {
            return Err(BrowserError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserEngine for ChromiumBrowser {
    async fn navigate(&self, url: &str, wait: WaitPolicy) -> Result<(), BrowserError> {
        self.ensure_open().await?;

        let navigation = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        };

        match tokio::time::timeout(self.navigation_timeout, navigation).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(BrowserError::Navigation {
                    url: url.to_string(),
                    message: e.to_string(),
                });
            }
            Err(_) => {
                return Err(BrowserError::Timeout {
                    url: url.to_string(),
                    seconds: self.navigation_timeout.as_secs(),
                });
            }
        }

        if let WaitPolicy::LoadThenSettle(pause) = wait {
            tokio::time::sleep(pause).await;
        }

        debug!("Navigated to {}", url);
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        self.ensure_open().await?;

        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?;

        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError> {
        self.ensure_open().await?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BrowserError::Screenshot(e.to_string()))?;
        }

        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await
            .map_err(|e| BrowserError::Screenshot(e.to_string()))?;

        info!("📸 Screenshot saved: {:?}", path);
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Err(BrowserError::Closed);
        };

        if let Err(e) = browser.close().await {
            warn!("⚠️ Browser close failed: {}", e);
        }
        if let Err(e) = browser.wait().await {
            warn!("⚠️ Browser process wait failed: {}", e);
        }
        self.handler.abort();

        info!("🌐 Chromium closed");
        Ok(())
    }
}

/// Launches `ChromiumBrowser` sessions from the browser settings
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    settings: BrowserSettings,
    navigation_timeout: Duration,
}

impl ChromiumLauncher {
    pub fn new(settings: BrowserSettings, navigation_timeout: Duration) -> Self {
        Self {
            settings,
            navigation_timeout,
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserEngine>, BrowserError> {
        let browser = ChromiumBrowser::launch(&self.settings, self.navigation_timeout).await?;
        Ok(Box::new(browser))
    }
}

impl Drop for ChromiumBrowser {
    fn drop(&mut self) {
        self.handler.abort();
    }
}
