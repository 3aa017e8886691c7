use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::element::Element;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::browser::navigator::{CardSelectors, PageNavigator, RawCard};
use crate::browser::stealth::{
    choose_user_agent, generate_stealth_script, UserAgentGenerator, SCROLL_TO_BOTTOM_JS, SHADOW_CLICK_FN,
};
use crate::config::BrowserConfig;
use crate::error::{Result, HarvestError};
use crate::parser::CardParser;

const CONSENT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Delete a per-launch chromium profile; a missing dir is fine.
pub(crate) async fn remove_profile_dir(user_data_dir: &Path) {
    if !user_data_dir.exists() {
        return;
    }
    match tokio::fs::remove_dir_all(user_data_dir).await {
        Ok(()) => debug!("Removed browser profile dir {:?}", user_data_dir),
        Err(e) => warn!("Failed to remove browser profile dir {:?}: {}", user_data_dir, e),
    }
}

/// One chromium tab, driven for the whole run.
pub struct ChromiumNavigator {
    browser: Mutex<Option<Browser>>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
    page: Page,
    navigation_timeout: Duration,
    user_data_dir: PathBuf,
}

impl ChromiumNavigator {
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        // unique user data dir to avoid singleton lock issues
        let user_data_dir = std::env::temp_dir().join(format!(
            "listing-harvester-{}-{}",
            std::process::id(),
            Uuid::new_v4()
        ));
        if let Err(e) = std::fs::create_dir_all(&user_data_dir) {
            warn!("Failed to create browser profile dir {:?}: {}", user_data_dir, e);
        }

        let (browser, handler_task) = match Self::create_browser(config, &user_data_dir).await {
            Ok(launched) => launched,
            Err(e) => {
                remove_profile_dir(&user_data_dir).await;
                return Err(e);
            }
        };

        info!("Creating browser page");
        let page = match tokio::time::timeout(Duration::from_secs(10), browser.new_page("about:blank")).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                error!("Failed to create new page: {}", e);
                return Err(HarvestError::BrowserError(format!("Failed to create new page: {}", e)).into());
            }
            Err(_) => {
                error!("Timeout creating new page");
                return Err(HarvestError::BrowserError("Timeout creating new page".to_string()).into());
            }
        };

        if let Some(user_agent) = choose_user_agent(config, &UserAgentGenerator::new()) {
            let user_agent_params = SetUserAgentOverrideParams::builder()
                .user_agent(&user_agent)
                .build()
                .map_err(|e| HarvestError::BrowserError(format!("Failed to build user agent params: {}", e)))?;

            page.execute(user_agent_params)
                .await
                .map_err(|e| HarvestError::BrowserError(format!("Failed to set user agent: {}", e)))?;
            debug!("Using user agent {}", user_agent);
        }

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            handler_task: Mutex::new(Some(handler_task)),
            page,
            navigation_timeout: config.navigation_timeout,
            user_data_dir,
        })
    }

    async fn create_browser(config: &BrowserConfig, user_data_dir: &Path) -> Result<(Browser, JoinHandle<()>)> {
        info!("Launching browser (headless: {})", config.headless);

        let mut builder = ChromeConfig::builder()
            .no_sandbox()
            .window_size(config.window_width, config.window_height)
            .args(vec![
                format!("--user-data-dir={}", user_data_dir.display()),
                "--disable-gpu".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--disable-extensions".to_string(),
                "--mute-audio".to_string(),
                "--no-first-run".to_string(),
                "--disable-default-apps".to_string(),
                "--disable-sync".to_string(),
                "--disable-blink-features=AutomationControlled".to_string(),
                "--log-level=3".to_string(),
            ]);

        if !config.headless {
            builder = builder.with_head();
        }

        let browser_config = builder
            .build()
            .map_err(|e| HarvestError::BrowserError(format!("Failed to create browser config: {}", e)))?;

        let mut last_error = None;
        for attempt in 1..=config.launch_attempts {
            match Browser::launch(browser_config.clone()).await {
                Ok((browser, mut handler)) => {
                    info!("Browser launched successfully on attempt {}", attempt);

                    let handler_task = tokio::spawn(async move {
                        while let Some(h) = handler.next().await {
                            if let Err(e) = h {
                                // filter out common websocket deserialization errors
                                let error_msg = e.to_string();
                                if error_msg.contains("data did not match any variant")
                                    || error_msg.contains("untagged enum Message")
                                {
                                    debug!("Ignoring WebSocket deserialization error: {}", e);
                                } else {
                                    warn!("Browser handler error: {}", e);
                                }
                            }
                        }
                        debug!("Browser handler task ended");
                    });

                    return Ok((browser, handler_task));
                }
                Err(e) => {
                    error!("Browser launch attempt {} failed: {}", attempt, e);
                    last_error = Some(e.to_string());
                    if attempt < config.launch_attempts {
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        }

        Err(HarvestError::BrowserError(format!(
            "Failed to launch browser after {} attempts: {}",
            config.launch_attempts,
            last_error.unwrap_or_else(|| "no attempt made".to_string())
        )).into())
    }

    async fn click(&self, element: &Element) -> Result<bool> {
        element
            .call_js_fn(SHADOW_CLICK_FN, false)
            .await
            .map_err(|e| HarvestError::BrowserError(format!("Failed to click control: {}", e)))?;
        Ok(true)
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Element>> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(|e| HarvestError::BrowserError(format!("Failed to query '{}': {}", selector, e)))?;
        Ok(elements)
    }

    async fn accessible_text(element: &Element) -> Option<String> {
        match element.attribute("text").await {
            Ok(Some(text)) if !text.trim().is_empty() => Some(text),
            _ => element
                .inner_text()
                .await
                .ok()
                .flatten()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        }
    }
}

#[async_trait]
impl PageNavigator for ChromiumNavigator {
    async fn navigate(&self, url: &str) -> Result<()> {
        info!("Navigating to: {}", url);

        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(HarvestError::BrowserError(format!("Failed to navigate to {}: {}", url, e)).into());
            }
            Err(_) => {
                return Err(HarvestError::Timeout(format!(
                    "navigation to {} exceeded {:?}",
                    url, self.navigation_timeout
                )).into());
            }
        }

        if let Err(e) = self.page.evaluate(generate_stealth_script()).await {
            warn!("Failed to inject stealth script: {}", e);
        }

        Ok(())
    }

    async fn cards(&self, selectors: &CardSelectors) -> Result<Vec<RawCard>> {
        let html = self
            .page
            .content()
            .await
            .map_err(|e| HarvestError::BrowserError(format!("Failed to get page content: {}", e)))?;

        let base_url = match self.page.url().await {
            Ok(Some(current)) => Url::parse(&current).ok(),
            _ => None,
        };

        let parser = CardParser::new(selectors)?;
        Ok(parser.parse_cards(&html, base_url.as_ref()))
    }

    async fn count_cards(&self, card_selector: &str) -> Result<usize> {
        Ok(self.find_all(card_selector).await?.len())
    }

    async fn trigger_control(&self, selector: &str) -> Result<bool> {
        match self.page.find_element(selector).await {
            Ok(element) => self.click(&element).await,
            Err(e) => {
                debug!("No control matches '{}': {}", selector, e);
                Ok(false)
            }
        }
    }

    async fn control_texts(&self, selector: &str) -> Result<Vec<Option<String>>> {
        let elements = self.find_all(selector).await?;
        let mut texts = Vec::with_capacity(elements.len());
        for element in &elements {
            texts.push(Self::accessible_text(element).await);
        }
        Ok(texts)
    }

    async fn trigger_control_at(&self, selector: &str, index: usize) -> Result<bool> {
        let elements = self.find_all(selector).await?;
        match elements.get(index) {
            Some(element) => self.click(element).await,
            None => Ok(false),
        }
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        self.page
            .evaluate(SCROLL_TO_BOTTOM_JS)
            .await
            .map_err(|e| HarvestError::BrowserError(format!("Failed to scroll: {}", e)))?;
        Ok(())
    }

    async fn capture(&self) -> Result<Vec<u8>> {
        let png = self
            .page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(|e| HarvestError::BrowserError(format!("Failed to take screenshot: {}", e)))?;
        Ok(png)
    }

    async fn dismiss_consent(&self, selector: &str, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(button) = self.page.find_element(selector).await {
                button
                    .click()
                    .await
                    .map_err(|e| HarvestError::BrowserError(format!("Failed to dismiss consent banner: {}", e)))?;
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(CONSENT_POLL_INTERVAL).await;
        }
    }

    async fn close(&self) -> Result<()> {
        info!("Closing browser...");

        if let Err(e) = self.page.clone().close().await {
            warn!("Failed to close page: {}", e);
        }

        if let Some(mut browser) = self.browser.lock().await.take() {
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser: {}", e);
            }
            if let Err(e) = browser.wait().await {
                warn!("Failed waiting for browser exit: {}", e);
            }
        }

        if let Some(task) = self.handler_task.lock().await.take() {
            task.abort();
        }

        remove_profile_dir(&self.user_data_dir).await;

        Ok(())
    }
}
