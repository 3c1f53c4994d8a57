//! chromiumoxide-backed [`BrowserEngine`].
//!
//! One browser process per crawl session: the proxy route, user agent, and
//! viewport are launch/override-time properties of the identity, so
//! sharing a process across sessions would leak identity state between
//! platforms.

use super::stealth;
use super::{BrowserEngine, BrowserSession};
use crate::config::EngineConfig;
use crate::error::{CrawlError, CrawlResult};
use crate::identity::Identity;
use anyhow::Context;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::cdp;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Production browser engine.
pub struct ChromiumEngine {
    chrome_executable: Option<String>,
    headless: bool,
    navigation_timeout: Duration,
}

impl ChromiumEngine {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            chrome_executable: config.chrome_executable().map(str::to_string),
            headless: config.headless(),
            navigation_timeout: config.navigation_timeout(),
        }
    }

    async fn launch(&self, identity: &Identity) -> anyhow::Result<ChromiumSession> {
        let user_data_dir = std::env::temp_dir().join(format!("shopscout_{}", identity.id));
        std::fs::create_dir_all(&user_data_dir).context("failed to create user data directory")?;

        let mut builder = BrowserConfigBuilder::default()
            .request_timeout(Duration::from_secs(30))
            .window_size(identity.viewport_width, identity.viewport_height)
            .user_data_dir(user_data_dir.clone())
            .arg(format!("--user-agent={}", identity.user_agent))
            .arg(format!("--lang={}", identity.locale))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-notifications")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--disable-background-networking")
            .arg("--disable-background-timer-throttling")
            .arg("--disable-breakpad")
            .arg("--disable-hang-monitor")
            .arg("--disable-prompt-on-repost")
            .arg("--metrics-recording-only")
            .arg("--password-store=basic")
            .arg("--use-mock-keychain")
            .arg("--hide-scrollbars")
            .arg("--mute-audio")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");

        if self.headless {
            builder = builder.headless_mode(HeadlessMode::default());
        } else {
            builder = builder.with_head();
        }
        if let Some(chrome) = &self.chrome_executable {
            builder = builder.chrome_executable(PathBuf::from(chrome));
        }
        if let Some(proxy) = &identity.proxy {
            builder = builder.arg(format!("--proxy-server={proxy}"));
        }

        let browser_config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("failed to launch browser")?;

        // The handler must be polled for the lifetime of the browser and
        // aborted on teardown, or it outlives the process.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::error!("browser handler error: {e:?}");
                }
            }
            debug!("browser event handler task completed");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create blank page")?;

        apply_stealth(&page, identity).await?;

        info!(identity = %identity.id, routed = identity.routed, "crawl session browser ready");

        Ok(ChromiumSession {
            browser: Some(browser),
            handler: Some(handler_task),
            page: Some(page),
            user_data_dir: Some(user_data_dir),
            navigation_timeout: self.navigation_timeout,
        })
    }
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    async fn open(&self, identity: &Identity) -> CrawlResult<Box<dyn BrowserSession>> {
        let session = self
            .launch(identity)
            .await
            .map_err(|e| CrawlError::NoSession(format!("{e:#}")))?;
        Ok(Box::new(session))
    }
}

/// Inject the fingerprint profile and evasion scripts on the blank page,
/// then pin the user-agent override. Evasion failures are best-effort:
/// injection only hard-fails when not a single script landed.
async fn apply_stealth(page: &Page, identity: &Identity) -> anyhow::Result<()> {
    add_new_document_script(page, stealth::profile_bootstrap(identity))
        .await
        .context("failed to inject fingerprint profile")?;

    let mut injected = 0usize;
    for script in stealth::EVASION_SCRIPTS {
        match add_new_document_script(page, (*script).to_string()).await {
            Ok(()) => injected += 1,
            Err(e) => warn!("failed to inject evasion script: {e}"),
        }
    }
    if injected == 0 {
        anyhow::bail!("no evasion script could be injected");
    }
    debug!(
        "stealth injection complete: {injected}/{} scripts active",
        stealth::EVASION_SCRIPTS.len()
    );

    page.execute(
        cdp::browser_protocol::network::SetUserAgentOverrideParams {
            user_agent: identity.user_agent.clone(),
            accept_language: Some(identity.accept_language.clone()),
            platform: Some(identity.platform_hint.clone()),
            user_agent_metadata: None,
        },
    )
    .await
    .context("failed to override user agent")?;

    page.execute(
        cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(identity.viewport_width))
            .height(i64::from(identity.viewport_height))
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(anyhow::Error::msg)?,
    )
    .await
    .context("failed to override device metrics")?;

    Ok(())
}

async fn add_new_document_script(page: &Page, source: String) -> anyhow::Result<()> {
    page.execute(
        cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams {
            source,
            include_command_line_api: None,
            world_name: None,
            run_immediately: None,
        },
    )
    .await?;
    Ok(())
}

/// One live chromiumoxide session. Close is explicit; Drop only aborts the
/// handler task as a fallback.
pub struct ChromiumSession {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    page: Option<Page>,
    user_data_dir: Option<PathBuf>,
    navigation_timeout: Duration,
}

impl ChromiumSession {
    fn page(&self) -> CrawlResult<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| CrawlError::Browser("session already closed".into()))
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn goto(&mut self, url: &str) -> CrawlResult<()> {
        let page = self.page()?;
        let navigation = async {
            page.goto(url)
                .await
                .map_err(|e| CrawlError::Browser(format!("navigation failed: {e}")))?;
            page.wait_for_navigation()
                .await
                .map_err(|e| CrawlError::Browser(format!("load wait failed: {e}")))?;
            Ok::<(), CrawlError>(())
        };

        match tokio::time::timeout(self.navigation_timeout, navigation).await {
            Ok(result) => result,
            Err(_) => Err(CrawlError::NavigationTimeout(self.navigation_timeout)),
        }
    }

    async fn content(&mut self) -> CrawlResult<String> {
        let page = self.page()?;
        page.content()
            .await
            .map_err(|e| CrawlError::Browser(format!("content read failed: {e}")))
    }

    async fn current_url(&mut self) -> Option<String> {
        let page = self.page.as_ref()?;
        page.url().await.ok().flatten()
    }

    async fn close(&mut self) {
        self.page.take();

        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("failed to close browser cleanly: {e}");
            }
            if let Err(e) = browser.wait().await {
                warn!("failed to wait for browser exit: {e}");
            }
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        if let Some(dir) = self.user_data_dir.take() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!("failed to remove user data dir {}: {e}", dir.display());
            }
        }
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.take() {
            warn!("ChromiumSession dropped without explicit close");
            handler.abort();
        }
    }
}
