//! Chrome DevTools adapter for [`BrowserPage`]

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::{Browser, BrowserConfig as CdpConfig, Page};
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BrowserCookie, BrowserError, BrowserPage};
use crate::config::BrowserConfig;

/// One Chrome instance driving one page
pub struct ChromePage {
    browser: Mutex<Browser>,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromePage {
    /// Launch Chrome and open a blank page
    pub async fn launch(config: &BrowserConfig) -> Result<Self, BrowserError> {
        info!(headless = config.headless, "Launching browser");

        let mut builder = CdpConfig::builder();
        if let Some(path) = &config.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        // with_head means NOT headless
        if !config.headless {
            builder = builder.with_head();
        }
        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-dev-shm-usage");
        if let Some(ua) = &config.user_agent {
            builder = builder.arg(format!("--user-agent={ua}"));
        }

        let cdp_config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            handler,
        })
    }
}

#[async_trait]
impl BrowserPage for ChromePage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        debug!(url, "Navigating");
        let nav_err = |e: chromiumoxide::error::CdpError| BrowserError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        };
        self.page.goto(url).await.map_err(nav_err)?;
        self.page.wait_for_navigation().await.map_err(nav_err)?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        let result = self
            .page
            .evaluate(script.to_string())
            .await
            .map_err(|e| BrowserError::Evaluate(e.to_string()))?;

        // undefined results carry no value
        Ok(result.into_value::<Value>().unwrap_or(Value::Null))
    }

    async fn cookies(&self, domain_filter: &str) -> Result<Vec<BrowserCookie>, BrowserError> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| BrowserError::Cookies(e.to_string()))?;

        Ok(cookies
            .into_iter()
            .filter(|c| c.domain.contains(domain_filter))
            .map(|c| BrowserCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: Some(c.path),
            })
            .collect())
    }

    async fn add_cookies(&self, cookies: &[BrowserCookie]) -> Result<(), BrowserError> {
        let mut params = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            let mut builder = CookieParam::builder()
                .name(cookie.name.clone())
                .value(cookie.value.clone())
                .domain(cookie.domain.clone());
            if let Some(path) = &cookie.path {
                builder = builder.path(path.clone());
            }
            match builder.build() {
                Ok(param) => params.push(param),
                Err(e) => warn!(name = %cookie.name, error = %e, "Skipping malformed cookie"),
            }
        }

        self.page
            .set_cookies(params)
            .await
            .map_err(|e| BrowserError::Cookies(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!(error = %e, "Browser did not close cleanly");
        }
        self.handler.abort();
        Ok(())
    }
}
