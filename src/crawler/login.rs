//! Login flows
//!
//! Both flows only change the browser's cookie jar. The caller refreshes the
//! shared session from the browser afterwards and re-checks liveness.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::api::WEB_BASE;
use super::session::SESSION_COOKIE;
use crate::browser::{BrowserCookie, BrowserPage, SharedPage};
use crate::models::LoginType;
use crate::utils::cancel::CancelToken;
use crate::utils::error::CrawlerError;
use crate::utils::parse_cookie_string;

/// Domain the session cookies are scoped to
pub const COOKIE_DOMAIN: &str = ".xiaohongshu.com";

/// How to obtain a logged-in session
#[derive(Debug, Clone)]
pub struct LoginFlow {
    pub login_type: LoginType,
    /// `k=v; k2=v2` cookie string for cookie login
    pub cookie: String,
    /// Bound on the QR code wait
    pub qr_timeout: Duration,
    pub poll_interval: Duration,
    /// Page loaded after cookies change
    pub home_url: String,
}

impl LoginFlow {
    pub fn new(login_type: LoginType, cookie: impl Into<String>, qr_timeout: Duration) -> Self {
        Self {
            login_type,
            cookie: cookie.into(),
            qr_timeout,
            poll_interval: Duration::from_secs(1),
            home_url: WEB_BASE.to_string(),
        }
    }

    /// Run the configured flow against the live page
    pub async fn login(&self, page: &SharedPage, cancel: &CancelToken) -> Result<(), CrawlerError> {
        match self.login_type {
            LoginType::Cookie => self.cookie_login(page).await,
            LoginType::Qrcode => self.qrcode_login(page, cancel).await,
        }
    }

    async fn cookie_login(&self, page: &SharedPage) -> Result<(), CrawlerError> {
        let cookies: Vec<BrowserCookie> = parse_cookie_string(&self.cookie)
            .into_iter()
            .map(|(name, value)| BrowserCookie::new(name, value, COOKIE_DOMAIN))
            .collect();
        if cookies.is_empty() {
            return Err(CrawlerError::LoginFailed(
                "cookie login selected but no cookies configured".into(),
            ));
        }
        if !cookies.iter().any(|c| c.name == SESSION_COOKIE) {
            warn!("Configured cookies carry no {SESSION_COOKIE}, login will likely fail");
        }

        info!(count = cookies.len(), "Injecting configured cookies");
        page.add_cookies(&cookies).await?;
        page.goto(&self.home_url).await?;
        Ok(())
    }

    async fn qrcode_login(&self, page: &SharedPage, cancel: &CancelToken) -> Result<(), CrawlerError> {
        let initial = session_cookie(page).await?;
        info!(
            timeout_secs = self.qr_timeout.as_secs(),
            "Waiting for the QR code to be scanned in the browser window"
        );

        let deadline = Instant::now() + self.qr_timeout;
        while Instant::now() < deadline {
            cancel
                .sleep(self.poll_interval)
                .await
                .map_err(|_| CrawlerError::Cancelled)?;

            let current = session_cookie(page).await?;
            debug!(has_session = current.is_some(), "Polled session cookie");
            if current.is_some() && current != initial {
                info!("QR login completed");
                return Ok(());
            }
        }

        Err(CrawlerError::LoginFailed(format!(
            "QR code was not scanned within {}s",
            self.qr_timeout.as_secs()
        )))
    }
}

async fn session_cookie(page: &SharedPage) -> Result<Option<String>, CrawlerError> {
    Ok(page
        .cookies(COOKIE_DOMAIN)
        .await?
        .into_iter()
        .find(|c| c.name == SESSION_COOKIE)
        .map(|c| c.value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::ScriptedPage;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_cookie_login_injects_on_domain() {
        let inner = Arc::new(ScriptedPage::default());
        let page = SharedPage::new(inner.clone());
        let flow = LoginFlow::new(LoginType::Cookie, "a1=x; web_session=s1", Duration::from_secs(1));

        flow.login(&page, &CancelToken::never()).await.unwrap();

        let jar = inner.cookie_jar();
        assert_eq!(jar.len(), 2);
        assert!(jar.iter().all(|c| c.domain == COOKIE_DOMAIN));
        assert_eq!(inner.visited(), vec![WEB_BASE.to_string()]);
    }

    #[tokio::test]
    async fn test_cookie_login_without_cookies_fails() {
        let page = SharedPage::new(Arc::new(ScriptedPage::default()));
        let flow = LoginFlow::new(LoginType::Cookie, "  ", Duration::from_secs(1));

        let err = flow.login(&page, &CancelToken::never()).await.unwrap_err();
        assert!(matches!(err, CrawlerError::LoginFailed(_)));
    }

    #[tokio::test]
    async fn test_qr_login_detects_new_session() {
        let inner = Arc::new(ScriptedPage::default());
        let page = SharedPage::new(inner.clone());
        let mut flow = LoginFlow::new(LoginType::Qrcode, "", Duration::from_secs(5));
        flow.poll_interval = Duration::from_millis(10);

        let scanner = {
            let inner = inner.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                inner.set_cookie(BrowserCookie::new(SESSION_COOKIE, "fresh", COOKIE_DOMAIN));
            })
        };

        flow.login(&page, &CancelToken::never()).await.unwrap();
        scanner.await.unwrap();
    }

    #[tokio::test]
    async fn test_qr_login_times_out() {
        let page = SharedPage::new(Arc::new(ScriptedPage::default()));
        let mut flow = LoginFlow::new(LoginType::Qrcode, "", Duration::from_millis(50));
        flow.poll_interval = Duration::from_millis(10);

        let err = flow.login(&page, &CancelToken::never()).await.unwrap_err();
        assert!(matches!(err, CrawlerError::LoginFailed(_)));
    }
}
