//! Signed HTTP client
//!
//! Every API call is signed through the page's oracle, sent with the
//! browser-mimicking static headers and the current session cookies, and
//! classified into the [`FetchError`] taxonomy. Only transport failures are
//! retried. Once the platform reports the IP as blocked the client refuses
//! all further requests.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use async_trait::async_trait;

use super::api::{
    PlatformApi, API_BASE, COMMENT_PAGE_URI, FEED_URI, IMAGE_FORMATS, PONG_KEYWORD,
    SEARCH_NOTES_URI, SUB_COMMENT_PAGE_URI, USER_POSTED_URI, WEB_BASE,
};
use super::comment::CommentPage;
use super::creator::CreatorNotesPage;
use super::headers::{
    build_api_headers, build_page_headers, insert_cookie, random_user_agent, signature_header_map,
};
use super::html::{creator_from_state, extract_initial_state, note_card_from_state};
use super::note::{FeedResponse, NoteCard};
use super::search::{SearchPage, SearchRequest, SEARCH_PAGE_SIZE};
use super::session::SessionState;
use crate::config::Config;
use crate::models::{Creator, CreatorUrlInfo, SearchNoteType, SearchSortType};
use crate::sign::{QueryParams, RequestData, Signer};
use crate::utils::cancel::CancelToken;
use crate::utils::error::FetchError;
use crate::utils::retry::{with_retry_if, RetryConfig, RetryError};
use crate::utils::{generate_search_id, truncate_text};

/// Platform codes meaning the client IP has been flagged
pub const IP_BLOCKED_CODES: [i64; 2] = [300012, 50011];

/// Platform codes meaning the session is not logged in
pub const LOGIN_REQUIRED_CODES: [i64; 2] = [-100, -101];

/// HTTP statuses used for captcha challenges
pub const CAPTCHA_STATUSES: [u16; 2] = [461, 471];

const VERIFY_TYPE_HEADER: &str = "verifytype";
const VERIFY_UUID_HEADER: &str = "verifyuuid";

// ============================================================================
// Options
// ============================================================================

/// Transport settings of a [`SignedClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub api_base: String,
    pub web_base: String,
    pub timeout: Duration,
    pub requests_per_second: u32,
    pub retry: RetryConfig,
    /// Fixed user agent; a random one from the pool when `None`
    pub user_agent: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_base: API_BASE.to_string(),
            web_base: WEB_BASE.to_string(),
            timeout: Duration::from_secs(10),
            requests_per_second: 2,
            retry: RetryConfig::new(3),
            user_agent: None,
        }
    }
}

impl ClientOptions {
    /// Transport settings from the crawl configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.request_timeout(),
            requests_per_second: config.crawler.rate_limit,
            retry: RetryConfig::new(config.crawler.max_retries),
            user_agent: config.browser.user_agent.clone(),
            ..Self::default()
        }
    }

    /// Point both hosts at `base_url` (mock servers)
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.api_base = base.to_string();
        self.web_base = base.to_string();
        self
    }
}

// ============================================================================
// Response Classification
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default, alias = "message")]
    msg: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

/// Map one API response onto its `data` or the matching error
pub fn classify_response(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> Result<Value, FetchError> {
    let code = status.as_u16();

    if CAPTCHA_STATUSES.contains(&code) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        return Err(FetchError::CaptchaRequired {
            status: code,
            verify_type: header(VERIFY_TYPE_HEADER),
            verify_uuid: header(VERIFY_UUID_HEADER),
        });
    }

    let envelope = match serde_json::from_str::<Envelope>(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            if status == StatusCode::UNAUTHORIZED {
                return Err(FetchError::LoginRequired(format!("HTTP {code}")));
            }
            if !status.is_success() {
                return Err(FetchError::Api {
                    status: code,
                    code: None,
                    message: truncate_text(body, 200),
                });
            }
            return Err(FetchError::Decode(format!("response envelope: {e}")));
        }
    };

    if envelope.success && status.is_success() {
        return Ok(envelope.data.unwrap_or(Value::Null));
    }

    let message = envelope.msg.unwrap_or_default();
    match envelope.code {
        Some(c) if IP_BLOCKED_CODES.contains(&c) => Err(FetchError::IpBlocked { code: c }),
        Some(c) if LOGIN_REQUIRED_CODES.contains(&c) => Err(FetchError::LoginRequired(message)),
        _ if status == StatusCode::UNAUTHORIZED => Err(FetchError::LoginRequired(message)),
        api_code => Err(FetchError::Api {
            status: code,
            code: api_code,
            message,
        }),
    }
}

fn transport_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(e)
    }
}

fn decode_data<T: DeserializeOwned + Default>(data: Value, what: &str) -> Result<T, FetchError> {
    if data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(data).map_err(|e| FetchError::Decode(format!("{what}: {e}")))
}

// ============================================================================
// Client
// ============================================================================

/// Signs, sends and classifies platform requests
pub struct SignedClient {
    http: Client,
    signer: Signer,
    session: Arc<SessionState>,
    api_headers: HeaderMap,
    page_headers: HeaderMap,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    retry: RetryConfig,
    api_base: String,
    web_base: String,
    /// Code of the IP block, 0 while not blocked
    blocked_code: AtomicI64,
    cancel: CancelToken,
}

impl SignedClient {
    /// Create a client bound to `session`
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Transport` if the HTTP client cannot be created
    pub fn new(
        signer: Signer,
        session: Arc<SessionState>,
        options: ClientOptions,
        cancel: CancelToken,
    ) -> Result<Self, FetchError> {
        let http = Client::builder().timeout(options.timeout).gzip(true).build()?;

        let user_agent = options
            .user_agent
            .clone()
            .unwrap_or_else(|| random_user_agent().to_string());
        info!(user_agent = %user_agent, api_base = %options.api_base, "Signed client ready");

        let rate = NonZeroU32::new(options.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http,
            signer,
            session,
            api_headers: build_api_headers(&user_agent),
            page_headers: build_page_headers(&user_agent),
            rate_limiter: RateLimiter::direct(Quota::per_second(rate)),
            retry: options.retry,
            api_base: options.api_base,
            web_base: options.web_base,
            blocked_code: AtomicI64::new(0),
            cancel,
        })
    }

    /// Whether the platform has blocked this client's IP
    pub fn is_blocked(&self) -> bool {
        self.blocked_code.load(Ordering::SeqCst) != 0
    }

    fn check_blocked(&self) -> Result<(), FetchError> {
        match self.blocked_code.load(Ordering::SeqCst) {
            0 => Ok(()),
            code => Err(FetchError::IpBlocked { code }),
        }
    }

    /// Retry transport failures, record IP blocks
    async fn with_policy<T, F, Fut>(&self, operation: F) -> Result<T, FetchError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, FetchError>>,
    {
        self.check_blocked()?;

        match with_retry_if(&self.retry, &self.cancel, operation, FetchError::is_retryable).await {
            Ok(value) => Ok(value),
            Err(RetryError::Cancelled) => Err(FetchError::Cancelled),
            Err(RetryError::Failed(e)) => {
                if let FetchError::IpBlocked { code } = e {
                    error!(code, "IP blocked by platform, refusing further requests");
                    self.blocked_code.store(code, Ordering::SeqCst);
                }
                Err(e)
            }
        }
    }

    /// Sign and send one API request, returning its `data`
    pub async fn request(&self, uri: &str, data: RequestData) -> Result<Value, FetchError> {
        self.with_policy(|| self.send_signed(uri, &data)).await
    }

    async fn send_signed(&self, uri: &str, data: &RequestData) -> Result<Value, FetchError> {
        self.rate_limiter.until_ready().await;

        let snapshot = self.session.snapshot().await;
        let signature = self.signer.sign(uri, data, &snapshot.sign_context).await?;

        let mut headers = self.api_headers.clone();
        headers.extend(signature_header_map(&signature));
        insert_cookie(&mut headers, &snapshot.cookie_header);

        let (method, url, body) = match data {
            RequestData::Query(params) if !params.is_empty() => (
                Method::GET,
                format!("{}{uri}?{}", self.api_base, params.to_query_string()),
                None,
            ),
            RequestData::Json(value) => (
                Method::POST,
                format!("{}{uri}", self.api_base),
                Some(serde_json::to_string(value).map_err(|e| FetchError::Decode(e.to_string()))?),
            ),
            RequestData::Text(text) => (
                Method::POST,
                format!("{}{uri}", self.api_base),
                Some(text.clone()),
            ),
            _ => (Method::GET, format!("{}{uri}", self.api_base), None),
        };

        debug!(method = %method, uri, "Sending signed request");
        let mut request = self.http.request(method, &url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let response_headers = response.headers().clone();
        let text = response.text().await.map_err(transport_error)?;

        classify_response(status, &response_headers, &text)
    }

    /// Fetch a web page with the session cookies
    pub async fn get_page(&self, path_and_query: &str) -> Result<String, FetchError> {
        let url = format!("{}{path_and_query}", self.web_base);
        self.with_policy(|| self.send_page(&url)).await
    }

    async fn send_page(&self, url: &str) -> Result<String, FetchError> {
        self.rate_limiter.until_ready().await;

        let snapshot = self.session.snapshot().await;
        let mut headers = self.page_headers.clone();
        insert_cookie(&mut headers, &snapshot.cookie_header);

        debug!(url, "Fetching page");
        let response = self
            .http
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if CAPTCHA_STATUSES.contains(&status.as_u16()) {
            return classify_response(status, response.headers(), "").map(|_| String::new());
        }
        if !status.is_success() {
            return Err(FetchError::Api {
                status: status.as_u16(),
                code: None,
                message: format!("page fetch failed: {url}"),
            });
        }
        response.text().await.map_err(transport_error)
    }
}

fn xsec_query(xsec_token: &str, xsec_source: &str) -> String {
    let mut params = QueryParams::new();
    if !xsec_token.is_empty() {
        params = params.with("xsec_token", xsec_token);
    }
    if !xsec_source.is_empty() {
        params = params.with("xsec_source", xsec_source);
    }
    if params.is_empty() {
        String::new()
    } else {
        format!("?{}", params.to_query_string())
    }
}

#[async_trait]
impl PlatformApi for SignedClient {
    async fn pong(&self) -> Result<bool, FetchError> {
        let request = SearchRequest {
            keyword: PONG_KEYWORD.to_string(),
            page: 1,
            page_size: SEARCH_PAGE_SIZE,
            search_id: generate_search_id(),
            sort: SearchSortType::General,
            note_type: SearchNoteType::All,
        };

        match self.search_notes(&request).await {
            Ok(page) => {
                debug!(items = page.items.len(), "Pong succeeded");
                Ok(true)
            }
            Err(FetchError::LoginRequired(message)) => {
                info!(message = %message, "Session is not logged in");
                Ok(false)
            }
            Err(FetchError::Sign(e)) => {
                warn!(error = %e, "Signing failed during pong");
                Ok(false)
            }
            Err(e @ (FetchError::Api { .. } | FetchError::Decode(_))) => {
                warn!(error = %e, "Pong answered without an auth failure, treating session as alive");
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    async fn search_notes(&self, request: &SearchRequest) -> Result<SearchPage, FetchError> {
        let data = self
            .request(SEARCH_NOTES_URI, RequestData::Json(request.to_body()))
            .await?;
        decode_data(data, "search page")
    }

    async fn note_detail(
        &self,
        note_id: &str,
        xsec_source: &str,
        xsec_token: &str,
    ) -> Result<Option<NoteCard>, FetchError> {
        let body = json!({
            "source_note_id": note_id,
            "image_formats": IMAGE_FORMATS,
            "extra": {"need_body_topic": 1},
            "xsec_source": xsec_source,
            "xsec_token": xsec_token,
        });
        let data = self.request(FEED_URI, RequestData::Json(body)).await?;
        let feed: FeedResponse = decode_data(data, "feed")?;
        Ok(feed.into_first_card())
    }

    async fn note_detail_from_html(
        &self,
        note_id: &str,
        xsec_source: &str,
        xsec_token: &str,
    ) -> Result<Option<NoteCard>, FetchError> {
        let path = format!("/explore/{note_id}{}", xsec_query(xsec_token, xsec_source));
        let html = self.get_page(&path).await?;
        match extract_initial_state(&html)? {
            Some(state) => note_card_from_state(&state, note_id),
            None => Ok(None),
        }
    }

    async fn comments_page(
        &self,
        note_id: &str,
        xsec_token: &str,
        cursor: &str,
    ) -> Result<CommentPage, FetchError> {
        let params = QueryParams::new()
            .with("note_id", note_id)
            .with("cursor", cursor)
            .with("top_comment_id", "")
            .with_list("image_formats", &IMAGE_FORMATS)
            .with("xsec_token", xsec_token);
        let data = self.request(COMMENT_PAGE_URI, RequestData::Query(params)).await?;
        decode_data(data, "comment page")
    }

    async fn sub_comments_page(
        &self,
        note_id: &str,
        root_comment_id: &str,
        xsec_token: &str,
        cursor: &str,
        num: usize,
    ) -> Result<CommentPage, FetchError> {
        let params = QueryParams::new()
            .with("note_id", note_id)
            .with("root_comment_id", root_comment_id)
            .with("num", num)
            .with("cursor", cursor)
            .with_list("image_formats", &IMAGE_FORMATS)
            .with("top_comment_id", "")
            .with("xsec_token", xsec_token);
        let data = self
            .request(SUB_COMMENT_PAGE_URI, RequestData::Query(params))
            .await?;
        decode_data(data, "sub comment page")
    }

    async fn creator_info(&self, creator: &CreatorUrlInfo) -> Result<Option<Creator>, FetchError> {
        let path = format!(
            "/user/profile/{}{}",
            creator.user_id,
            xsec_query(&creator.xsec_token, &creator.xsec_source)
        );
        let html = self.get_page(&path).await?;
        match extract_initial_state(&html)? {
            Some(state) => creator_from_state(&state, &creator.user_id),
            None => Ok(None),
        }
    }

    async fn creator_notes_page(
        &self,
        creator: &CreatorUrlInfo,
        cursor: &str,
        num: usize,
    ) -> Result<CreatorNotesPage, FetchError> {
        let params = QueryParams::new()
            .with("num", num)
            .with("cursor", cursor)
            .with("user_id", &creator.user_id)
            .with_list("image_formats", &IMAGE_FORMATS)
            .with("xsec_token", &creator.xsec_token)
            .with("xsec_source", &creator.xsec_source);
        let data = self.request(USER_POSTED_URI, RequestData::Query(params)).await?;
        decode_data(data, "creator notes")
    }
}
