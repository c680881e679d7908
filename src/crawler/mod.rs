//! Crawl orchestration
//!
//! [`Crawler`] drives one run: open the platform in the browser, harvest the
//! session, make sure it is logged in, then walk keywords, note URLs or
//! creators. Detail fetches are sequential; only comment collection fans out.
//! Per-note and per-keyword failures are logged and skipped; session-fatal
//! errors end the run.

pub mod api;
pub mod client;
pub mod comment;
pub mod creator;
pub mod fanout;
pub mod headers;
pub mod html;
pub mod login;
pub mod note;
pub mod search;
pub mod session;
pub mod url;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::browser::{BrowserPage, SharedPage};
use crate::config::{Config, CrawlerConfig};
use crate::models::{CrawlBudget, CrawlStats, CrawlerType, LoginType, Note, SearchNoteType, SearchSortType};
use crate::sign::Signer;
use crate::storage::Store;
use crate::utils::cancel::CancelToken;
use crate::utils::error::{CrawlerError, FetchError};

use api::{PlatformApi, WEB_BASE};
use client::{ClientOptions, SignedClient};
use creator::collect_creator_notes;
use fanout::{fetch_comments_batch, FanoutOptions};
use login::{LoginFlow, COOKIE_DOMAIN};
use note::NoteRef;
use search::SearchTraversal;
use session::SessionState;
use url::{parse_creator_info_from_url, parse_note_info_from_note_url};

/// Errors that end the run rather than the current item
fn is_fatal(e: &FetchError) -> bool {
    e.is_session_fatal() || matches!(e, FetchError::Cancelled)
}

fn into_crawler_error(e: FetchError) -> CrawlerError {
    match e {
        FetchError::Cancelled => CrawlerError::Cancelled,
        other => CrawlerError::Fetch(other),
    }
}

/// Re-read cookies and `b1` from the page into the shared session
pub async fn refresh_session(page: &SharedPage, session: &SessionState) -> Result<(), CrawlerError> {
    let cookies = page.cookies(COOKIE_DOMAIN).await?;
    let b1 = page.read_b1().await?;
    session.refresh(&cookies, b1).await;
    Ok(())
}

/// One crawl run
pub struct Crawler {
    mode: CrawlerType,
    settings: CrawlerConfig,
    sort: SearchSortType,
    note_type: SearchNoteType,
    budget: CrawlBudget,
    login: LoginFlow,
    page: SharedPage,
    session: Arc<SessionState>,
    api: Arc<dyn PlatformApi>,
    store: Arc<dyn Store>,
    cancel: CancelToken,
}

impl Crawler {
    /// Open the platform home, harvest the session and build the signed client
    pub async fn start(
        config: &Config,
        browser: Arc<dyn BrowserPage>,
        store: Arc<dyn Store>,
        cancel: CancelToken,
    ) -> Result<Self, CrawlerError> {
        let mode = parse_mode(config)?;
        let page = SharedPage::new(browser);

        info!(mode = %mode, "Opening platform home");
        cancel
            .run(page.goto(WEB_BASE))
            .await
            .map_err(|_| CrawlerError::Cancelled)??;

        let session = Arc::new(SessionState::default());
        refresh_session(&page, &session).await?;

        let signer = Signer::new(Arc::new(page.clone()));
        let client = SignedClient::new(
            signer,
            Arc::clone(&session),
            ClientOptions::from_config(config),
            cancel.clone(),
        )?;

        Self::with_api(config, page, session, Arc::new(client), store, cancel)
    }

    /// Assemble a crawler around an existing API implementation
    pub fn with_api(
        config: &Config,
        page: SharedPage,
        session: Arc<SessionState>,
        api: Arc<dyn PlatformApi>,
        store: Arc<dyn Store>,
        cancel: CancelToken,
    ) -> Result<Self, CrawlerError> {
        let mode = parse_mode(config)?;
        let login_type = config
            .login_type()
            .map_err(|e| CrawlerError::LoginFailed(e.to_string()))?;

        Ok(Self {
            mode,
            settings: config.crawler.clone(),
            sort: config.sort_type().unwrap_or(SearchSortType::General),
            note_type: config.note_type().unwrap_or(SearchNoteType::All),
            budget: config.budget(),
            login: LoginFlow::new(login_type, config.browser.cookies.clone(), config.qr_timeout()),
            page,
            session,
            api,
            store,
            cancel,
        })
    }

    /// Run to completion and release the browser and store
    pub async fn run(&self) -> Result<CrawlStats, CrawlerError> {
        let mut stats = CrawlStats::default();
        let result = self.run_phases(&mut stats).await;
        self.close().await;

        info!(
            notes_saved = stats.notes_saved,
            notes_failed = stats.notes_failed,
            comments_saved = stats.comments_saved,
            creators_saved = stats.creators_saved,
            keywords_completed = stats.keywords_completed,
            keywords_aborted = stats.keywords_aborted,
            "Crawl finished"
        );

        match result {
            Ok(()) => Ok(stats),
            Err(e) => {
                error!(error = %e, "Crawl aborted");
                Err(e)
            }
        }
    }

    async fn run_phases(&self, stats: &mut CrawlStats) -> Result<(), CrawlerError> {
        self.ensure_login().await?;

        match self.mode {
            CrawlerType::Search => self.crawl_search(stats).await,
            CrawlerType::Detail => self.crawl_detail(stats).await,
            CrawlerType::Creator => self.crawl_creators(stats).await,
        }
    }

    // ========================================================================
    // Login
    // ========================================================================

    /// Make sure the session is logged in, logging in once if it is not
    pub async fn ensure_login(&self) -> Result<(), CrawlerError> {
        if self.api.pong().await.map_err(into_crawler_error)? {
            info!("Session is logged in");
            return Ok(());
        }

        info!(login_type = ?self.login.login_type, "Session not logged in, starting login");
        self.login.login(&self.page, &self.cancel).await?;
        refresh_session(&self.page, &self.session).await?;

        if self.api.pong().await.map_err(into_crawler_error)? {
            info!("Login succeeded");
            Ok(())
        } else {
            Err(CrawlerError::LoginFailed(
                "session still not logged in after login".into(),
            ))
        }
    }

    // ========================================================================
    // Modes
    // ========================================================================

    async fn crawl_search(&self, stats: &mut CrawlStats) -> Result<(), CrawlerError> {
        let traversal = SearchTraversal::new(self.api.as_ref(), &self.cancel, self.budget.max_notes)
            .start_page(self.settings.start_page)
            .sort(self.sort, self.note_type)
            .pause(self.budget.min_sleep, self.budget.max_sleep);

        for (i, keyword) in self.settings.keywords.iter().enumerate() {
            if i > 0 {
                self.pause().await?;
            }
            info!(keyword = %keyword, "Crawling keyword");

            let outcome = traversal.run(keyword).await;
            match outcome.error {
                Some(e) if is_fatal(&e) => return Err(into_crawler_error(e)),
                Some(e) => {
                    warn!(keyword = %keyword, error = %e, "Keyword aborted");
                    stats.keywords_aborted += 1;
                }
                None => stats.keywords_completed += 1,
            }

            self.process_notes(&outcome.notes, stats).await?;
        }
        Ok(())
    }

    async fn crawl_detail(&self, stats: &mut CrawlStats) -> Result<(), CrawlerError> {
        let refs: Vec<NoteRef> = self
            .settings
            .note_urls
            .iter()
            .filter_map(|raw| match parse_note_info_from_note_url(raw) {
                Ok(info) => Some(NoteRef::from(info)),
                Err(e) => {
                    warn!(url = %raw, error = %e, "Skipping note URL");
                    stats.notes_failed += 1;
                    None
                }
            })
            .collect();

        info!(notes = refs.len(), "Crawling note URLs");
        self.process_notes(&refs, stats).await
    }

    async fn crawl_creators(&self, stats: &mut CrawlStats) -> Result<(), CrawlerError> {
        for (i, raw) in self.settings.creator_urls.iter().enumerate() {
            if i > 0 {
                self.pause().await?;
            }
            let creator = match parse_creator_info_from_url(raw) {
                Ok(creator) => creator,
                Err(e) => {
                    warn!(url = %raw, error = %e, "Skipping creator URL");
                    continue;
                }
            };
            info!(user_id = %creator.user_id, "Crawling creator");

            match self.api.creator_info(&creator).await {
                Ok(Some(profile)) => match self.store.save_creator(&profile).await {
                    Ok(()) => stats.creators_saved += 1,
                    Err(e) => warn!(user_id = %creator.user_id, error = %e, "Failed to save creator"),
                },
                Ok(None) => warn!(user_id = %creator.user_id, "Creator profile not found"),
                Err(e) if is_fatal(&e) => return Err(into_crawler_error(e)),
                Err(e) => warn!(user_id = %creator.user_id, error = %e, "Creator profile failed"),
            }

            let outcome = collect_creator_notes(
                self.api.as_ref(),
                &creator,
                self.budget.max_notes,
                &self.cancel,
                (self.budget.min_sleep, self.budget.max_sleep),
            )
            .await;
            match outcome.error {
                Some(e) if is_fatal(&e) => return Err(into_crawler_error(e)),
                Some(e) => warn!(user_id = %creator.user_id, error = %e, "Creator listing cut short"),
                None => {}
            }

            self.process_notes(&outcome.notes, stats).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Notes and Comments
    // ========================================================================

    /// Fetch and persist details, then comments for the notes that made it
    async fn process_notes(&self, refs: &[NoteRef], stats: &mut CrawlStats) -> Result<(), CrawlerError> {
        let saved = self.fetch_details(refs, stats).await?;

        if self.settings.enable_comments && !saved.is_empty() {
            let options = FanoutOptions {
                max_concurrency: self.budget.max_concurrency,
                max_comments_per_note: self.budget.max_comments_per_note,
                fetch_sub_comments: self.settings.enable_sub_comments,
                min_pause: self.budget.min_sleep,
                max_pause: self.budget.max_sleep,
            };
            let mut report = fetch_comments_batch(
                self.api.as_ref(),
                self.store.as_ref(),
                &saved,
                &options,
                &self.cancel,
            )
            .await;
            stats.comments_saved += report.comments_saved();

            if let Some(e) = report.take_fatal() {
                return Err(into_crawler_error(e));
            }
        }
        Ok(())
    }

    async fn fetch_details(&self, refs: &[NoteRef], stats: &mut CrawlStats) -> Result<Vec<NoteRef>, CrawlerError> {
        let mut saved = Vec::with_capacity(refs.len());

        for (i, note_ref) in refs.iter().enumerate() {
            if i > 0 {
                self.pause().await?;
            }

            match self.note_detail(note_ref).await {
                Ok(Some(note)) => match self.store.save_note(&note).await {
                    Ok(()) => {
                        debug!(note_id = %note.note_id, title = %note.title, "Note saved");
                        stats.notes_saved += 1;
                        saved.push(NoteRef {
                            xsec_token: note.xsec_token.clone(),
                            ..note_ref.clone()
                        });
                    }
                    Err(e) => {
                        warn!(note_id = %note_ref.note_id, error = %e, "Failed to save note");
                        stats.notes_failed += 1;
                    }
                },
                Ok(None) => {
                    warn!(note_id = %note_ref.note_id, "Note unavailable");
                    stats.notes_failed += 1;
                }
                Err(e) if is_fatal(&e) => return Err(into_crawler_error(e)),
                Err(FetchError::Sign(e)) => {
                    warn!(note_id = %note_ref.note_id, error = %e, "Signing failed, re-checking session");
                    stats.notes_failed += 1;
                    self.ensure_login().await?;
                }
                Err(e) => {
                    warn!(note_id = %note_ref.note_id, error = %e, "Note detail failed");
                    stats.notes_failed += 1;
                }
            }
        }
        Ok(saved)
    }

    /// Detail through the API, falling back to the note's web page
    async fn note_detail(&self, note_ref: &NoteRef) -> Result<Option<Note>, FetchError> {
        let NoteRef {
            note_id,
            xsec_token,
            xsec_source,
            source_keyword,
        } = note_ref;

        let card = match self.api.note_detail(note_id, xsec_source, xsec_token).await {
            Ok(card) => card,
            Err(e) if is_fatal(&e) || matches!(e, FetchError::Sign(_)) => return Err(e),
            Err(e) => {
                warn!(note_id = %note_id, error = %e, "Feed API failed, trying the web page");
                None
            }
        };

        let card = match card {
            Some(card) => Some(card),
            None => {
                debug!(note_id = %note_id, "Fetching note from its web page");
                self.api
                    .note_detail_from_html(note_id, xsec_source, xsec_token)
                    .await?
            }
        };

        Ok(card.map(|c| c.into_note(xsec_token, xsec_source, source_keyword)))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn pause(&self) -> Result<(), CrawlerError> {
        self.cancel
            .sleep(self.budget.pause())
            .await
            .map_err(|_| CrawlerError::Cancelled)
    }

    async fn close(&self) {
        if let Err(e) = self.store.close().await {
            warn!(error = %e, "Failed to close store");
        }
        if let Err(e) = self.page.close().await {
            warn!(error = %e, "Failed to close browser");
        }
    }

    pub fn mode(&self) -> CrawlerType {
        self.mode
    }

    pub fn login_type(&self) -> LoginType {
        self.login.login_type
    }
}

fn parse_mode(config: &Config) -> Result<CrawlerType, CrawlerError> {
    config
        .crawler
        .crawler_type
        .parse()
        .map_err(CrawlerError::UnsupportedMode)
}
