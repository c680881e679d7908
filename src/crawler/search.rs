//! Keyword search traversal
//!
//! One keyword is walked page by page with a single search id generated at
//! the start of the traversal. Pages below the configured start page are
//! skipped without a request; traversal stops when the server reports no
//! more results, the note budget is filled, or a page fails.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::api::{PlatformApi, DEFAULT_XSEC_SOURCE};
use super::note::{de_or_default, de_string, NoteCard, NoteRef};
use crate::models::{SearchNoteType, SearchSortType};
use crate::utils::cancel::CancelToken;
use crate::utils::error::FetchError;
use crate::utils::{generate_search_id, random_duration};

/// Results per search page
pub const SEARCH_PAGE_SIZE: u32 = 20;

// ============================================================================
// Wire Structures
// ============================================================================

/// Body of a search call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    pub keyword: String,
    pub page: u32,
    pub page_size: u32,
    pub search_id: String,
    pub sort: SearchSortType,
    pub note_type: SearchNoteType,
}

impl SearchRequest {
    /// JSON body in the field order the web client sends
    pub fn to_body(&self) -> Value {
        json!({
            "keyword": self.keyword,
            "page": self.page,
            "page_size": self.page_size,
            "search_id": self.search_id,
            "sort": self.sort.as_str(),
            "note_type": self.note_type.code(),
        })
    }
}

/// `data` of a search call
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchPage {
    #[serde(default, deserialize_with = "de_or_default")]
    pub has_more: bool,

    #[serde(default, deserialize_with = "de_or_default")]
    pub items: Vec<SearchItem>,
}

/// One search hit; only `model_type == "note"` items are notes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchItem {
    #[serde(default, deserialize_with = "de_string")]
    pub id: String,

    #[serde(default, deserialize_with = "de_string")]
    pub model_type: String,

    #[serde(default, deserialize_with = "de_string")]
    pub xsec_token: String,

    #[serde(default, deserialize_with = "de_string")]
    pub xsec_source: String,

    #[serde(default)]
    pub note_card: Option<NoteCard>,
}

impl SearchItem {
    /// Whether this hit is a note (not a query suggestion or ad block)
    pub fn is_note(&self) -> bool {
        !self.id.is_empty()
            && (self.model_type == "note" || (self.model_type.is_empty() && self.note_card.is_some()))
    }

    fn into_note_ref(self, keyword: &str) -> NoteRef {
        let xsec_source = if self.xsec_source.is_empty() {
            DEFAULT_XSEC_SOURCE.to_string()
        } else {
            self.xsec_source
        };
        NoteRef {
            note_id: self.id,
            xsec_token: self.xsec_token,
            xsec_source,
            source_keyword: keyword.to_string(),
        }
    }
}

// ============================================================================
// Pagination Cursor
// ============================================================================

/// Where the next request of a traversal starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorPosition {
    /// 1-based page number
    Page(u32),
    /// Opaque server cursor, empty for the first page
    Token(String),
}

/// Position, has-more flag and search id of one traversal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationCursor {
    position: CursorPosition,
    has_more: bool,
    search_id: String,
}

impl PaginationCursor {
    /// Page-numbered traversal starting at page 1
    pub fn pages(search_id: impl Into<String>) -> Self {
        Self {
            position: CursorPosition::Page(1),
            has_more: true,
            search_id: search_id.into(),
        }
    }

    /// Cursor traversal starting from the first page
    pub fn tokens() -> Self {
        Self::resume(String::new())
    }

    /// Cursor traversal resuming at `cursor`
    pub fn resume(cursor: impl Into<String>) -> Self {
        Self {
            position: CursorPosition::Token(cursor.into()),
            has_more: true,
            search_id: String::new(),
        }
    }

    pub fn position(&self) -> &CursorPosition {
        &self.position
    }

    /// Current page number (page traversals only)
    pub fn page(&self) -> Option<u32> {
        match self.position {
            CursorPosition::Page(p) => Some(p),
            CursorPosition::Token(_) => None,
        }
    }

    /// Current cursor (cursor traversals only)
    pub fn token(&self) -> Option<&str> {
        match &self.position {
            CursorPosition::Token(t) => Some(t),
            CursorPosition::Page(_) => None,
        }
    }

    pub fn search_id(&self) -> &str {
        &self.search_id
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Move past a page without fetching it
    pub fn skip_page(&mut self) {
        if let CursorPosition::Page(p) = &mut self.position {
            *p += 1;
        }
    }

    /// Record a fetched page
    pub fn advance_page(&mut self, has_more: bool) {
        self.skip_page();
        self.has_more = has_more;
    }

    /// Record a fetched cursor page
    ///
    /// A missing or repeated cursor ends the traversal even when the server
    /// claims there is more.
    pub fn advance_cursor(&mut self, next: impl Into<String>, has_more: bool) {
        let next = next.into();
        let stalled = match &self.position {
            CursorPosition::Token(current) => next.is_empty() || *current == next,
            CursorPosition::Page(_) => true,
        };
        if has_more && stalled {
            debug!(cursor = %next, "Cursor did not advance, ending traversal");
        }
        self.has_more = has_more && !stalled;
        self.position = CursorPosition::Token(next);
    }
}

// ============================================================================
// Traversal
// ============================================================================

/// What one keyword traversal produced
#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub notes: Vec<NoteRef>,
    pub pages_fetched: u32,
    /// Error that aborted the traversal, if any
    pub error: Option<FetchError>,
}

/// Walks search pages for one keyword at a time
pub struct SearchTraversal<'a> {
    api: &'a dyn PlatformApi,
    cancel: &'a CancelToken,
    max_notes: usize,
    start_page: u32,
    sort: SearchSortType,
    note_type: SearchNoteType,
    min_pause: Duration,
    max_pause: Duration,
}

impl<'a> SearchTraversal<'a> {
    pub fn new(api: &'a dyn PlatformApi, cancel: &'a CancelToken, max_notes: usize) -> Self {
        Self {
            api,
            cancel,
            max_notes,
            start_page: 1,
            sort: SearchSortType::General,
            note_type: SearchNoteType::All,
            min_pause: Duration::ZERO,
            max_pause: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn start_page(mut self, start_page: u32) -> Self {
        self.start_page = start_page.max(1);
        self
    }

    #[must_use]
    pub fn sort(mut self, sort: SearchSortType, note_type: SearchNoteType) -> Self {
        self.sort = sort;
        self.note_type = note_type;
        self
    }

    #[must_use]
    pub fn pause(mut self, min: Duration, max: Duration) -> Self {
        self.min_pause = min;
        self.max_pause = max;
        self
    }

    /// Traverse one keyword
    pub async fn run(&self, keyword: &str) -> SearchOutcome {
        let mut cursor = PaginationCursor::pages(generate_search_id());
        let mut outcome = SearchOutcome::default();
        let mut seen = HashSet::new();

        while outcome.notes.len() < self.max_notes {
            let page = cursor.page().unwrap_or(1);
            if page < self.start_page {
                debug!(keyword, page, start_page = self.start_page, "Skipping page");
                cursor.skip_page();
                continue;
            }

            let request = SearchRequest {
                keyword: keyword.to_string(),
                page,
                page_size: SEARCH_PAGE_SIZE,
                search_id: cursor.search_id().to_string(),
                sort: self.sort,
                note_type: self.note_type,
            };

            debug!(keyword, page, search_id = %request.search_id, "Fetching search page");
            let result = match self.cancel.run(self.api.search_notes(&request)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Cancelled),
            };

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    warn!(keyword, page, error = %e, "Search page failed, aborting keyword");
                    outcome.error = Some(e);
                    break;
                }
            };
            outcome.pages_fetched += 1;

            for item in response.items {
                if outcome.notes.len() >= self.max_notes {
                    break;
                }
                if !item.is_note() || !seen.insert(item.id.clone()) {
                    continue;
                }
                outcome.notes.push(item.into_note_ref(keyword));
            }

            cursor.advance_page(response.has_more);
            if !cursor.has_more() {
                debug!(keyword, page, "No more search results");
                break;
            }
            if outcome.notes.len() >= self.max_notes {
                break;
            }

            let pause = random_duration(self.min_pause, self.max_pause);
            if self.cancel.sleep(pause).await.is_err() {
                outcome.error = Some(FetchError::Cancelled);
                break;
            }
        }

        info!(
            keyword,
            notes = outcome.notes.len(),
            pages = outcome.pages_fetched,
            aborted = outcome.error.is_some(),
            "Search traversal finished"
        );
        outcome
    }
}
