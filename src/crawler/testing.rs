//! In-memory [`PlatformApi`] for unit tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::api::PlatformApi;
use super::comment::{CommentPage, RawComment};
use super::creator::{CreatorNoteItem, CreatorNotesPage};
use super::note::NoteCard;
use super::search::{SearchPage, SearchRequest};
use crate::models::{Creator, CreatorUrlInfo};
use crate::utils::error::FetchError;

type Queue<T> = Mutex<VecDeque<Result<T, FetchError>>>;

/// Scripted platform; empty queues answer with empty pages
#[derive(Default)]
pub struct FakeApi {
    pongs: Queue<bool>,
    searches: Queue<SearchPage>,
    search_calls: Mutex<Vec<SearchRequest>>,
    details: Mutex<HashMap<String, Result<Option<NoteCard>, FetchError>>>,
    html_details: Mutex<HashMap<String, Result<Option<NoteCard>, FetchError>>>,
    detail_calls: Mutex<Vec<(String, String)>>,
    comments: Queue<CommentPage>,
    comments_by_note: Mutex<HashMap<String, VecDeque<Result<CommentPage, FetchError>>>>,
    sub_comments: Queue<CommentPage>,
    sub_comment_calls: Mutex<Vec<(String, String)>>,
    creators: Mutex<HashMap<String, Creator>>,
    creator_pages: Queue<CreatorNotesPage>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    pong_calls: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every comment page call by `latency`
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn push_pong(&self, result: Result<bool, FetchError>) {
        self.pongs.lock().unwrap().push_back(result);
    }

    pub fn pong_calls(&self) -> usize {
        self.pong_calls.load(Ordering::SeqCst)
    }

    pub fn push_search(&self, page: SearchPage) {
        self.searches.lock().unwrap().push_back(Ok(page));
    }

    pub fn push_search_error(&self, error: FetchError) {
        self.searches.lock().unwrap().push_back(Err(error));
    }

    pub fn search_calls(&self) -> Vec<SearchRequest> {
        self.search_calls.lock().unwrap().clone()
    }

    pub fn set_detail(&self, note_id: &str, result: Result<Option<NoteCard>, FetchError>) {
        self.details.lock().unwrap().insert(note_id.to_string(), result);
    }

    pub fn set_html_detail(&self, note_id: &str, result: Result<Option<NoteCard>, FetchError>) {
        self.html_details
            .lock()
            .unwrap()
            .insert(note_id.to_string(), result);
    }

    /// `(note_id, "api" | "html")` in call order
    pub fn detail_calls(&self) -> Vec<(String, String)> {
        self.detail_calls.lock().unwrap().clone()
    }

    pub fn push_comments(&self, page: CommentPage) {
        self.comments.lock().unwrap().push_back(Ok(page));
    }

    pub fn push_comments_error(&self, error: FetchError) {
        self.comments.lock().unwrap().push_back(Err(error));
    }

    pub fn push_comments_for(&self, note_id: &str, result: Result<CommentPage, FetchError>) {
        self.comments_by_note
            .lock()
            .unwrap()
            .entry(note_id.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn push_sub_comments(&self, page: CommentPage) {
        self.sub_comments.lock().unwrap().push_back(Ok(page));
    }

    /// `(root_comment_id, cursor)` in call order
    pub fn sub_comment_calls(&self) -> Vec<(String, String)> {
        self.sub_comment_calls.lock().unwrap().clone()
    }

    /// Highest number of overlapping comment page calls
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn set_creator(&self, creator: Creator) {
        self.creators
            .lock()
            .unwrap()
            .insert(creator.user_id.clone(), creator);
    }

    pub fn push_creator_notes(&self, page: CreatorNotesPage) {
        self.creator_pages.lock().unwrap().push_back(Ok(page));
    }
}

fn pop<T: Default>(queue: &Queue<T>) -> Result<T, FetchError> {
    queue.lock().unwrap().pop_front().unwrap_or_else(|| Ok(T::default()))
}

#[async_trait]
impl PlatformApi for FakeApi {
    async fn pong(&self) -> Result<bool, FetchError> {
        self.pong_calls.fetch_add(1, Ordering::SeqCst);
        self.pongs.lock().unwrap().pop_front().unwrap_or(Ok(true))
    }

    async fn search_notes(&self, request: &SearchRequest) -> Result<SearchPage, FetchError> {
        self.search_calls.lock().unwrap().push(request.clone());
        pop(&self.searches)
    }

    async fn note_detail(
        &self,
        note_id: &str,
        _xsec_source: &str,
        _xsec_token: &str,
    ) -> Result<Option<NoteCard>, FetchError> {
        self.detail_calls
            .lock()
            .unwrap()
            .push((note_id.to_string(), "api".to_string()));
        self.details.lock().unwrap().remove(note_id).unwrap_or(Ok(None))
    }

    async fn note_detail_from_html(
        &self,
        note_id: &str,
        _xsec_source: &str,
        _xsec_token: &str,
    ) -> Result<Option<NoteCard>, FetchError> {
        self.detail_calls
            .lock()
            .unwrap()
            .push((note_id.to_string(), "html".to_string()));
        self.html_details
            .lock()
            .unwrap()
            .remove(note_id)
            .unwrap_or(Ok(None))
    }

    async fn comments_page(
        &self,
        note_id: &str,
        _xsec_token: &str,
        _cursor: &str,
    ) -> Result<CommentPage, FetchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self
            .comments_by_note
            .lock()
            .unwrap()
            .get_mut(note_id)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(result) => result,
            None => pop(&self.comments),
        }
    }

    async fn sub_comments_page(
        &self,
        _note_id: &str,
        root_comment_id: &str,
        _xsec_token: &str,
        cursor: &str,
        _num: usize,
    ) -> Result<CommentPage, FetchError> {
        self.sub_comment_calls
            .lock()
            .unwrap()
            .push((root_comment_id.to_string(), cursor.to_string()));
        pop(&self.sub_comments)
    }

    async fn creator_info(&self, creator: &CreatorUrlInfo) -> Result<Option<Creator>, FetchError> {
        Ok(self.creators.lock().unwrap().get(&creator.user_id).cloned())
    }

    async fn creator_notes_page(
        &self,
        _creator: &CreatorUrlInfo,
        _cursor: &str,
        _num: usize,
    ) -> Result<CreatorNotesPage, FetchError> {
        pop(&self.creator_pages)
    }
}

/// Comment with the given id and embedded replies
pub fn raw_comment(id: &str, sub_comments: Vec<RawComment>) -> RawComment {
    RawComment {
        id: id.to_string(),
        content: format!("comment {id}"),
        sub_comment_count: sub_comments.len() as u64,
        sub_comments,
        ..Default::default()
    }
}

pub fn comment_page(comments: Vec<RawComment>, cursor: &str, has_more: bool) -> CommentPage {
    CommentPage {
        comments,
        cursor: cursor.to_string(),
        has_more,
    }
}

/// Search card carrying just enough to become a note
pub fn note_card(note_id: &str, title: &str) -> NoteCard {
    NoteCard {
        note_id: note_id.to_string(),
        title: title.to_string(),
        note_type: "normal".to_string(),
        ..Default::default()
    }
}

pub fn creator_note(note_id: &str) -> CreatorNoteItem {
    CreatorNoteItem {
        note_id: note_id.to_string(),
        xsec_token: format!("tok-{note_id}"),
        ..Default::default()
    }
}
