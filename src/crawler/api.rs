//! Platform API surface
//!
//! [`PlatformApi`] is everything the crawler needs from the platform. The
//! production implementation is [`super::client::SignedClient`]; tests swap in
//! in-memory fakes.

use async_trait::async_trait;

use super::comment::CommentPage;
use super::creator::CreatorNotesPage;
use super::note::NoteCard;
use super::search::{SearchPage, SearchRequest};
use crate::models::{Creator, CreatorUrlInfo};
use crate::utils::error::FetchError;

/// API host
pub const API_BASE: &str = "https://edith.xiaohongshu.com";

/// Web host (HTML pages)
pub const WEB_BASE: &str = "https://www.xiaohongshu.com";

pub const SEARCH_NOTES_URI: &str = "/api/sns/web/v1/search/notes";
pub const FEED_URI: &str = "/api/sns/web/v1/feed";
pub const COMMENT_PAGE_URI: &str = "/api/sns/web/v2/comment/page";
pub const SUB_COMMENT_PAGE_URI: &str = "/api/sns/web/v2/comment/sub/page";
pub const USER_POSTED_URI: &str = "/api/sns/web/v1/user_posted";

/// Image formats requested with every listing
pub const IMAGE_FORMATS: [&str; 3] = ["jpg", "webp", "avif"];

/// Keyword used for the liveness probe
pub const PONG_KEYWORD: &str = "小红书";

/// Default `xsec_source` for notes reached through search
pub const DEFAULT_XSEC_SOURCE: &str = "pc_search";

/// Calls the crawler issues against the platform
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Whether the session is logged in
    ///
    /// Only an explicit login-required answer (or an unusable signing oracle)
    /// yields `false`; an empty result still counts as alive. Session-fatal
    /// errors are returned as errors.
    async fn pong(&self) -> Result<bool, FetchError>;

    /// One page of keyword search results
    async fn search_notes(&self, request: &SearchRequest) -> Result<SearchPage, FetchError>;

    /// Note detail through the feed API
    async fn note_detail(
        &self,
        note_id: &str,
        xsec_source: &str,
        xsec_token: &str,
    ) -> Result<Option<NoteCard>, FetchError>;

    /// Note detail scraped from the note's web page
    async fn note_detail_from_html(
        &self,
        note_id: &str,
        xsec_source: &str,
        xsec_token: &str,
    ) -> Result<Option<NoteCard>, FetchError>;

    /// One page of top-level comments
    async fn comments_page(
        &self,
        note_id: &str,
        xsec_token: &str,
        cursor: &str,
    ) -> Result<CommentPage, FetchError>;

    /// One page of replies under `root_comment_id`
    async fn sub_comments_page(
        &self,
        note_id: &str,
        root_comment_id: &str,
        xsec_token: &str,
        cursor: &str,
        num: usize,
    ) -> Result<CommentPage, FetchError>;

    /// Creator profile scraped from the profile page
    async fn creator_info(&self, creator: &CreatorUrlInfo) -> Result<Option<Creator>, FetchError>;

    /// One page of a creator's notes
    async fn creator_notes_page(
        &self,
        creator: &CreatorUrlInfo,
        cursor: &str,
        num: usize,
    ) -> Result<CreatorNotesPage, FetchError>;
}
