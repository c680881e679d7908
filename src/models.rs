//! Core data models for the crawler
//!
//! Canonical shapes of everything the crawler emits, independent of the
//! several wire formats (search card, feed card, HTML state) they are built
//! from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Crawl Modes
// ============================================================================

/// What the crawler is asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlerType {
    /// Keyword search, then detail and comments for each hit
    Search,
    /// Explicit note URLs
    Detail,
    /// Every note of the given creators
    Creator,
}

impl FromStr for CrawlerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "search" => Ok(Self::Search),
            "detail" => Ok(Self::Detail),
            "creator" => Ok(Self::Creator),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for CrawlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Search => "search",
            Self::Detail => "detail",
            Self::Creator => "creator",
        })
    }
}

/// How the session gets logged in when the stored one is dead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginType {
    /// Inject a configured cookie string
    Cookie,
    /// Wait for a human to scan the QR code in the browser window
    Qrcode,
}

impl FromStr for LoginType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cookie" => Ok(Self::Cookie),
            "qrcode" | "qr" => Ok(Self::Qrcode),
            other => Err(other.to_string()),
        }
    }
}

/// Search result ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchSortType {
    #[serde(rename = "general")]
    General,
    #[serde(rename = "time_descending")]
    Latest,
    #[serde(rename = "popularity_descending")]
    MostLiked,
    #[serde(rename = "comment_descending")]
    MostCommented,
    #[serde(rename = "collect_descending")]
    MostCollected,
}

impl SearchSortType {
    /// Value sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Latest => "time_descending",
            Self::MostLiked => "popularity_descending",
            Self::MostCommented => "comment_descending",
            Self::MostCollected => "collect_descending",
        }
    }
}

impl FromStr for SearchSortType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "general" => Ok(Self::General),
            "time_descending" => Ok(Self::Latest),
            "popularity_descending" => Ok(Self::MostLiked),
            "comment_descending" => Ok(Self::MostCommented),
            "collect_descending" => Ok(Self::MostCollected),
            other => Err(other.to_string()),
        }
    }
}

/// Search result filter by media type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchNoteType {
    All,
    Video,
    Image,
}

impl SearchNoteType {
    /// Value sent on the wire
    pub fn code(&self) -> u8 {
        match self {
            Self::All => 0,
            Self::Video => 1,
            Self::Image => 2,
        }
    }
}

impl FromStr for SearchNoteType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "0" => Ok(Self::All),
            "video" | "1" => Ok(Self::Video),
            "image" | "2" => Ok(Self::Image),
            other => Err(other.to_string()),
        }
    }
}

// ============================================================================
// Notes
// ============================================================================

/// Note author
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub user_id: String,
    pub nickname: String,
    #[serde(default)]
    pub avatar: String,
}

/// Interaction counters of a note
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractCounts {
    pub like: u64,
    pub comment: u64,
    pub collect: u64,
    pub share: u64,
}

/// A crawled note
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub note_id: String,
    pub title: String,
    /// Body text
    pub content: String,
    /// `normal` (image) or `video`
    #[serde(default)]
    pub note_type: String,
    pub author: Author,
    pub counts: InteractCounts,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub ip_location: String,
    #[serde(default)]
    pub publish_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_update_time: Option<DateTime<Utc>>,
    /// Capability token bound to the listing this note came from
    #[serde(default)]
    pub xsec_token: String,
    #[serde(default)]
    pub xsec_source: String,
    /// Keyword that surfaced this note (search mode only)
    #[serde(default)]
    pub source_keyword: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,
}

impl Note {
    /// Public web URL of the note
    pub fn url(&self) -> String {
        format!(
            "https://www.xiaohongshu.com/explore/{}?xsec_token={}&xsec_source={}",
            self.note_id,
            urlencoding::encode(&self.xsec_token),
            urlencoding::encode(&self.xsec_source)
        )
    }
}

// ============================================================================
// Comments
// ============================================================================

/// A comment or reply; replies nest under `sub_comments`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub comment_id: String,
    pub note_id: String,
    /// Empty for top-level comments
    #[serde(default)]
    pub parent_id: String,
    pub content: String,
    pub like_count: u64,
    #[serde(default)]
    pub publish_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub author: Author,
    #[serde(default)]
    pub ip_location: String,
    #[serde(default)]
    pub sub_comment_count: u64,
    #[serde(default)]
    pub sub_comments: Vec<Comment>,
    #[serde(default)]
    pub sub_comment_cursor: String,
    #[serde(default)]
    pub sub_comment_has_more: bool,
}

impl Comment {
    /// Check if this is a top-level comment (not a reply)
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_empty()
    }

    /// Get total count including nested replies
    pub fn total_count(&self) -> usize {
        1 + self.sub_comments.iter().map(Comment::total_count).sum::<usize>()
    }

    /// This comment and all its replies, depth first, replies detached
    pub fn flatten(&self) -> Vec<Comment> {
        let mut out = Vec::with_capacity(self.total_count());
        let mut stack = vec![self];
        while let Some(comment) = stack.pop() {
            let mut flat = comment.clone();
            flat.sub_comments = Vec::new();
            out.push(flat);
            stack.extend(comment.sub_comments.iter().rev());
        }
        out
    }
}

// ============================================================================
// Creators
// ============================================================================

/// A note author's profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub user_id: String,
    pub nickname: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub ip_location: String,
    #[serde(default)]
    pub follows: u64,
    #[serde(default)]
    pub fans: u64,
    #[serde(default)]
    pub interaction: u64,
    #[serde(default)]
    pub tags: Vec<String>,
}

// ============================================================================
// URL Info
// ============================================================================

/// Identifiers parsed from a note URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteUrlInfo {
    pub note_id: String,
    pub xsec_token: String,
    pub xsec_source: String,
}

/// Identifiers parsed from a creator profile URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorUrlInfo {
    pub user_id: String,
    pub xsec_token: String,
    pub xsec_source: String,
}

// ============================================================================
// Budget and Stats
// ============================================================================

/// Ceilings enforced by the crawler, independent of what the server offers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlBudget {
    pub max_notes: usize,
    pub max_comments_per_note: usize,
    pub max_concurrency: usize,
    pub min_sleep: Duration,
    pub max_sleep: Duration,
}

impl CrawlBudget {
    /// A random pause within the configured sleep range
    pub fn pause(&self) -> Duration {
        crate::utils::random_duration(self.min_sleep, self.max_sleep)
    }
}

impl Default for CrawlBudget {
    fn default() -> Self {
        Self {
            max_notes: 50,
            max_comments_per_note: 50,
            max_concurrency: 1,
            min_sleep: Duration::from_secs(1),
            max_sleep: Duration::from_secs(2),
        }
    }
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    pub notes_saved: usize,
    pub notes_failed: usize,
    pub comments_saved: usize,
    pub creators_saved: usize,
    pub keywords_completed: usize,
    pub keywords_aborted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: &str, parent: &str, subs: Vec<Comment>) -> Comment {
        Comment {
            comment_id: id.to_string(),
            note_id: "n1".to_string(),
            parent_id: parent.to_string(),
            sub_comments: subs,
            ..Default::default()
        }
    }

    #[test]
    fn test_crawler_type_parsing() {
        assert_eq!("search".parse::<CrawlerType>(), Ok(CrawlerType::Search));
        assert_eq!(" Detail ".parse::<CrawlerType>(), Ok(CrawlerType::Detail));
        assert_eq!("creator".parse::<CrawlerType>(), Ok(CrawlerType::Creator));
        assert_eq!("homefeed".parse::<CrawlerType>(), Err("homefeed".to_string()));
    }

    #[test]
    fn test_sort_type_wire_values() {
        for sort in [
            SearchSortType::General,
            SearchSortType::Latest,
            SearchSortType::MostLiked,
            SearchSortType::MostCommented,
            SearchSortType::MostCollected,
        ] {
            assert_eq!(sort.as_str().parse::<SearchSortType>(), Ok(sort));
        }
        assert_eq!(SearchNoteType::Image.code(), 2);
    }

    #[test]
    fn test_comment_total_and_flatten() {
        let root = comment(
            "c1",
            "",
            vec![comment("r1", "c1", vec![]), comment("r2", "c1", vec![])],
        );
        assert!(root.is_top_level());
        assert_eq!(root.total_count(), 3);

        let flat = root.flatten();
        let ids: Vec<&str> = flat.iter().map(|c| c.comment_id.as_str()).collect();
        assert_eq!(ids, ["c1", "r1", "r2"]);
        assert!(flat.iter().all(|c| c.sub_comments.is_empty()));
    }

    #[test]
    fn test_note_url() {
        let note = Note {
            note_id: "abc".into(),
            xsec_token: "T=".into(),
            xsec_source: "pc_search".into(),
            ..Default::default()
        };
        assert_eq!(
            note.url(),
            "https://www.xiaohongshu.com/explore/abc?xsec_token=T%3D&xsec_source=pc_search"
        );
    }

    #[test]
    fn test_budget_pause_in_range() {
        let budget = CrawlBudget::default();
        let pause = budget.pause();
        assert!(pause >= budget.min_sleep && pause <= budget.max_sleep);
    }
}
