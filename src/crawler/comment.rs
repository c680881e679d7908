//! Comment pages and the comment tree walk
//!
//! A note's comments arrive as cursor-paginated top-level pages, each
//! comment carrying a few embedded replies plus its own reply cursor. The
//! walker drains both kinds of pages from one explicit worklist so the whole
//! tree shares a single budget and a single id set.

use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::api::PlatformApi;
use super::note::{de_count, de_or_default, de_string, millis_to_datetime, CardUser};
use crate::models::Comment;
use crate::utils::cancel::CancelToken;
use crate::utils::error::FetchError;
use crate::utils::random_duration;

/// Replies requested per reply page
pub const SUB_COMMENT_PAGE_SIZE: usize = 10;

// ============================================================================
// Wire Structures
// ============================================================================

/// `data` of a comment or reply page
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentPage {
    #[serde(default, deserialize_with = "de_or_default")]
    pub comments: Vec<RawComment>,

    #[serde(default, deserialize_with = "de_string")]
    pub cursor: String,

    #[serde(default, deserialize_with = "de_or_default")]
    pub has_more: bool,
}

/// Comment as returned by the API
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawComment {
    #[serde(default, deserialize_with = "de_string")]
    pub id: String,

    #[serde(default, deserialize_with = "de_string")]
    pub note_id: String,

    #[serde(default, deserialize_with = "de_string")]
    pub content: String,

    #[serde(default, deserialize_with = "de_or_default")]
    pub create_time: i64,

    #[serde(default, deserialize_with = "de_string")]
    pub ip_location: String,

    #[serde(default, deserialize_with = "de_count")]
    pub like_count: u64,

    #[serde(default, deserialize_with = "de_or_default")]
    pub user_info: CardUser,

    #[serde(default, deserialize_with = "de_count")]
    pub sub_comment_count: u64,

    /// Replies embedded in a top-level comment
    #[serde(default, deserialize_with = "de_or_default")]
    pub sub_comments: Vec<RawComment>,

    #[serde(default, deserialize_with = "de_string")]
    pub sub_comment_cursor: String,

    #[serde(default, deserialize_with = "de_or_default")]
    pub sub_comment_has_more: bool,
}

// ============================================================================
// Conversion
// ============================================================================

/// Convert one raw comment, without its replies
pub fn convert_comment(raw: &RawComment, note_id: &str, parent_id: &str) -> Comment {
    let note_id = if raw.note_id.is_empty() {
        note_id
    } else {
        raw.note_id.as_str()
    };

    Comment {
        comment_id: raw.id.clone(),
        note_id: note_id.to_string(),
        parent_id: parent_id.to_string(),
        content: clean_comment_content(&raw.content),
        like_count: raw.like_count,
        publish_time: millis_to_datetime(raw.create_time),
        author: raw.user_info.clone().into(),
        ip_location: raw.ip_location.clone(),
        sub_comment_count: raw.sub_comment_count,
        sub_comments: Vec::new(),
        sub_comment_cursor: raw.sub_comment_cursor.clone(),
        sub_comment_has_more: raw.sub_comment_has_more,
    }
}

/// Strip markup and entities, collapse whitespace
fn clean_comment_content(content: &str) -> String {
    static HTML_TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
    static WHITESPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

    let no_tags = HTML_TAG_REGEX.replace_all(content, "");
    let decoded = html_escape::decode_html_entities(&no_tags);
    WHITESPACE_REGEX.replace_all(&decoded, " ").trim().to_string()
}

// ============================================================================
// Tree Walk
// ============================================================================

/// Result of walking one note's comments
#[derive(Debug, Default)]
pub struct CommentWalk {
    /// Top-level comments with replies nested
    pub comments: Vec<Comment>,
    /// Comments collected at every depth
    pub total: usize,
    pub pages_fetched: usize,
    /// Error that truncated the walk, if any
    pub error: Option<FetchError>,
}

/// Pending page in the walk
#[derive(Debug)]
enum Frontier {
    TopLevel {
        cursor: String,
    },
    Replies {
        root_index: usize,
        root_id: String,
        cursor: String,
    },
}

/// Budget and id set shared by every page of one walk
struct Tally {
    budget: usize,
    total: usize,
    seen: HashSet<String>,
}

impl Tally {
    fn exhausted(&self) -> bool {
        self.total >= self.budget
    }

    /// Accept `raw` and its embedded replies while budget remains
    fn take(&mut self, raw: &RawComment, note_id: &str, parent_id: &str) -> Option<Comment> {
        if self.exhausted() || raw.id.is_empty() || !self.seen.insert(raw.id.clone()) {
            return None;
        }
        self.total += 1;

        let mut comment = convert_comment(raw, note_id, parent_id);
        for sub in &raw.sub_comments {
            if let Some(reply) = self.take(sub, note_id, &raw.id) {
                comment.sub_comments.push(reply);
            }
        }
        Some(comment)
    }
}

/// Walks the comment tree of one note under a fixed budget
pub struct CommentTreeWalker<'a> {
    api: &'a dyn PlatformApi,
    cancel: &'a CancelToken,
    max_comments: usize,
    fetch_sub_comments: bool,
    sub_page_size: usize,
    min_pause: Duration,
    max_pause: Duration,
}

impl<'a> CommentTreeWalker<'a> {
    pub fn new(api: &'a dyn PlatformApi, cancel: &'a CancelToken, max_comments: usize) -> Self {
        Self {
            api,
            cancel,
            max_comments,
            fetch_sub_comments: true,
            sub_page_size: SUB_COMMENT_PAGE_SIZE,
            min_pause: Duration::ZERO,
            max_pause: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn sub_comments(mut self, enabled: bool) -> Self {
        self.fetch_sub_comments = enabled;
        self
    }

    #[must_use]
    pub fn pause(mut self, min: Duration, max: Duration) -> Self {
        self.min_pause = min;
        self.max_pause = max;
        self
    }

    /// Collect at most `max_comments` comments of `note_id`
    ///
    /// A failed page ends the walk; whatever was collected so far is kept.
    pub async fn walk(&self, note_id: &str, xsec_token: &str) -> CommentWalk {
        let mut tally = Tally {
            budget: self.max_comments,
            total: 0,
            seen: HashSet::new(),
        };
        let mut walk = CommentWalk::default();
        let mut worklist = vec![Frontier::TopLevel {
            cursor: String::new(),
        }];

        while let Some(frontier) = worklist.pop() {
            if tally.exhausted() {
                break;
            }
            if walk.pages_fetched > 0 {
                let pause = random_duration(self.min_pause, self.max_pause);
                if self.cancel.sleep(pause).await.is_err() {
                    walk.error = Some(FetchError::Cancelled);
                    break;
                }
            }

            let result = match &frontier {
                Frontier::TopLevel { cursor } => {
                    self.cancel
                        .run(self.api.comments_page(note_id, xsec_token, cursor))
                        .await
                }
                Frontier::Replies {
                    root_id, cursor, ..
                } => {
                    self.cancel
                        .run(self.api.sub_comments_page(
                            note_id,
                            root_id,
                            xsec_token,
                            cursor,
                            self.sub_page_size,
                        ))
                        .await
                }
            };

            let page = match result {
                Ok(Ok(page)) => page,
                Ok(Err(e)) => {
                    warn!(note_id, error = %e, collected = tally.total, "Comment page failed, truncating walk");
                    walk.error = Some(e);
                    break;
                }
                Err(_) => {
                    walk.error = Some(FetchError::Cancelled);
                    break;
                }
            };
            walk.pages_fetched += 1;

            match frontier {
                Frontier::TopLevel { cursor } => {
                    let first_new = walk.comments.len();
                    for raw in &page.comments {
                        if let Some(comment) = tally.take(raw, note_id, "") {
                            walk.comments.push(comment);
                        }
                    }

                    if page.has_more && !page.cursor.is_empty() && page.cursor != cursor {
                        worklist.push(Frontier::TopLevel {
                            cursor: page.cursor,
                        });
                    }

                    // Replies of this page go on top so they drain before the next top-level page
                    if self.fetch_sub_comments {
                        for root_index in (first_new..walk.comments.len()).rev() {
                            let root = &walk.comments[root_index];
                            if root.sub_comment_has_more {
                                worklist.push(Frontier::Replies {
                                    root_index,
                                    root_id: root.comment_id.clone(),
                                    cursor: root.sub_comment_cursor.clone(),
                                });
                            }
                        }
                    }
                }
                Frontier::Replies {
                    root_index,
                    root_id,
                    cursor,
                } => {
                    for raw in &page.comments {
                        if let Some(reply) = tally.take(raw, note_id, &root_id) {
                            walk.comments[root_index].sub_comments.push(reply);
                        }
                    }

                    let advanced = !page.cursor.is_empty() && page.cursor != cursor;
                    let root = &mut walk.comments[root_index];
                    root.sub_comment_cursor = page.cursor.clone();
                    root.sub_comment_has_more = page.has_more && advanced;
                    if root.sub_comment_has_more {
                        worklist.push(Frontier::Replies {
                            root_index,
                            root_id,
                            cursor: page.cursor,
                        });
                    }
                }
            }
            debug!(note_id, collected = tally.total, pending = worklist.len(), "Comment page processed");
        }

        walk.total = tally.total;
        info!(
            note_id,
            comments = walk.total,
            pages = walk.pages_fetched,
            truncated = walk.error.is_some(),
            "Comment walk finished"
        );
        walk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::testing::{comment_page, raw_comment, FakeApi};
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_raw_comment_parsing() {
        let raw: RawComment = serde_json::from_value(json!({
            "id": "c1",
            "note_id": "n1",
            "content": "好看&amp;好吃 <b>推荐</b>\n\n",
            "create_time": 1_700_000_000_000i64,
            "ip_location": "北京",
            "like_count": "1.1万",
            "user_info": {"user_id": "u1", "nickname": "小红", "image": "https://img/u1.jpg"},
            "sub_comment_count": "3",
            "sub_comments": [{"id": "r1", "content": "同感"}],
            "sub_comment_cursor": "r1",
            "sub_comment_has_more": true
        }))
        .unwrap();

        let comment = convert_comment(&raw, "n1", "");
        assert_eq!(comment.content, "好看&好吃 推荐");
        assert_eq!(comment.like_count, 11_000);
        assert_eq!(comment.author.avatar, "https://img/u1.jpg");
        assert_eq!(comment.sub_comment_count, 3);
        assert!(comment.sub_comment_has_more);
        assert!(comment.publish_time.is_some());
        assert!(comment.is_top_level());
        assert!(comment.sub_comments.is_empty());
    }

    #[test]
    fn test_null_fields_tolerated() {
        let page: CommentPage = serde_json::from_value(json!({
            "comments": null, "cursor": null, "has_more": null
        }))
        .unwrap();
        assert!(page.comments.is_empty());
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn test_walk_nests_replies() {
        let api = FakeApi::new();
        let mut root = raw_comment("c1", vec![raw_comment("r1", vec![])]);
        root.sub_comment_has_more = true;
        root.sub_comment_cursor = "r1".into();
        api.push_comments(comment_page(vec![root, raw_comment("c2", vec![])], "", false));
        api.push_sub_comments(comment_page(vec![raw_comment("r2", vec![])], "r2", false));
        let cancel = CancelToken::never();

        let walk = CommentTreeWalker::new(&api, &cancel, 50).walk("n1", "tok").await;

        assert!(walk.error.is_none());
        assert_eq!(walk.total, 4);
        assert_eq!(walk.comments.len(), 2);
        let replies: Vec<&str> = walk.comments[0]
            .sub_comments
            .iter()
            .map(|c| c.comment_id.as_str())
            .collect();
        assert_eq!(replies, ["r1", "r2"]);
        assert!(walk.comments[0].sub_comments.iter().all(|r| r.parent_id == "c1"));
        assert_eq!(api.sub_comment_calls(), vec![("c1".to_string(), "r1".to_string())]);
    }

    #[tokio::test]
    async fn test_walk_skips_replies_when_disabled() {
        let api = FakeApi::new();
        let mut root = raw_comment("c1", vec![]);
        root.sub_comment_has_more = true;
        root.sub_comment_cursor = "x".into();
        api.push_comments(comment_page(vec![root], "", false));
        let cancel = CancelToken::never();

        let walk = CommentTreeWalker::new(&api, &cancel, 50)
            .sub_comments(false)
            .walk("n1", "tok")
            .await;

        assert_eq!(walk.total, 1);
        assert!(api.sub_comment_calls().is_empty());
    }

    #[tokio::test]
    async fn test_walk_deduplicates_ids() {
        let api = FakeApi::new();
        api.push_comments(comment_page(
            vec![raw_comment("c1", vec![]), raw_comment("c2", vec![])],
            "p2",
            true,
        ));
        api.push_comments(comment_page(
            vec![raw_comment("c2", vec![]), raw_comment("c3", vec![])],
            "p3",
            false,
        ));
        let cancel = CancelToken::never();

        let walk = CommentTreeWalker::new(&api, &cancel, 50).walk("n1", "tok").await;

        let ids: Vec<&str> = walk.comments.iter().map(|c| c.comment_id.as_str()).collect();
        assert_eq!(ids, ["c1", "c2", "c3"]);
    }

    #[tokio::test]
    async fn test_error_truncates_walk() {
        let api = FakeApi::new();
        api.push_comments(comment_page(vec![raw_comment("c1", vec![])], "p2", true));
        api.push_comments_error(FetchError::Timeout);
        let cancel = CancelToken::never();

        let walk = CommentTreeWalker::new(&api, &cancel, 50).walk("n1", "tok").await;

        assert_eq!(walk.total, 1);
        assert!(matches!(walk.error, Some(FetchError::Timeout)));
    }

    #[tokio::test]
    async fn test_stalled_cursor_stops() {
        let api = FakeApi::new();
        api.push_comments(comment_page(vec![raw_comment("c1", vec![])], "", true));
        let cancel = CancelToken::never();

        let walk = CommentTreeWalker::new(&api, &cancel, 50).walk("n1", "tok").await;

        assert_eq!(walk.pages_fetched, 1);
        assert!(walk.error.is_none());
    }

    proptest! {
        #[test]
        fn prop_walk_respects_budget(budget in 0usize..30, pages in 1usize..5, per_page in 1usize..6, replies in 0usize..4) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let total = rt.block_on(async {
                let api = FakeApi::new();
                for p in 0..pages {
                    let comments = (0..per_page)
                        .map(|i| {
                            let id = format!("c{p}-{i}");
                            let subs = (0..replies).map(|r| raw_comment(&format!("{id}-r{r}"), vec![])).collect();
                            raw_comment(&id, subs)
                        })
                        .collect();
                    api.push_comments(comment_page(comments, &format!("p{}", p + 1), p + 1 < pages));
                }
                let cancel = CancelToken::never();
                let walk = CommentTreeWalker::new(&api, &cancel, budget).walk("n1", "tok").await;
                let nested: usize = walk.comments.iter().map(Comment::total_count).sum();
                assert_eq!(nested, walk.total);
                walk.total
            });
            prop_assert!(total <= budget);
            prop_assert_eq!(total, budget.min(pages * per_page * (1 + replies)));
        }
    }
}
