//! Note cards and their conversion into [`Note`]
//!
//! The same card arrives in three spellings: snake_case from the feed API,
//! a reduced snake_case card from search, and camelCase from the web page's
//! initial state. One struct with serde aliases reads all of them.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::models::{Author, InteractCounts, Note, NoteUrlInfo};
use crate::utils::parse_count;

/// Host serving original video streams
const VIDEO_HOST: &str = "http://sns-video-bd.xhscdn.com";

// ============================================================================
// Lenient Field Helpers
// ============================================================================

/// Accept `"1.2万"`, `"10+"`, `12`, or null
pub(crate) fn de_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => parse_count(&s),
        Value::Number(n) => n.as_u64().unwrap_or(0),
        _ => 0,
    })
}

/// Accept a string or a number as a string, null as empty
pub(crate) fn de_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Treat an explicit null like a missing field
pub(crate) fn de_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Convert a millisecond timestamp, 0 meaning unknown
pub(crate) fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    if millis <= 0 {
        return None;
    }
    Utc.timestamp_millis_opt(millis).single()
}

// ============================================================================
// Wire Structures
// ============================================================================

/// Author block of a card
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CardUser {
    #[serde(default, alias = "userId")]
    pub user_id: String,

    #[serde(default)]
    pub nickname: String,

    #[serde(default, alias = "image")]
    pub avatar: String,
}

impl From<CardUser> for Author {
    fn from(user: CardUser) -> Self {
        Self {
            user_id: user.user_id,
            nickname: user.nickname,
            avatar: user.avatar,
        }
    }
}

/// Interaction counters, sent as display strings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InteractInfo {
    #[serde(default, alias = "likedCount", deserialize_with = "de_count")]
    pub liked_count: u64,

    #[serde(default, alias = "collectedCount", deserialize_with = "de_count")]
    pub collected_count: u64,

    #[serde(default, alias = "commentCount", deserialize_with = "de_count")]
    pub comment_count: u64,

    #[serde(default, alias = "shareCount", deserialize_with = "de_count")]
    pub share_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TagInfo {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ImageInfo {
    #[serde(default, alias = "urlDefault")]
    pub url_default: String,

    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VideoConsumer {
    #[serde(default, alias = "originVideoKey")]
    pub origin_video_key: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub consumer: VideoConsumer,
}

/// Note card as returned by feed, search, or the web page state
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NoteCard {
    #[serde(default, alias = "noteId", deserialize_with = "de_string")]
    pub note_id: String,

    /// `normal` or `video`
    #[serde(default, rename = "type", deserialize_with = "de_string")]
    pub note_type: String,

    #[serde(default, deserialize_with = "de_string")]
    pub title: String,

    /// Title on search cards
    #[serde(default, alias = "displayTitle", deserialize_with = "de_string")]
    pub display_title: String,

    #[serde(default, deserialize_with = "de_string")]
    pub desc: String,

    #[serde(default, deserialize_with = "de_or_default")]
    pub user: CardUser,

    #[serde(default, alias = "interactInfo", deserialize_with = "de_or_default")]
    pub interact_info: InteractInfo,

    #[serde(default, alias = "tagList", deserialize_with = "de_or_default")]
    pub tag_list: Vec<TagInfo>,

    #[serde(default, alias = "imageList", deserialize_with = "de_or_default")]
    pub image_list: Vec<ImageInfo>,

    #[serde(default)]
    pub video: Option<VideoInfo>,

    #[serde(default, deserialize_with = "de_or_default")]
    pub time: i64,

    #[serde(default, alias = "lastUpdateTime", deserialize_with = "de_or_default")]
    pub last_update_time: i64,

    #[serde(default, alias = "ipLocation", deserialize_with = "de_string")]
    pub ip_location: String,

    #[serde(default, alias = "xsecToken", deserialize_with = "de_string")]
    pub xsec_token: String,
}

/// `data` of a feed call
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedResponse {
    #[serde(default)]
    pub items: Vec<FeedItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedItem {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub note_card: Option<NoteCard>,
}

impl FeedResponse {
    /// The first card, with its id filled from the item when missing
    pub fn into_first_card(self) -> Option<NoteCard> {
        let item = self.items.into_iter().next()?;
        let mut card = item.note_card?;
        if card.note_id.is_empty() {
            card.note_id = item.id;
        }
        Some(card)
    }
}

// ============================================================================
// Note References
// ============================================================================

/// A note to fetch, with the token of the listing it was found in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteRef {
    pub note_id: String,
    pub xsec_token: String,
    pub xsec_source: String,
    /// Keyword that surfaced the note, empty outside search mode
    pub source_keyword: String,
}

impl From<NoteUrlInfo> for NoteRef {
    fn from(info: NoteUrlInfo) -> Self {
        Self {
            note_id: info.note_id,
            xsec_token: info.xsec_token,
            xsec_source: info.xsec_source,
            source_keyword: String::new(),
        }
    }
}

// ============================================================================
// Conversion
// ============================================================================

impl NoteCard {
    /// Build the canonical note, binding it to the token it was fetched with
    pub fn into_note(self, xsec_token: &str, xsec_source: &str, source_keyword: &str) -> Note {
        let title = if self.title.is_empty() {
            self.display_title
        } else {
            self.title
        };

        let video_url = self
            .video
            .map(|v| v.consumer.origin_video_key)
            .filter(|key| !key.is_empty())
            .map(|key| format!("{VIDEO_HOST}/{key}"));

        let image_urls = self
            .image_list
            .into_iter()
            .filter_map(|img| {
                let url = if img.url_default.is_empty() { img.url } else { img.url_default };
                (!url.is_empty()).then_some(url)
            })
            .collect();

        let xsec_token = if xsec_token.is_empty() {
            self.xsec_token
        } else {
            xsec_token.to_string()
        };

        Note {
            note_id: self.note_id,
            title,
            content: self.desc,
            note_type: self.note_type,
            author: self.user.into(),
            counts: InteractCounts {
                like: self.interact_info.liked_count,
                comment: self.interact_info.comment_count,
                collect: self.interact_info.collected_count,
                share: self.interact_info.share_count,
            },
            tags: self
                .tag_list
                .into_iter()
                .map(|t| t.name)
                .filter(|n| !n.is_empty())
                .collect(),
            image_urls,
            video_url,
            ip_location: self.ip_location,
            publish_time: millis_to_datetime(self.time),
            last_update_time: millis_to_datetime(self.last_update_time),
            xsec_token,
            xsec_source: xsec_source.to_string(),
            source_keyword: source_keyword.to_string(),
            comments: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_feed_card_conversion() {
        let data = json!({
            "items": [{
                "id": "64f0a1",
                "model_type": "note",
                "note_card": {
                    "note_id": "64f0a1",
                    "type": "normal",
                    "title": "周末咖啡",
                    "desc": "很好喝 #咖啡[话题]#",
                    "user": {"user_id": "u1", "nickname": "小明", "avatar": "https://img/a.jpg"},
                    "interact_info": {
                        "liked_count": "1.2万",
                        "collected_count": "345",
                        "comment_count": "10+",
                        "share_count": 7
                    },
                    "tag_list": [{"id": "t1", "name": "咖啡", "type": "topic"}],
                    "image_list": [{"url_default": "https://img/1.jpg"}, {"url": "https://img/2.jpg"}],
                    "time": 1_700_000_000_000i64,
                    "last_update_time": 0,
                    "ip_location": "上海"
                }
            }]
        });

        let feed: FeedResponse = serde_json::from_value(data).unwrap();
        let note = feed
            .into_first_card()
            .unwrap()
            .into_note("tok", "pc_search", "咖啡");

        assert_eq!(note.note_id, "64f0a1");
        assert_eq!(note.title, "周末咖啡");
        assert_eq!(note.author.nickname, "小明");
        assert_eq!(note.counts.like, 12_000);
        assert_eq!(note.counts.comment, 10);
        assert_eq!(note.counts.share, 7);
        assert_eq!(note.tags, vec!["咖啡"]);
        assert_eq!(note.image_urls.len(), 2);
        assert!(note.publish_time.is_some());
        assert!(note.last_update_time.is_none());
        assert_eq!(note.xsec_token, "tok");
        assert_eq!(note.source_keyword, "咖啡");
    }

    #[test]
    fn test_camel_case_card() {
        let card: NoteCard = serde_json::from_value(json!({
            "noteId": "n2",
            "type": "video",
            "title": "",
            "displayTitle": "视频标题",
            "user": {"userId": "u2", "nickname": "阿花"},
            "interactInfo": {"likedCount": "88", "commentCount": "3"},
            "video": {"consumer": {"originVideoKey": "pre_post/abc"}},
            "xsecToken": "from-page"
        }))
        .unwrap();

        let note = card.into_note("", "pc_feed", "");
        assert_eq!(note.note_id, "n2");
        assert_eq!(note.title, "视频标题");
        assert_eq!(note.author.user_id, "u2");
        assert_eq!(note.counts.like, 88);
        assert_eq!(
            note.video_url.as_deref(),
            Some("http://sns-video-bd.xhscdn.com/pre_post/abc")
        );
        assert_eq!(note.xsec_token, "from-page");
    }

    #[test]
    fn test_empty_feed() {
        let feed: FeedResponse = serde_json::from_value(json!({"items": []})).unwrap();
        assert!(feed.into_first_card().is_none());
    }
}
