//! Extraction from server-rendered pages
//!
//! Note and profile pages embed the store that hydrates the web app as
//! `window.__INITIAL_STATE__=<js object>` in a `<script>` element. The
//! object is JSON apart from bare `undefined` values.

use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;

use super::note::{de_or_default, de_string, NoteCard};
use crate::models::Creator;
use crate::utils::error::FetchError;
use crate::utils::parse_count;

const STATE_MARKER: &str = "window.__INITIAL_STATE__=";

static SCRIPT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script").unwrap());

static UNDEFINED_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([:\[,]\s*)undefined\b").unwrap());

/// The page's initial state, or `None` when the page has none
pub fn extract_initial_state(html: &str) -> Result<Option<Value>, FetchError> {
    let document = Html::parse_document(html);

    let Some(raw) = document.select(&SCRIPT_SELECTOR).find_map(|script| {
        let text: String = script.text().collect();
        let start = text.find(STATE_MARKER)? + STATE_MARKER.len();
        Some(text[start..].trim().trim_end_matches(';').to_string())
    }) else {
        return Ok(None);
    };

    let cleaned = UNDEFINED_REGEX.replace_all(&raw, "${1}null");

    serde_json::from_str(&cleaned)
        .map(Some)
        .map_err(|e| FetchError::Decode(format!("initial state: {e}")))
}

/// Note card for `note_id` from a note page's state
pub fn note_card_from_state(state: &Value, note_id: &str) -> Result<Option<NoteCard>, FetchError> {
    let Some(detail_map) = state.pointer("/note/noteDetailMap").and_then(Value::as_object) else {
        return Ok(None);
    };

    let entry = detail_map
        .get(note_id)
        .or_else(|| detail_map.values().find(|v| v.get("note").is_some_and(|n| !n.is_null())));
    let Some(note) = entry.and_then(|e| e.get("note")).filter(|n| n.is_object()) else {
        return Ok(None);
    };

    let mut card: NoteCard = serde_json::from_value(note.clone())
        .map_err(|e| FetchError::Decode(format!("note state: {e}")))?;
    if card.note_id.is_empty() {
        card.note_id = note_id.to_string();
    }
    if card.note_id.is_empty() {
        return Ok(None);
    }
    Ok(Some(card))
}

#[derive(Debug, Default, Deserialize)]
struct UserPageData {
    #[serde(default, alias = "basicInfo", deserialize_with = "de_or_default")]
    basic_info: BasicInfo,
    #[serde(default, deserialize_with = "de_or_default")]
    interactions: Vec<Interaction>,
    #[serde(default, deserialize_with = "de_or_default")]
    tags: Vec<ProfileTag>,
}

#[derive(Debug, Default, Deserialize)]
struct BasicInfo {
    #[serde(default, deserialize_with = "de_string")]
    nickname: String,
    #[serde(default, deserialize_with = "de_string")]
    images: String,
    #[serde(default, deserialize_with = "de_string")]
    desc: String,
    #[serde(default, deserialize_with = "de_or_default")]
    gender: Option<i64>,
    #[serde(default, alias = "ipLocation", deserialize_with = "de_string")]
    ip_location: String,
}

#[derive(Debug, Default, Deserialize)]
struct Interaction {
    #[serde(default, rename = "type", deserialize_with = "de_string")]
    kind: String,
    #[serde(default, deserialize_with = "de_string")]
    count: String,
}

#[derive(Debug, Default, Deserialize)]
struct ProfileTag {
    #[serde(default, deserialize_with = "de_string")]
    name: String,
}

/// Creator profile from a profile page's state
pub fn creator_from_state(state: &Value, user_id: &str) -> Result<Option<Creator>, FetchError> {
    let Some(data) = state.pointer("/user/userPageData").filter(|v| v.is_object()) else {
        return Ok(None);
    };
    let data: UserPageData = serde_json::from_value(data.clone())
        .map_err(|e| FetchError::Decode(format!("profile state: {e}")))?;
    if data.basic_info.nickname.is_empty() {
        return Ok(None);
    }

    let count_of = |kind: &str| {
        data.interactions
            .iter()
            .find(|i| i.kind == kind)
            .map(|i| parse_count(&i.count))
            .unwrap_or(0)
    };

    let gender = match data.basic_info.gender {
        Some(0) => "male",
        Some(1) => "female",
        _ => "unknown",
    };

    Ok(Some(Creator {
        user_id: user_id.to_string(),
        follows: count_of("follows"),
        fans: count_of("fans"),
        interaction: count_of("interaction"),
        nickname: data.basic_info.nickname,
        avatar: data.basic_info.images,
        description: data.basic_info.desc,
        gender: gender.to_string(),
        ip_location: data.basic_info.ip_location,
        tags: data
            .tags
            .into_iter()
            .map(|t| t.name)
            .filter(|n| !n.is_empty())
            .collect(),
    }))
}
