//! Note and creator URL parsing
//!
//! A note id is the last path segment of a note URL, whatever comes before
//! it (`/explore/{id}`, `/discovery/item/{id}`, ...); creators are
//! addressed as `/user/profile/{user_id}`.
//! The query string carries the `xsec_token`/`xsec_source` capability pair
//! that later detail and comment calls must echo back.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

use crate::models::{CreatorUrlInfo, NoteUrlInfo};
use crate::utils::error::CrawlerError;

static ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9a-zA-Z]{6,32}$").unwrap());

/// Parse a note URL (or a bare note id)
///
/// # Examples
///
/// ```
/// use rednote::crawler::url::parse_note_info_from_note_url;
///
/// let info = parse_note_info_from_note_url(
///     "https://www.xiaohongshu.com/explore/64f0a1b2c3d4e5f6a7b8c9d0?xsec_token=T&xsec_source=pc_search",
/// )
/// .unwrap();
/// assert_eq!(info.note_id, "64f0a1b2c3d4e5f6a7b8c9d0");
/// assert_eq!(info.xsec_token, "T");
/// assert_eq!(info.xsec_source, "pc_search");
/// ```
pub fn parse_note_info_from_note_url(raw: &str) -> Result<NoteUrlInfo, CrawlerError> {
    let raw = raw.trim();
    if is_bare_id(raw) {
        return Ok(NoteUrlInfo {
            note_id: raw.to_string(),
            ..Default::default()
        });
    }

    let url = Url::parse(raw).map_err(|e| CrawlerError::InvalidUrl(format!("{raw}: {e}")))?;
    let note_id = url
        .path_segments()
        .and_then(|segments| segments.rev().find(|seg| !seg.is_empty()))
        .ok_or_else(|| CrawlerError::InvalidUrl(format!("{raw}: missing note id")))?;

    let (xsec_token, xsec_source) = xsec_params(&url);
    Ok(NoteUrlInfo {
        note_id: note_id.to_string(),
        xsec_token,
        xsec_source,
    })
}

/// A bare id has no scheme, path separator or whitespace
fn is_bare_id(raw: &str) -> bool {
    !raw.is_empty() && !raw.contains(['/', ':']) && !raw.contains(char::is_whitespace)
}

/// Parse a creator profile URL (or a bare user id)
pub fn parse_creator_info_from_url(raw: &str) -> Result<CreatorUrlInfo, CrawlerError> {
    let raw = raw.trim();
    if ID_PATTERN.is_match(raw) {
        return Ok(CreatorUrlInfo {
            user_id: raw.to_string(),
            ..Default::default()
        });
    }

    let url = Url::parse(raw).map_err(|e| CrawlerError::InvalidUrl(format!("{raw}: {e}")))?;
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let user_id = match segments.as_slice() {
        ["user", "profile", id] => *id,
        _ => return Err(CrawlerError::InvalidUrl(format!("{raw}: not a profile URL"))),
    };
    if !ID_PATTERN.is_match(user_id) {
        return Err(CrawlerError::InvalidUrl(format!("{raw}: bad user id")));
    }

    let (xsec_token, xsec_source) = xsec_params(&url);
    Ok(CreatorUrlInfo {
        user_id: user_id.to_string(),
        xsec_token,
        xsec_source,
    })
}

fn xsec_params(url: &Url) -> (String, String) {
    let mut token = String::new();
    let mut source = String::new();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "xsec_token" => token = value.into_owned(),
            "xsec_source" => source = value.into_owned(),
            _ => {}
        }
    }
    (token, source)
}
