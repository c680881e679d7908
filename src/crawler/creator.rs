//! Creator note listing

use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::api::PlatformApi;
use super::note::{de_or_default, de_string, CardUser, InteractInfo, NoteRef};
use super::search::PaginationCursor;
use crate::models::CreatorUrlInfo;
use crate::utils::cancel::CancelToken;
use crate::utils::error::FetchError;
use crate::utils::random_duration;

/// Notes requested per creator page
pub const CREATOR_PAGE_SIZE: usize = 30;

/// `xsec_source` for notes reached from a profile
pub const CREATOR_XSEC_SOURCE: &str = "pc_feed";

/// `data` of a user_posted call
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatorNotesPage {
    #[serde(default, deserialize_with = "de_or_default")]
    pub notes: Vec<CreatorNoteItem>,

    #[serde(default, deserialize_with = "de_string")]
    pub cursor: String,

    #[serde(default, deserialize_with = "de_or_default")]
    pub has_more: bool,
}

/// Note summary on a creator's profile
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatorNoteItem {
    #[serde(default, deserialize_with = "de_string")]
    pub note_id: String,

    #[serde(default, deserialize_with = "de_string")]
    pub xsec_token: String,

    #[serde(default, deserialize_with = "de_string")]
    pub display_title: String,

    #[serde(default, rename = "type", deserialize_with = "de_string")]
    pub note_type: String,

    #[serde(default, deserialize_with = "de_or_default")]
    pub user: CardUser,

    #[serde(default, deserialize_with = "de_or_default")]
    pub interact_info: InteractInfo,
}

/// What one creator listing produced
#[derive(Debug, Default)]
pub struct CreatorNotesOutcome {
    pub notes: Vec<NoteRef>,
    pub pages_fetched: usize,
    pub error: Option<FetchError>,
}

/// Page through a creator's notes until `max_notes` or the end of the list
pub async fn collect_creator_notes(
    api: &dyn PlatformApi,
    creator: &CreatorUrlInfo,
    max_notes: usize,
    cancel: &CancelToken,
    pause: (Duration, Duration),
) -> CreatorNotesOutcome {
    let mut cursor = PaginationCursor::tokens();
    let mut outcome = CreatorNotesOutcome::default();

    while cursor.has_more() && outcome.notes.len() < max_notes {
        if outcome.pages_fetched > 0 && cancel.sleep(random_duration(pause.0, pause.1)).await.is_err() {
            outcome.error = Some(FetchError::Cancelled);
            break;
        }

        let token = cursor.token().unwrap_or_default().to_string();
        let result = match cancel
            .run(api.creator_notes_page(creator, &token, CREATOR_PAGE_SIZE))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Cancelled),
        };

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                warn!(user_id = %creator.user_id, error = %e, "Creator notes page failed");
                outcome.error = Some(e);
                break;
            }
        };
        outcome.pages_fetched += 1;
        debug!(user_id = %creator.user_id, notes = page.notes.len(), "Creator notes page");

        for item in page.notes {
            if outcome.notes.len() >= max_notes {
                break;
            }
            if item.note_id.is_empty() || outcome.notes.iter().any(|n| n.note_id == item.note_id) {
                continue;
            }
            outcome.notes.push(NoteRef {
                note_id: item.note_id,
                xsec_token: item.xsec_token,
                xsec_source: CREATOR_XSEC_SOURCE.to_string(),
                source_keyword: String::new(),
            });
        }

        cursor.advance_cursor(page.cursor, page.has_more);
    }

    info!(
        user_id = %creator.user_id,
        notes = outcome.notes.len(),
        pages = outcome.pages_fetched,
        "Creator listing finished"
    );
    outcome
}
