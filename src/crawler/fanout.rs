//! Bounded concurrent comment collection for a batch of notes
//!
//! At most `max_concurrency` comment walks run at once, gated by a
//! semaphore. Each walk persists its own comments as soon as it finishes.
//! Failures stay with the note they happened on; session-fatal errors are
//! surfaced to the caller once the whole batch has settled.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::api::PlatformApi;
use super::comment::CommentTreeWalker;
use super::note::NoteRef;
use crate::storage::Store;
use crate::utils::cancel::CancelToken;
use crate::utils::error::FetchError;

/// Per-walk settings shared by the batch
#[derive(Debug, Clone)]
pub struct FanoutOptions {
    pub max_concurrency: usize,
    pub max_comments_per_note: usize,
    pub fetch_sub_comments: bool,
    pub min_pause: Duration,
    pub max_pause: Duration,
}

/// Outcome for one note
#[derive(Debug)]
pub struct NoteComments {
    pub note_id: String,
    /// Comments collected, replies included
    pub collected: usize,
    /// Comments newly written to the store
    pub saved: usize,
    /// Error that truncated or prevented the walk
    pub error: Option<FetchError>,
}

/// Outcome for a batch
#[derive(Debug, Default)]
pub struct FanoutReport {
    pub notes: Vec<NoteComments>,
}

impl FanoutReport {
    pub fn comments_saved(&self) -> usize {
        self.notes.iter().map(|n| n.saved).sum()
    }

    /// First session-fatal or cancellation error in the batch
    pub fn take_fatal(&mut self) -> Option<FetchError> {
        self.notes.iter_mut().find_map(|n| {
            let fatal = n
                .error
                .as_ref()
                .is_some_and(|e| e.is_session_fatal() || matches!(e, FetchError::Cancelled));
            if fatal {
                n.error.take()
            } else {
                None
            }
        })
    }
}

/// Walk and persist comments for every note in `notes`
pub async fn fetch_comments_batch(
    api: &dyn PlatformApi,
    store: &dyn Store,
    notes: &[NoteRef],
    options: &FanoutOptions,
    cancel: &CancelToken,
) -> FanoutReport {
    let semaphore = Arc::new(Semaphore::new(options.max_concurrency.max(1)));

    let walks = notes.iter().map(|note| {
        let semaphore = Arc::clone(&semaphore);
        async move {
            let _permit = match cancel.run(semaphore.acquire_owned()).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) | Err(_) => {
                    return NoteComments {
                        note_id: note.note_id.clone(),
                        collected: 0,
                        saved: 0,
                        error: Some(FetchError::Cancelled),
                    };
                }
            };
            walk_and_save(api, store, note, options, cancel).await
        }
    });

    let report = FanoutReport {
        notes: futures::future::join_all(walks).await,
    };
    info!(
        notes = report.notes.len(),
        comments = report.comments_saved(),
        failed = report.notes.iter().filter(|n| n.error.is_some()).count(),
        "Comment batch finished"
    );
    report
}

async fn walk_and_save(
    api: &dyn PlatformApi,
    store: &dyn Store,
    note: &NoteRef,
    options: &FanoutOptions,
    cancel: &CancelToken,
) -> NoteComments {
    debug!(note_id = %note.note_id, "Walking comments");
    let walk = CommentTreeWalker::new(api, cancel, options.max_comments_per_note)
        .sub_comments(options.fetch_sub_comments)
        .pause(options.min_pause, options.max_pause)
        .walk(&note.note_id, &note.xsec_token)
        .await;

    let mut saved = 0;
    for comment in walk.comments.iter().flat_map(|root| root.flatten()) {
        match store.save_comment(&comment).await {
            Ok(true) => saved += 1,
            Ok(false) => {}
            Err(e) => {
                warn!(note_id = %note.note_id, comment_id = %comment.comment_id, error = %e, "Failed to save comment");
            }
        }
    }

    NoteComments {
        note_id: note.note_id.clone(),
        collected: walk.total,
        saved,
        error: walk.error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::testing::{comment_page, raw_comment, FakeApi};
    use crate::storage::MemoryStore;
    use crate::utils::cancel::cancel_pair;
    use std::time::Instant;

    fn notes(n: usize) -> Vec<NoteRef> {
        (0..n)
            .map(|i| NoteRef {
                note_id: format!("n{i}"),
                xsec_token: "tok".into(),
                ..Default::default()
            })
            .collect()
    }

    fn options(max_concurrency: usize) -> FanoutOptions {
        FanoutOptions {
            max_concurrency,
            max_comments_per_note: 10,
            fetch_sub_comments: true,
            min_pause: Duration::ZERO,
            max_pause: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let api = FakeApi::with_latency(Duration::from_millis(20));
        let store = MemoryStore::new();
        let cancel = CancelToken::never();

        let report = fetch_comments_batch(&api, &store, &notes(8), &options(3), &cancel).await;

        assert_eq!(report.notes.len(), 8);
        assert!(api.peak_concurrency() <= 3);
        assert!(api.peak_concurrency() >= 2);
    }

    #[tokio::test]
    async fn test_single_worker_is_sequential() {
        let api = FakeApi::with_latency(Duration::from_millis(5));
        let store = MemoryStore::new();
        let cancel = CancelToken::never();

        fetch_comments_batch(&api, &store, &notes(4), &options(1), &cancel).await;

        assert_eq!(api.peak_concurrency(), 1);
    }

    #[tokio::test]
    async fn test_failure_stays_with_note() {
        let api = FakeApi::new();
        api.push_comments_for("n0", Err(FetchError::Timeout));
        api.push_comments_for(
            "n1",
            Ok(comment_page(vec![raw_comment("c1", vec![raw_comment("r1", vec![])])], "", false)),
        );
        let store = MemoryStore::new();
        let cancel = CancelToken::never();

        let mut report = fetch_comments_batch(&api, &store, &notes(2), &options(2), &cancel).await;

        assert!(matches!(report.notes[0].error, Some(FetchError::Timeout)));
        assert_eq!(report.notes[1].saved, 2);
        assert_eq!(store.comments_for("n1").len(), 2);
        assert!(report.take_fatal().is_none());
    }

    #[tokio::test]
    async fn test_fatal_error_is_reported() {
        let api = FakeApi::new();
        api.push_comments_for("n0", Err(FetchError::IpBlocked { code: 300012 }));
        let store = MemoryStore::new();
        let cancel = CancelToken::never();

        let mut report = fetch_comments_batch(&api, &store, &notes(2), &options(2), &cancel).await;

        assert!(matches!(report.take_fatal(), Some(FetchError::IpBlocked { .. })));
    }

    #[tokio::test]
    async fn test_deadline_stops_queued_and_running_walks() {
        let api = FakeApi::with_latency(Duration::from_millis(50));
        let store = MemoryStore::new();
        let (handle, cancel) = cancel_pair();
        handle.cancel_after(Duration::from_millis(20));

        let started = Instant::now();
        let report = fetch_comments_batch(&api, &store, &notes(10), &options(2), &cancel).await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(report.notes.len(), 10);
        for note in &report.notes {
            assert!(
                matches!(note.error, Some(FetchError::Cancelled)),
                "{} ended with {:?}",
                note.note_id,
                note.error
            );
        }
        assert_eq!(report.comments_saved(), 0);
        assert!(store.comments().is_empty());
        assert!(api.peak_concurrency() <= 2);
    }
}
