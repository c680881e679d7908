//! JSON file store
//!
//! Layout under the output directory:
//!
//! - `notes/note_{note_id}.json`
//! - `comments/comments_{note_id}.json` (array, merged and de-duplicated by comment id)
//! - `creators/creator_{user_id}.json`

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{sanitize_file_stem, Store, StoreError};
use crate::models::{Comment, Creator, Note};

/// Comments already persisted for one note
#[derive(Default)]
struct CommentFile {
    ids: HashSet<String>,
    comments: Vec<Comment>,
}

/// Per-note comment file, loaded from disk on first use
type CommentSlot = Arc<Mutex<Option<CommentFile>>>;

/// Writes one JSON document per entity
pub struct JsonStore {
    root: PathBuf,
    write_timeout: Duration,
    comments: Mutex<HashMap<String, CommentSlot>>,
}

impl JsonStore {
    /// Create the store, creating the directory tree if needed
    pub async fn open(root: impl Into<PathBuf>, write_timeout: Duration) -> Result<Self, StoreError> {
        let root = root.into();
        for sub in ["notes", "comments", "creators"] {
            let dir = root.join(sub);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|source| StoreError::Io {
                    path: dir.display().to_string(),
                    source,
                })?;
        }

        Ok(Self {
            root,
            write_timeout,
            comments: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn note_path(&self, note_id: &str) -> PathBuf {
        self.root
            .join("notes")
            .join(format!("note_{}.json", sanitize_file_stem(note_id)))
    }

    fn comments_path(&self, note_id: &str) -> PathBuf {
        self.root
            .join("comments")
            .join(format!("comments_{}.json", sanitize_file_stem(note_id)))
    }

    fn creator_path(&self, user_id: &str) -> PathBuf {
        self.root
            .join("creators")
            .join(format!("creator_{}.json", sanitize_file_stem(user_id)))
    }

    /// Serialize and write atomically (temp file + rename) within the timeout
    async fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let tmp = path.with_extension("json.tmp");

        let write = async {
            tokio::fs::write(&tmp, &bytes).await?;
            tokio::fs::rename(&tmp, path).await
        };

        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(())) => {
                debug!(path = %path.display(), bytes = bytes.len(), "Wrote file");
                Ok(())
            }
            Ok(Err(source)) => Err(StoreError::Io {
                path: path.display().to_string(),
                source,
            }),
            Err(_) => {
                warn!(path = %path.display(), timeout = ?self.write_timeout, "Write timed out");
                Err(StoreError::Timeout {
                    path: path.display().to_string(),
                    timeout: self.write_timeout,
                })
            }
        }
    }

    /// Lock slot for one note's comment file
    ///
    /// The store-wide map is held only long enough to look the slot up.
    async fn comment_slot(&self, note_id: &str) -> CommentSlot {
        let mut slots = self.comments.lock().await;
        Arc::clone(slots.entry(note_id.to_string()).or_default())
    }

    /// Comments already on disk for a note, from an earlier run
    async fn load_existing(&self, path: &Path) -> CommentFile {
        let mut file = CommentFile::default();
        let Ok(bytes) = tokio::fs::read(path).await else {
            return file;
        };
        match serde_json::from_slice::<Vec<Comment>>(&bytes) {
            Ok(existing) => {
                for comment in existing {
                    if file.ids.insert(comment.comment_id.clone()) {
                        file.comments.push(comment);
                    }
                }
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Ignoring unreadable comment file"),
        }
        file
    }
}

#[async_trait]
impl Store for JsonStore {
    async fn save_note(&self, note: &Note) -> Result<(), StoreError> {
        self.write_json(&self.note_path(&note.note_id), note).await
    }

    async fn save_comment(&self, comment: &Comment) -> Result<bool, StoreError> {
        let path = self.comments_path(&comment.note_id);
        let slot = self.comment_slot(&comment.note_id).await;
        let mut guard = slot.lock().await;

        if guard.is_none() {
            *guard = Some(self.load_existing(&path).await);
        }
        let Some(file) = guard.as_mut() else {
            return Ok(false);
        };

        if file.ids.contains(&comment.comment_id) {
            debug!(
                note_id = %comment.note_id,
                comment_id = %comment.comment_id,
                "Skipping duplicate comment"
            );
            return Ok(false);
        }

        let mut flat = comment.clone();
        flat.sub_comments = Vec::new();
        file.comments.push(flat);

        if let Err(e) = self.write_json(&path, &file.comments).await {
            file.comments.pop();
            return Err(e);
        }
        file.ids.insert(comment.comment_id.clone());
        Ok(true)
    }

    async fn save_creator(&self, creator: &Creator) -> Result<(), StoreError> {
        self.write_json(&self.creator_path(&creator.user_id), creator)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn comment(note: &str, id: &str) -> Comment {
        Comment {
            comment_id: id.into(),
            note_id: note.into(),
            content: format!("content {id}"),
            ..Default::default()
        }
    }

    async fn store(dir: &TempDir) -> JsonStore {
        JsonStore::open(dir.path(), Duration::from_secs(5)).await.unwrap()
    }

    #[tokio::test]
    async fn test_save_note_writes_file() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let note = Note {
            note_id: "64abc".into(),
            title: "咖啡探店".into(),
            ..Default::default()
        };

        store.save_note(&note).await.unwrap();

        let bytes = std::fs::read(dir.path().join("notes/note_64abc.json")).unwrap();
        let back: Note = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, note);
    }

    #[tokio::test]
    async fn test_duplicate_comment_stored_once() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        assert!(store.save_comment(&comment("n1", "c1")).await.unwrap());
        assert!(!store.save_comment(&comment("n1", "c1")).await.unwrap());
        assert!(store.save_comment(&comment("n1", "c2")).await.unwrap());

        let bytes = std::fs::read(dir.path().join("comments/comments_n1.json")).unwrap();
        let stored: Vec<Comment> = serde_json::from_slice(&bytes).unwrap();
        let ids: Vec<&str> = stored.iter().map(|c| c.comment_id.as_str()).collect();
        assert_eq!(ids, ["c1", "c2"]);
    }

    #[tokio::test]
    async fn test_merges_with_previous_run() {
        let dir = TempDir::new().unwrap();
        {
            let first = store(&dir).await;
            first.save_comment(&comment("n1", "c1")).await.unwrap();
        }

        let second = store(&dir).await;
        assert!(!second.save_comment(&comment("n1", "c1")).await.unwrap());
        assert!(second.save_comment(&comment("n1", "c3")).await.unwrap());

        let bytes = std::fs::read(dir.path().join("comments/comments_n1.json")).unwrap();
        let stored: Vec<Comment> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_write_is_not_a_duplicate() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let comments_dir = dir.path().join("comments");

        std::fs::remove_dir_all(&comments_dir).unwrap();
        let err = store.save_comment(&comment("n1", "c1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));

        std::fs::create_dir_all(&comments_dir).unwrap();
        assert!(store.save_comment(&comment("n1", "c1")).await.unwrap());

        let bytes = std::fs::read(comments_dir.join("comments_n1.json")).unwrap();
        let stored: Vec<Comment> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_notes_all_persist() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let saves = (0..20).map(|i| {
            let note = if i % 2 == 0 { "n1" } else { "n2" };
            let comment = comment(note, &format!("c{i}"));
            let store = &store;
            async move { store.save_comment(&comment).await }
        });
        let results = futures::future::join_all(saves).await;
        assert!(results.into_iter().all(|r| r.unwrap()));

        for note in ["n1", "n2"] {
            let bytes = std::fs::read(dir.path().join(format!("comments/comments_{note}.json"))).unwrap();
            let stored: Vec<Comment> = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(stored.len(), 10, "{note}");
        }
    }

    #[tokio::test]
    async fn test_save_creator() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let creator = Creator {
            user_id: "u1".into(),
            nickname: "小明".into(),
            ..Default::default()
        };
        store.save_creator(&creator).await.unwrap();
        assert!(dir.path().join("creators/creator_u1.json").exists());
    }
}
