//! In-memory store, used for dry runs and tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::{Store, StoreError};
use crate::models::{Comment, Creator, Note};

#[derive(Default)]
struct Inner {
    notes: HashMap<String, Note>,
    note_order: Vec<String>,
    comments: Vec<Comment>,
    comment_keys: HashSet<(String, String)>,
    creators: HashMap<String, Creator>,
}

/// Keeps everything in memory with the same de-duplication rules as [`super::JsonStore`]
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored notes in first-save order
    pub fn notes(&self) -> Vec<Note> {
        let inner = self.lock();
        inner
            .note_order
            .iter()
            .filter_map(|id| inner.notes.get(id).cloned())
            .collect()
    }

    /// Stored comments in save order
    pub fn comments(&self) -> Vec<Comment> {
        self.lock().comments.clone()
    }

    /// Stored comments of one note
    pub fn comments_for(&self, note_id: &str) -> Vec<Comment> {
        self.lock()
            .comments
            .iter()
            .filter(|c| c.note_id == note_id)
            .cloned()
            .collect()
    }

    pub fn creators(&self) -> Vec<Creator> {
        self.lock().creators.values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // a poisoned lock still holds consistent data: every mutation is a single insert
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_note(&self, note: &Note) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.notes.insert(note.note_id.clone(), note.clone()).is_none() {
            inner.note_order.push(note.note_id.clone());
        }
        Ok(())
    }

    async fn save_comment(&self, comment: &Comment) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let key = (comment.note_id.clone(), comment.comment_id.clone());
        if !inner.comment_keys.insert(key) {
            return Ok(false);
        }
        let mut flat = comment.clone();
        flat.sub_comments = Vec::new();
        inner.comments.push(flat);
        Ok(true)
    }

    async fn save_creator(&self, creator: &Creator) -> Result<(), StoreError> {
        self.lock()
            .creators
            .insert(creator.user_id.clone(), creator.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(note: &str, id: &str) -> Comment {
        Comment {
            comment_id: id.into(),
            note_id: note.into(),
            content: format!("content {id}"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_duplicate_comment_stored_once() {
        let store = MemoryStore::new();
        assert!(store.save_comment(&comment("n1", "c1")).await.unwrap());
        assert!(!store.save_comment(&comment("n1", "c1")).await.unwrap());
        assert!(store.save_comment(&comment("n2", "c1")).await.unwrap());

        assert_eq!(store.comments_for("n1").len(), 1);
        assert_eq!(store.comments().len(), 2);
    }

    #[tokio::test]
    async fn test_note_replaced_by_id() {
        let store = MemoryStore::new();
        let mut note = Note {
            note_id: "n1".into(),
            title: "first".into(),
            ..Default::default()
        };
        store.save_note(&note).await.unwrap();
        note.title = "second".into();
        store.save_note(&note).await.unwrap();

        let notes = store.notes();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "second");
    }
}
