// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! In-memory remote collection.
//!
//! Behaves like a tiny remote collection held entirely in memory. Used
//! throughout the test suite in place of a running collection. Failures can
//! be injected per action to exercise error paths.

use crate::{
    note::NoteFields,
    sync::remote::{RemoteError, RemoteErrorKind, RemoteNote, RemoteStore, Result},
};

use async_trait::async_trait;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
    time::Duration,
};

#[derive(Debug, Default)]
struct MemoryState {
    decks: BTreeSet<String>,
    models: BTreeSet<String>,
    notes: BTreeMap<u64, (String, RemoteNote)>,
    media: BTreeMap<String, PathBuf>,
    next_id: u64,
    syncs: usize,
    failures: HashMap<String, Vec<RemoteErrorKind>>,
}

/// Remote collection kept in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
}

impl MemoryStore {
    /// Construct new empty store.
    pub fn new() -> Self {
        let store = Self::default();
        store.lock().next_id = 1;
        store
    }

    /// Register note models the store accepts.
    pub fn with_models(self, models: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.lock().models.extend(models.into_iter().map(Into::into));
        self
    }

    /// Delay every action by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Place note directly into a deck, returning its remote identifier.
    ///
    /// The deck is created if missing, and `note.remote_id` is ignored.
    pub fn insert_note(&self, deck: impl Into<String>, mut note: RemoteNote) -> u64 {
        let deck = deck.into();
        let mut state = self.lock();
        let remote_id = state.allocate_id();
        note.remote_id = remote_id;
        state.decks.insert(deck.clone());
        state.notes.insert(remote_id, (deck, note));
        remote_id
    }

    /// Drop note behind the caller's back.
    pub fn forget_note(&self, remote_id: u64) {
        self.lock().notes.remove(&remote_id);
    }

    /// Make the next call of `action` fail with `kind`.
    ///
    /// Repeated injections for the same action queue up.
    pub fn fail_next(&self, action: impl Into<String>, kind: RemoteErrorKind) {
        self.lock()
            .failures
            .entry(action.into())
            .or_default()
            .push(kind);
    }

    /// Snapshot of every note in a deck.
    pub fn notes(&self, deck: &str) -> Vec<RemoteNote> {
        self.lock()
            .notes
            .values()
            .filter(|(name, _)| name == deck)
            .map(|(_, note)| note.clone())
            .collect()
    }

    /// Names of stored media files.
    pub fn media_names(&self) -> Vec<String> {
        self.lock().media.keys().cloned().collect()
    }

    /// Number of times [`RemoteStore::sync`] was called.
    pub fn sync_count(&self) -> usize {
        self.lock().syncs
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // INVARIANT: State stays usable after a panicking test thread.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn enter(&self, action: &str) -> Result<MutexGuard<'_, MemoryState>> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        if let Some(kind) = state.take_failure(action) {
            return Err(RemoteError::new(action, kind, "injected failure"));
        }

        Ok(state)
    }
}

impl MemoryState {
    fn allocate_id(&mut self) -> u64 {
        self.next_id = self.next_id.max(1);
        let remote_id = self.next_id;
        self.next_id += 1;
        remote_id
    }

    fn take_failure(&mut self, action: &str) -> Option<RemoteErrorKind> {
        let queue = self.failures.get_mut(action)?;
        if queue.is_empty() {
            return None;
        }

        Some(queue.remove(0))
    }

    fn note_mut(&mut self, action: &str, remote_id: u64) -> Result<&mut RemoteNote> {
        self.notes
            .get_mut(&remote_id)
            .map(|(_, note)| note)
            .ok_or_else(|| {
                RemoteError::new(
                    action,
                    RemoteErrorKind::NoteNotFound,
                    format!("note {remote_id} was not found"),
                )
            })
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn deck_names(&self) -> Result<Vec<String>> {
        let state = self.enter("deckNames").await?;
        Ok(state.decks.iter().cloned().collect())
    }

    async fn model_names(&self) -> Result<Vec<String>> {
        let state = self.enter("modelNames").await?;
        Ok(state.models.iter().cloned().collect())
    }

    async fn create_deck(&self, deck: &str) -> Result<()> {
        let mut state = self.enter("createDeck").await?;
        state.decks.insert(deck.to_string());
        Ok(())
    }

    async fn list_notes(&self, deck: &str) -> Result<Vec<RemoteNote>> {
        let state = self.enter("findNotes").await?;
        Ok(state
            .notes
            .values()
            .filter(|(name, _)| name == deck)
            .map(|(_, note)| note.clone())
            .collect())
    }

    async fn add_note(
        &self,
        deck: &str,
        model: &str,
        fields: &NoteFields,
        tags: &BTreeSet<String>,
    ) -> Result<u64> {
        let mut state = self.enter("addNote").await?;
        if !state.decks.contains(deck) {
            return Err(RemoteError::new(
                "addNote",
                RemoteErrorKind::Rejected,
                format!("deck {deck:?} was not found"),
            ));
        }
        if !state.models.contains(model) {
            return Err(RemoteError::new(
                "addNote",
                RemoteErrorKind::Rejected,
                format!("model {model:?} was not found"),
            ));
        }

        let remote_id = state.allocate_id();
        let note = RemoteNote {
            remote_id,
            model_name: model.to_string(),
            fields: fields.clone(),
            tags: tags.clone(),
        };
        state.notes.insert(remote_id, (deck.to_string(), note));
        Ok(remote_id)
    }

    async fn update_note_fields(&self, remote_id: u64, fields: &NoteFields) -> Result<()> {
        let mut state = self.enter("updateNoteFields").await?;
        let note = state.note_mut("updateNoteFields", remote_id)?;
        for (name, value) in fields.iter() {
            note.fields.insert(name, value);
        }
        Ok(())
    }

    async fn update_note_tags(&self, remote_id: u64, tags: &BTreeSet<String>) -> Result<()> {
        let mut state = self.enter("updateNoteTags").await?;
        let note = state.note_mut("updateNoteTags", remote_id)?;
        note.tags = tags.clone();
        Ok(())
    }

    async fn delete_notes(&self, remote_ids: &[u64]) -> Result<()> {
        let mut state = self.enter("deleteNotes").await?;
        for remote_id in remote_ids {
            state.notes.remove(remote_id);
        }
        Ok(())
    }

    async fn store_media_file(&self, local: &Path, remote_name: &str) -> Result<()> {
        let mut state = self.enter("storeMediaFile").await?;
        if !local.is_file() {
            return Err(RemoteError::new(
                "storeMediaFile",
                RemoteErrorKind::Rejected,
                format!("{:?} is not a file", local.display()),
            ));
        }
        state.media.insert(remote_name.to_string(), local.to_path_buf());
        Ok(())
    }

    async fn sync(&self) -> Result<()> {
        let mut state = self.enter("sync").await?;
        state.syncs += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn memory_store_round_trip() -> anyhow::Result<()> {
        let store = MemoryStore::new().with_models(["Basic"]);
        store.create_deck("Spanish").await?;
        let fields = NoteFields::from_names_and_values(["Front", "Back"], ["Q1", "A1"]);
        let tags = BTreeSet::from(["id::n1".to_string()]);

        let remote_id = store.add_note("Spanish", "Basic", &fields, &tags).await?;
        let notes = store.list_notes("Spanish").await?;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].remote_id, remote_id);
        assert_eq!(notes[0].identity(), Some("n1"));
        assert!(store.list_notes("French").await?.is_empty());

        store.delete_notes(&[remote_id]).await?;
        assert!(store.notes("Spanish").is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn memory_store_reports_missing_note_and_injected_failure() {
        let store = MemoryStore::new();
        let result = store.update_note_fields(7, &NoteFields::new()).await;
        assert_eq!(result.map_err(|error| error.kind), Err(RemoteErrorKind::NoteNotFound));

        store.fail_next("sync", RemoteErrorKind::Transport);
        assert!(store.sync().await.is_err());
        assert!(store.sync().await.is_ok());
        assert_eq!(store.sync_count(), 1);
    }
}
