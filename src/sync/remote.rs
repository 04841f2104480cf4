// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote collection interface.
//!
//! Everything the synchronization logic needs from the remote flashcard
//! collection goes through [`RemoteStore`]. Transport details stay behind
//! the trait, and failures come back as [`RemoteError`] classified once by
//! the implementation, so callers branch on [`RemoteErrorKind`] instead of
//! inspecting messages.

use crate::note::{content_tags, identity_from_tag, NoteFields};

use async_trait::async_trait;
use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter, Result as FmtResult},
    path::Path,
};

/// Note snapshot fetched from the remote collection.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct RemoteNote {
    /// Identifier assigned by the remote collection.
    pub remote_id: u64,

    /// Name of the note model the note uses.
    pub model_name: String,

    /// Field values in remote field order.
    pub fields: NoteFields,

    /// Tags as stored remotely, identity tag included.
    pub tags: BTreeSet<String>,
}

impl RemoteNote {
    /// Identity recorded in the note's identity tag, if any.
    pub fn identity(&self) -> Option<&str> {
        self.tags.iter().find_map(|tag| identity_from_tag(tag))
    }

    /// Tags without identity tags.
    pub fn content_tags(&self) -> BTreeSet<String> {
        content_tags(&self.tags)
    }
}

/// Classification of remote failures.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RemoteErrorKind {
    /// Targeted note no longer exists.
    NoteNotFound,

    /// Remote collection could not be reached.
    Transport,

    /// Remote collection refused the request.
    Rejected,

    /// Response could not be understood.
    Protocol,
}

impl Display for RemoteErrorKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let kind = match self {
            Self::NoteNotFound => "note not found",
            Self::Transport => "transport",
            Self::Rejected => "rejected",
            Self::Protocol => "protocol",
        };
        fmt.write_str(kind)
    }
}

/// Failed remote action.
#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
#[error("remote action {action:?} failed ({kind}): {message}")]
pub struct RemoteError {
    /// Name of the action that failed.
    pub action: String,

    pub kind: RemoteErrorKind,

    /// Message reported by the remote collection.
    pub message: String,
}

impl RemoteError {
    /// Construct new remote error.
    pub fn new(
        action: impl Into<String>,
        kind: RemoteErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            kind,
            message: message.into(),
        }
    }

    /// Targeted note no longer exists remotely.
    pub fn is_note_not_found(&self) -> bool {
        self.kind == RemoteErrorKind::NoteNotFound
    }
}

/// Layer of indirection for the remote flashcard collection.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Names of every deck in the collection.
    async fn deck_names(&self) -> Result<Vec<String>>;

    /// Names of every note model in the collection.
    async fn model_names(&self) -> Result<Vec<String>>;

    /// Create deck, doing nothing if it already exists.
    async fn create_deck(&self, deck: &str) -> Result<()>;

    /// Snapshot every note of a deck.
    async fn list_notes(&self, deck: &str) -> Result<Vec<RemoteNote>>;

    /// Create note, returning its remote identifier.
    async fn add_note(
        &self,
        deck: &str,
        model: &str,
        fields: &NoteFields,
        tags: &BTreeSet<String>,
    ) -> Result<u64>;

    /// Overwrite field values of a note.
    async fn update_note_fields(&self, remote_id: u64, fields: &NoteFields) -> Result<()>;

    /// Replace every tag of a note.
    async fn update_note_tags(&self, remote_id: u64, tags: &BTreeSet<String>) -> Result<()>;

    /// Delete notes.
    async fn delete_notes(&self, remote_ids: &[u64]) -> Result<()>;

    /// Copy local media file into the collection under `remote_name`.
    async fn store_media_file(&self, local: &Path, remote_name: &str) -> Result<()>;

    /// Trigger synchronization of the collection with its own upstream.
    async fn sync(&self) -> Result<()>;
}

/// Friendly result alias :3
pub type Result<T, E = RemoteError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn remote_note_reads_identity_tag() {
        let note = RemoteNote {
            remote_id: 42,
            tags: ["verbs".to_string(), "id::n1".to_string()].into(),
            ..Default::default()
        };

        assert_eq!(note.identity(), Some("n1"));
        assert_eq!(note.content_tags().into_iter().collect::<Vec<_>>(), vec!["verbs".to_string()]);
    }

    #[test]
    fn remote_error_display() {
        let error = RemoteError::new("updateNoteFields", RemoteErrorKind::NoteNotFound, "gone");
        assert!(error.is_note_not_found());
        assert_eq!(
            error.to_string(),
            r#"remote action "updateNoteFields" failed (note not found): gone"#
        );
    }
}
