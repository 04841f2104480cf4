// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Deck packaging.
//!
//! A built deck is written out as a single __artifact__ file that can later
//! be pushed to the remote collection. The encoding of the artifact belongs
//! to a [`DeckPackager`]; the rest of the crate only hands it a
//! [`DeckBundle`] and a destination path.

use crate::{deck::model::NoteModel, note::NoteRecord};

use serde::{Deserialize, Serialize};
use std::{
    fs::{read, write},
    path::{Path, PathBuf},
};

/// Everything needed to materialize one deck remotely.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct DeckBundle {
    /// Resolved name of the deck.
    pub deck_name: String,

    /// Note models used by the notes.
    pub models: Vec<NoteModel>,

    /// Desired notes in source order.
    pub notes: Vec<NoteRecord>,

    /// Folder holding media referenced by the notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_dir: Option<PathBuf>,
}

/// Layer of indirection for artifact encoding.
pub trait DeckPackager: Send + Sync + 'static {
    /// Write bundle to artifact at `output`.
    fn write(&self, bundle: &DeckBundle, output: &Path) -> Result<()>;

    /// Read bundle back from artifact at `path`.
    fn read(&self, path: &Path) -> Result<DeckBundle>;

    /// File extension of produced artifacts, without leading dot.
    fn extension(&self) -> &'static str;
}

/// Artifact encoding as pretty-printed JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonPackager;

impl DeckPackager for JsonPackager {
    fn write(&self, bundle: &DeckBundle, output: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(bundle).map_err(PackageError::Encode)?;
        write(output, data).map_err(|source| PackageError::Write {
            source,
            path: output.to_path_buf(),
        })
    }

    fn read(&self, path: &Path) -> Result<DeckBundle> {
        let data = read(path).map_err(|source| PackageError::Read {
            source,
            path: path.to_path_buf(),
        })?;
        serde_json::from_slice(&data).map_err(PackageError::Decode)
    }

    fn extension(&self) -> &'static str {
        "deck.json"
    }
}

/// Artifact file name for a deck.
///
/// Namespace separators and whitespace are flattened to underscores so the
/// name is safe as a single path component.
pub fn artifact_file_name(deck_name: &str, extension: &str) -> String {
    let stem = deck_name
        .replace("::", "_")
        .chars()
        .map(|c| match c {
            c if c.is_whitespace() => '_',
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect::<String>();
    let stem = if stem.is_empty() { "deck".to_string() } else { stem };

    format!("{stem}.{extension}")
}

/// Artifact packaging error types.
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("failed to encode deck bundle")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode deck bundle")]
    Decode(#[source] serde_json::Error),

    #[error("failed to write artifact {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("failed to read artifact {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = PackageError> = std::result::Result<T, E>;
