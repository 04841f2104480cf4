// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Deck source loading.
//!
//! A __deck source__ is a TOML file describing one deck: its optional name,
//! optional media folder, the note models it uses, and its notes.
//!
//! # General Layout
//!
//! ```toml
//! deck-name = "Spanish::Verbs"
//! media-folder = "media"
//! include = ["shared/models.toml"]
//!
//! [[model]]
//! name = "Basic"
//! fields = ["Front", "Back"]
//!
//! [[model.templates]]
//! name = "Card 1"
//! qfmt = "{{Front}}"
//! afmt = "{{Back}}"
//!
//! [[notes]]
//! id = "n1"
//! front = "hablar"
//! back = "to speak"
//! ```
//!
//! # Includes
//!
//! A source may list other TOML fragments under `include`. Paths are
//! resolved relative to the file that names them. Included fragments may
//! contribute models and notes, and may include further fragments. Their
//! models and notes are appended after those of the including file.
//!
//! Every recursive load receives an explicit [`LoadContext`] carrying the
//! base directory and the chain of files currently being loaded, so loads
//! never share state and include cycles are detected.

use crate::deck::{mapper::RawRecord, model::{ModelError, ModelSet, NoteModel}};

use serde::Deserialize;
use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Deck source file layout.
#[derive(Default, Debug, PartialEq, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeckFile {
    /// Name of the deck declared by the source.
    pub deck_name: Option<String>,

    /// Media folder relative to the source file.
    pub media_folder: Option<PathBuf>,

    /// Other fragments to merge into this source.
    #[serde(default)]
    pub include: Vec<PathBuf>,

    /// Note models declared by the source.
    #[serde(default, rename = "model")]
    pub models: Vec<NoteModel>,

    /// Raw note records.
    #[serde(default)]
    pub notes: Vec<RawRecord>,
}

/// Fully loaded deck source.
///
/// Includes are resolved, models are checked, and at least one note exists.
#[derive(Debug, PartialEq, Clone)]
pub struct DeckSource {
    /// Path of the top-level source file.
    pub path: PathBuf,

    /// Name of the deck declared by the source.
    pub deck_name: Option<String>,

    /// Existing media folder, resolved against the source file.
    pub media_dir: Option<PathBuf>,

    /// Note models, first one being the default.
    pub models: ModelSet,

    /// Raw note records in source order.
    pub notes: Vec<RawRecord>,
}

/// State threaded through one recursive load.
#[derive(Debug, Clone)]
pub struct LoadContext {
    base_dir: PathBuf,
    chain: Vec<PathBuf>,
}

impl LoadContext {
    /// Construct context for loading a top-level file.
    pub fn for_file(path: &Path) -> Self {
        Self {
            base_dir: parent_dir(path),
            chain: Vec::new(),
        }
    }

    /// Directory relative paths are resolved against.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve path relative to current base directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Enter a file, producing the context used for its own includes.
    fn enter(&self, path: &Path) -> Result<Self> {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if self.chain.contains(&key) {
            return Err(LoadError::IncludeCycle { path: path.to_path_buf() });
        }

        let mut chain = self.chain.clone();
        chain.push(key);
        Ok(Self {
            base_dir: parent_dir(path),
            chain,
        })
    }
}

impl DeckSource {
    /// Load deck source from file.
    ///
    /// # Errors
    ///
    /// - Return [`LoadError::Read`] if the source or an include cannot be read.
    /// - Return [`LoadError::Parse`] if TOML is malformed.
    /// - Return [`LoadError::IncludeCycle`] if includes loop back.
    /// - Return [`LoadError::NoModels`] or [`LoadError::NoNotes`] if the
    ///   merged source lacks models or notes.
    /// - Return [`LoadError::Model`] if a model layout is invalid.
    #[instrument(skip(path), level = "debug")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("load deck source {:?}", path.display());
        let context = LoadContext::for_file(path);
        let file = load_file(&context, path)?;

        let mut models = ModelSet::default();
        for model in file.models {
            model.check().map_err(|source| LoadError::Model {
                path: path.to_path_buf(),
                source,
            })?;
            if !models.push(model.clone()) {
                warn!("{}: duplicate model {:?} ignored", path.display(), model.name);
            }
        }

        if models.is_empty() {
            return Err(LoadError::NoModels { path: path.to_path_buf() });
        }

        if file.notes.is_empty() {
            return Err(LoadError::NoNotes { path: path.to_path_buf() });
        }

        let media_dir = file.media_folder.filter(|folder| {
            let exists = folder.is_dir();
            if !exists {
                warn!("media folder {:?} does not exist", folder.display());
            }
            exists
        });

        Ok(Self {
            path: path.to_path_buf(),
            deck_name: file.deck_name.filter(|name| !name.trim().is_empty()),
            media_dir,
            models,
            notes: file.notes,
        })
    }
}

impl std::str::FromStr for DeckFile {
    type Err = toml::de::Error;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        toml::de::from_str(data)
    }
}

/// Load one file and merge its includes, recursively.
fn load_file(context: &LoadContext, path: &Path) -> Result<DeckFile> {
    let inner = context.enter(path)?;
    let data = read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut file: DeckFile = data.parse().map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source: Box::new(source),
    })?;

    // INVARIANT: Media folder is relative to the file that declares it.
    file.media_folder = file.media_folder.map(|folder| inner.resolve(&folder));

    for include in std::mem::take(&mut file.include) {
        let include_path = inner.resolve(&include);
        debug!("include {:?} from {:?}", include_path.display(), path.display());
        let fragment = load_file(&inner, &include_path)?;
        file.models.extend(fragment.models);
        file.notes.extend(fragment.notes);
        if file.media_folder.is_none() {
            file.media_folder = fragment.media_folder;
        }
    }

    Ok(file)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Deck source loading error types.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Source file cannot be read.
    #[error("failed to read deck source {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Source file is not valid TOML for a deck.
    #[error("failed to parse deck source {:?}", path.display())]
    Parse {
        #[source]
        source: Box<toml::de::Error>,
        path: PathBuf,
    },

    /// Includes loop back onto a file already being loaded.
    #[error("include cycle through {:?}", path.display())]
    IncludeCycle { path: PathBuf },

    /// Note model layout is invalid.
    #[error("invalid note model in {:?}", path.display())]
    Model {
        #[source]
        source: ModelError,
        path: PathBuf,
    },

    /// No note model declared.
    #[error("deck source {:?} declares no note model", path.display())]
    NoModels { path: PathBuf },

    /// No notes declared.
    #[error("deck source {:?} declares no notes", path.display())]
    NoNotes { path: PathBuf },
}

/// Friendly result alias :3
pub type Result<T, E = LoadError> = std::result::Result<T, E>;
