// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Deck domain representation.
//!
//! A __deck__ is a named collection of notes that lives in the remote
//! flashcard collection. Locally, a deck is described by a __deck source__,
//! a TOML file listing note models and raw note rows.
//!
//! # Building
//!
//! Building a deck turns a deck source into an __artifact__:
//!
//! 1. Resolve the deck name (see [`resolve_deck_name`]).
//! 2. Map every raw row onto its note model (see [`mapper`]).
//! 3. Report non-fatal findings (see [`validate`]) and missing media.
//! 4. Hand the resulting [`DeckBundle`] to a [`DeckPackager`].
//!
//! Pushing an artifact to the remote collection is handled by
//! [`crate::sync`].
//!
//! # See Also
//!
//! 1. [`source`]
//! 2. [`package`]

pub mod mapper;
pub mod media;
pub mod model;
pub mod package;
pub mod source;
pub mod validate;

use crate::deck::{
    mapper::note_from_record,
    media::{locate_media, media_references},
    package::{artifact_file_name, DeckBundle, DeckPackager},
    source::DeckSource,
    validate::validate,
};

use std::{
    collections::BTreeSet,
    fs::create_dir_all,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Namespace separator of deck names.
pub const DECK_NAME_SEPARATOR: &str = "::";

/// Deck name used for merged builds without an explicit name.
pub const MERGED_DECK_NAME: &str = "Merged Deck";

/// Options for a single deck build.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct BuildOptions {
    /// Directory artifacts are written to.
    pub output_dir: PathBuf,

    /// Explicit deck name, beating every other naming rule.
    pub name_override: Option<String>,

    /// Root for hierarchical deck names.
    pub scan_root: Option<PathBuf>,
}

/// Result of a successful deck build.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BuildOutput {
    /// Path of the written artifact.
    pub artifact: PathBuf,

    /// Resolved deck name.
    pub deck_name: String,

    /// Number of notes packaged.
    pub notes: usize,

    /// Bundle written to the artifact.
    pub bundle: DeckBundle,
}

/// Resolve name of deck built from source at `path`.
///
/// Priority order:
///
/// 1. Explicit `name_override`.
/// 2. Name `declared` inside the source.
/// 3. Hierarchical name from the source's directory relative to
///    `scan_root`, segments joined with `::`.
/// 4. File stem, or the parent directory name when the stem is `deck`.
pub fn resolve_deck_name(
    name_override: Option<&str>,
    declared: Option<&str>,
    path: &Path,
    scan_root: Option<&Path>,
) -> String {
    let pick = |name: Option<&str>| {
        name.map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
    };

    pick(name_override)
        .or_else(|| pick(declared))
        .or_else(|| scan_root.and_then(|root| hierarchical_name(path, root)))
        .unwrap_or_else(|| path_name(path))
}

/// Derive hierarchical deck name from path relative to `root`.
///
/// Returns `None` if the source sits directly in `root`, or outside of it.
pub fn hierarchical_name(path: &Path, root: &Path) -> Option<String> {
    let parent = path.parent()?;
    let relative = parent.strip_prefix(root).ok()?;
    let parts = relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy().into_owned())
        .filter(|part| part != ".")
        .collect::<Vec<_>>();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(DECK_NAME_SEPARATOR))
    }
}

/// Deck name derived from the source path alone.
pub fn path_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = path
        .parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned());

    match (stem.as_str(), parent) {
        ("deck", Some(parent)) => parent,
        ("", _) | ("deck", None) => "Deck".into(),
        (stem, _) => stem.to_string(),
    }
}

/// Merge many deck sources into one.
///
/// Rows are concatenated in order, models deduplicated by name (first one
/// wins), and the first existing media folder is kept. Returns `None` if no
/// source is given.
pub fn merge_sources(sources: impl IntoIterator<Item = DeckSource>) -> Option<DeckSource> {
    let mut sources = sources.into_iter();
    let mut merged = sources.next()?;
    merged.deck_name = None;

    for source in sources {
        for model in source.models.into_vec() {
            if let Some(existing) = merged.models.get(&model.name) {
                if existing.fields != model.fields {
                    warn!(
                        "model {:?} of {:?} differs from an earlier definition, keeping the first",
                        model.name,
                        source.path.display()
                    );
                }
                continue;
            }
            merged.models.push(model);
        }
        merged.notes.extend(source.notes);
        if merged.media_dir.is_none() {
            merged.media_dir = source.media_dir;
        }
    }

    Some(merged)
}

/// Map deck source into a bundle ready for packaging.
///
/// Validation findings and missing media are logged as warnings.
pub fn bundle_source(source: &DeckSource, deck_name: impl Into<String>) -> DeckBundle {
    let deck_name = deck_name.into();
    for finding in validate(source) {
        warn!("{}: {finding}", source.path.display());
    }

    let notes = source
        .notes
        .iter()
        .filter_map(|raw| note_from_record(&source.models, raw))
        .collect::<Vec<_>>();

    let refs = notes
        .iter()
        .flat_map(|note| note.fields.values().flat_map(media_references))
        .collect::<BTreeSet<_>>();
    report_media(&deck_name, source.media_dir.as_deref(), &refs);

    DeckBundle {
        deck_name,
        models: source.models.clone().into_vec(),
        notes,
        media_dir: source.media_dir.clone(),
    }
}

/// Resolve deck name and artifact path a build of `source` produces.
pub fn build_target(
    source: &DeckSource,
    options: &BuildOptions,
    packager: &dyn DeckPackager,
) -> (String, PathBuf) {
    let deck_name = resolve_deck_name(
        options.name_override.as_deref(),
        source.deck_name.as_deref(),
        &source.path,
        options.scan_root.as_deref(),
    );
    let artifact = options
        .output_dir
        .join(artifact_file_name(&deck_name, packager.extension()));

    (deck_name, artifact)
}

/// Build deck from loaded source.
///
/// Writes the artifact into `options.output_dir`, creating it if needed.
///
/// # Errors
///
/// - Return [`DeckError::OutputDir`] if output directory cannot be created.
/// - Return [`DeckError::Package`] if the artifact cannot be written.
#[instrument(skip(source, options, packager), level = "debug")]
pub fn build_deck(
    source: &DeckSource,
    options: &BuildOptions,
    packager: &dyn DeckPackager,
) -> Result<BuildOutput> {
    let (deck_name, artifact) = build_target(source, options, packager);
    debug!("build deck {deck_name:?} from {:?}", source.path.display());

    let bundle = bundle_source(source, deck_name.clone());
    create_dir_all(&options.output_dir).map_err(|source| DeckError::OutputDir {
        source,
        path: options.output_dir.clone(),
    })?;
    packager.write(&bundle, &artifact)?;
    info!(
        "built deck {deck_name:?} with {} notes to {:?}",
        bundle.notes.len(),
        artifact.display()
    );

    Ok(BuildOutput {
        artifact,
        deck_name,
        notes: bundle.notes.len(),
        bundle,
    })
}

/// Load deck source from file then build it.
pub fn build_deck_file(
    path: impl AsRef<Path>,
    options: &BuildOptions,
    packager: &dyn DeckPackager,
) -> Result<BuildOutput> {
    let source = DeckSource::load(path)?;
    build_deck(&source, options, packager)
}

fn report_media(deck_name: &str, media_dir: Option<&Path>, refs: &BTreeSet<String>) {
    if refs.is_empty() {
        return;
    }

    match media_dir {
        Some(dir) => {
            let (found, missing) = locate_media(dir, refs);
            debug!("deck {deck_name:?} references {} media files", found.len());
            for name in missing {
                warn!("deck {deck_name:?}: media file {name:?} not found in {:?}", dir.display());
            }
        }
        None => warn!(
            "deck {deck_name:?} references {} media files but has no media folder",
            refs.len()
        ),
    }
}

/// Deck build error types.
#[derive(Debug, thiserror::Error)]
pub enum DeckError {
    /// Deck source cannot be loaded.
    #[error(transparent)]
    Load(#[from] crate::deck::source::LoadError),

    /// Artifact cannot be written or read.
    #[error(transparent)]
    Package(#[from] crate::deck::package::PackageError),

    /// Output directory cannot be created.
    #[error("failed to create output directory {:?}", path.display())]
    OutputDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Another deck of the same run already writes this artifact.
    #[error("artifact {:?} is already written by deck {deck:?}", path.display())]
    ArtifactTaken { path: PathBuf, deck: String },
}

/// Friendly result alias :3
pub type Result<T, E = DeckError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::package::JsonPackager;
    use indoc::indoc;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;
    use std::fs::write;

    #[test_case(Some("Override"), Some("Declared"), "a/b/deck.toml", Some("a"), "Override"; "override wins")]
    #[test_case(Some("  "), Some("Declared"), "a/b/deck.toml", Some("a"), "Declared"; "blank override ignored")]
    #[test_case(None, None, "root/lang/spanish/deck.toml", Some("root"), "lang::spanish"; "hierarchical")]
    #[test_case(None, None, "root/deck.toml", Some("root"), "root"; "directly under root")]
    #[test_case(None, None, "decks/verbs.toml", None, "verbs"; "file stem")]
    #[test_case(None, None, "decks/spanish/deck.toml", None, "spanish"; "deck stem uses parent")]
    #[test_case(None, None, "deck.toml", None, "Deck"; "bare deck file")]
    #[test]
    fn resolve_deck_name_priority(
        name_override: Option<&str>,
        declared: Option<&str>,
        path: &str,
        root: Option<&str>,
        expect: &str,
    ) {
        let result = resolve_deck_name(name_override, declared, Path::new(path), root.map(Path::new));
        pretty_assertions::assert_eq!(result, expect);
    }

    #[sealed_test]
    fn build_deck_writes_artifact() -> anyhow::Result<()> {
        write(
            "deck.toml",
            indoc! {r#"
                deck-name = "Spanish::Verbs"

                [[model]]
                name = "Basic"
                fields = ["Front", "Back"]

                [[notes]]
                id = "n1"
                front = "hablar"
                back = "to speak"

                [[notes]]
                front = "comer"
            "#},
        )?;

        let options = BuildOptions {
            output_dir: PathBuf::from("out"),
            ..Default::default()
        };
        let output = build_deck_file("deck.toml", &options, &JsonPackager)?;
        pretty_assertions::assert_eq!(output.deck_name, "Spanish::Verbs");
        pretty_assertions::assert_eq!(output.notes, 2);
        pretty_assertions::assert_eq!(output.artifact, PathBuf::from("out/Spanish_Verbs.deck.json"));

        let bundle = JsonPackager.read(&output.artifact)?;
        pretty_assertions::assert_eq!(bundle.notes[0].identity.as_deref(), Some("n1"));
        pretty_assertions::assert_eq!(bundle.notes[1].fields.get("Back"), Some(""));

        Ok(())
    }

    #[sealed_test]
    fn merge_sources_dedupes_models_and_keeps_order() -> anyhow::Result<()> {
        let model = indoc! {r#"
            [[model]]
            name = "Basic"
            fields = ["Front", "Back"]
        "#};
        write("a.toml", format!("deck-name = \"A\"\n{model}\n[[notes]]\nfront = \"a\"\n"))?;
        write("b.toml", format!("{model}\n[[notes]]\nfront = \"b\"\n"))?;

        let sources = [DeckSource::load("a.toml")?, DeckSource::load("b.toml")?];
        let merged = merge_sources(sources).unwrap();
        pretty_assertions::assert_eq!(merged.deck_name, None);
        pretty_assertions::assert_eq!(merged.models.len(), 1);
        let fronts = merged
            .notes
            .iter()
            .map(|raw| raw["front"].as_str().unwrap_or_default())
            .collect::<Vec<_>>();
        pretty_assertions::assert_eq!(fronts, vec!["a", "b"]);
        pretty_assertions::assert_eq!(merge_sources(Vec::new()), None);

        Ok(())
    }
}
