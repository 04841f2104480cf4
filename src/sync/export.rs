// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote deck to deck source export.
//!
//! Exporting snapshots a deck of the remote collection and writes it back
//! out as a deck source, so an existing deck can be brought under version
//! control. Note models are rebuilt from the field layout of the notes that
//! use them, since the remote collection only reports model names. Card
//! templates and media files are not exported.
//!
//! Every exported note keeps its identity: the value of its `id::` tag if it
//! has one, or its remote identifier under `note_id` otherwise. Pushing the
//! exported source back therefore plans nothing but skips.

use crate::sync::remote::{RemoteError, RemoteNote, RemoteStore};

use std::collections::BTreeMap;
use toml::{Table, Value};
use tracing::{debug, warn};

/// Keys a note table reads as something other than a field.
const RESERVED_KEYS: [&str; 6] = ["id", "note_id", "tags", "model", "type", "_deleted"];

/// Export deck `deck` of the remote collection as deck source text.
///
/// # Errors
///
/// - Return [`ExportError::UnknownDeck`] if the remote collection has no
///   such deck.
/// - Return [`ExportError::Remote`] if deck, model, or note listing fails.
/// - Return [`ExportError::Encode`] if the deck source cannot be rendered.
pub async fn export_deck(store: &dyn RemoteStore, deck: &str) -> Result<String> {
    if !store.deck_names().await?.iter().any(|name| name == deck) {
        return Err(ExportError::UnknownDeck {
            deck: deck.to_string(),
        });
    }

    let known = store.model_names().await?;
    let notes = store.list_notes(deck).await?;
    debug!("exporting {} notes of deck {deck:?}", notes.len());

    let document = deck_document(deck, &known, &notes);
    Ok(toml::to_string(&document)?)
}

/// Lay out deck source document for a snapshot of remote notes.
///
/// Models follow the order of `known`, with models absent from `known`
/// appended in order of first use.
fn deck_document(deck: &str, known: &[String], notes: &[RemoteNote]) -> Table {
    let mut layouts: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    let mut unlisted = Vec::new();
    for note in notes {
        let name = note.model_name.as_str();
        if layouts.contains_key(name) {
            continue;
        }

        let fields = note.fields.names().map(str::to_string).collect::<Vec<_>>();
        for field in &fields {
            if RESERVED_KEYS.contains(&field.to_lowercase().as_str()) {
                warn!("field {field:?} of model {name:?} clashes with a reserved key");
            }
        }
        if !known.iter().any(|model| model == name) {
            warn!("model {name:?} is not listed by the remote collection");
            unlisted.push(name);
        }
        layouts.insert(name, fields);
    }

    let models = known
        .iter()
        .map(String::as_str)
        .chain(unlisted)
        .filter_map(|name| layouts.get(name).map(|fields| (name, fields)))
        .map(|(name, fields)| {
            let mut model = Table::new();
            model.insert("name".into(), Value::from(name));
            model.insert(
                "fields".into(),
                Value::Array(fields.iter().map(|field| Value::from(field.as_str())).collect()),
            );
            Value::Table(model)
        })
        .collect::<Vec<_>>();
    let default_model = models
        .first()
        .and_then(|model| model.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let records = notes
        .iter()
        .map(|note| Value::Table(note_table(note, default_model.as_deref())))
        .collect::<Vec<_>>();

    let mut document = Table::new();
    document.insert("deck-name".into(), Value::from(deck));
    document.insert("model".into(), Value::Array(models));
    document.insert("notes".into(), Value::Array(records));
    document
}

fn note_table(note: &RemoteNote, default_model: Option<&str>) -> Table {
    let mut table = Table::new();
    match note.identity() {
        Some(identity) => table.insert("id".into(), Value::from(identity)),
        None => table.insert("note_id".into(), Value::from(note.remote_id.to_string())),
    };

    if default_model != Some(note.model_name.as_str()) {
        table.insert("model".into(), Value::from(note.model_name.as_str()));
    }

    for (name, value) in note.fields.iter() {
        table.insert(name.to_string(), Value::from(value));
    }

    let tags = note.content_tags();
    if !tags.is_empty() {
        table.insert(
            "tags".into(),
            Value::Array(tags.into_iter().map(Value::from).collect()),
        );
    }

    table
}

/// Deck export error types.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Remote collection request failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Deck source cannot be rendered.
    #[error("failed to render deck source")]
    Encode(#[from] toml::ser::Error),

    /// Deck does not exist remotely.
    #[error("deck {deck:?} does not exist in the remote collection")]
    UnknownDeck { deck: String },
}

/// Friendly result alias :3
pub type Result<T, E = ExportError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        deck::{bundle_source, source::DeckSource},
        note::{identity_tag, NoteFields},
        sync::{memory::MemoryStore, push_deck, SyncStats},
    };
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::{collections::BTreeSet, fs::write};

    fn remote(model: &str, fields: &[(&str, &str)], tags: &[&str]) -> RemoteNote {
        RemoteNote {
            remote_id: 0,
            model_name: model.into(),
            fields: NoteFields::from_names_and_values(
                fields.iter().map(|(name, _)| *name),
                fields.iter().map(|(_, value)| *value),
            ),
            tags: tags.iter().map(|tag| tag.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn deck_document_keeps_identities_and_models() {
        let mut tagged = remote("Basic", &[("Front", "hola"), ("Back", "hello")], &["spanish"]);
        tagged.remote_id = 7;
        tagged.tags.insert(identity_tag("greet"));
        let mut bare = remote("Cloze", &[("Text", "{{c1::uno}}")], &[]);
        bare.remote_id = 9;

        let known = vec!["Cloze".to_string(), "Basic".to_string(), "Unused".to_string()];
        let document = deck_document("Spanish", &known, &[tagged, bare]);

        let models = document
            .get("model")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let names = models
            .iter()
            .filter_map(|model| model.get("name").and_then(Value::as_str))
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Cloze", "Basic"]);

        let notes = document
            .get("notes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        assert_eq!(notes[0].get("id").and_then(Value::as_str), Some("greet"));
        assert_eq!(notes[0].get("model").and_then(Value::as_str), Some("Basic"));
        assert_eq!(
            notes[0].get("tags"),
            Some(&Value::Array(vec![Value::from("spanish")]))
        );
        assert_eq!(notes[1].get("note_id").and_then(Value::as_str), Some("9"));
        assert_eq!(notes[1].get("model"), None);
        assert_eq!(notes[1].get("tags"), None);
    }

    #[tokio::test]
    async fn export_deck_rejects_unknown_deck() {
        let store = MemoryStore::new().with_models(["Basic"]);
        let result = export_deck(&store, "Nope").await;
        assert!(matches!(result, Err(ExportError::UnknownDeck { .. })));
    }

    #[sealed_test]
    fn exported_deck_pushes_back_unchanged() -> anyhow::Result<()> {
        let store = MemoryStore::new().with_models(["Basic"]);
        let mut tagged = remote("Basic", &[("Front", "hola"), ("Back", "hello")], &["spanish"]);
        tagged.tags.insert(identity_tag("greet"));
        store.insert_note("Spanish", tagged);
        store.insert_note(
            "Spanish",
            remote("Basic", &[("Front", "adiós"), ("Back", "bye\nfor now")], &[]),
        );

        let runtime = tokio::runtime::Runtime::new()?;
        let text = runtime.block_on(export_deck(&store, "Spanish"))?;
        write("spanish.toml", &text)?;

        let source = DeckSource::load("spanish.toml")?;
        assert_eq!(source.deck_name.as_deref(), Some("Spanish"));
        let bundle = bundle_source(&source, "Spanish");
        assert_eq!(bundle.notes.len(), 2);

        let stats = runtime.block_on(push_deck(&store, &bundle, true))?;
        assert_eq!(
            stats,
            SyncStats {
                unchanged: 2,
                ..Default::default()
            }
        );

        Ok(())
    }
}
