// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Note representation.
//!
//! A __note__ is one row of a deck: a set of field values bound to a note
//! model, plus tags. Each card in the remote collection is rendered from a
//! note through the templates of its model.
//!
//! Notes described by a local deck source are __desired__ notes
//! ([`NoteRecord`]). Notes fetched from the remote collection are
//! __actual__ notes, see [`RemoteNote`](crate::sync::remote::RemoteNote).
//!
//! # Identity
//!
//! A desired note may carry a stable __identity__ chosen by the author. When
//! a note with an identity is created remotely, it is tagged with
//! [`IDENTITY_TAG_PREFIX`] followed by the identity, so that later passes can
//! find it again.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Tag prefix used to record a note's identity in the remote collection.
pub const IDENTITY_TAG_PREFIX: &str = "id::";

/// Ordered field name to value mapping.
///
/// # Invariant
///
/// - Order of entries follows the declared field order of the note model.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct NoteFields(Vec<(String, String)>);

impl NoteFields {
    /// Construct new empty field mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair field names with values.
    ///
    /// Extra values are dropped, missing values become empty strings.
    pub fn from_names_and_values(
        names: impl IntoIterator<Item = impl Into<String>>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut values = values.into_iter();
        let entries = names
            .into_iter()
            .map(|name| {
                let value = values.next().map(Into::into).unwrap_or_default();
                (name.into(), value)
            })
            .collect();

        Self(entries)
    }

    /// Append field, or overwrite it in place if it already exists.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((name, value)),
        }
    }

    /// Lookup field value by exact name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Iterate field names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    /// Iterate field values in order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(_, value)| value.as_str())
    }

    /// Iterate name and value pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Reorder into the given field names.
    ///
    /// Fields missing from `self` come out empty, fields not named are
    /// dropped. Used to compare notes whose fields were written in a
    /// different order.
    pub fn project<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Self {
        let entries = names
            .into_iter()
            .map(|name| {
                (
                    name.to_string(),
                    self.get(name).unwrap_or_default().to_string(),
                )
            })
            .collect();

        Self(entries)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Desired note described by a local deck source.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct NoteRecord {
    /// Stable identity chosen by the author, if any.
    pub identity: Option<String>,

    /// Name of the note model this note uses.
    pub model_name: String,

    /// Field values in model field order.
    pub fields: NoteFields,

    /// Tags of the note, without the identity tag.
    pub tags: BTreeSet<String>,

    /// Note was marked for removal by its source.
    #[serde(default)]
    pub deleted: bool,
}

impl NoteRecord {
    /// Construct new note record.
    pub fn new(model_name: impl Into<String>, fields: NoteFields) -> Self {
        Self {
            identity: None,
            model_name: model_name.into(),
            fields,
            tags: BTreeSet::new(),
            deleted: false,
        }
    }

    /// Attach identity.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Attach tags.
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Mark note for forced deletion.
    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    /// Tags to store remotely, including the identity tag.
    pub fn remote_tags(&self) -> BTreeSet<String> {
        let mut tags = self.tags.clone();
        if let Some(identity) = &self.identity {
            tags.insert(identity_tag(identity));
        }

        tags
    }
}

/// Render identity as a remote tag.
pub fn identity_tag(identity: &str) -> String {
    format!("{IDENTITY_TAG_PREFIX}{identity}")
}

/// Extract identity from a remote tag, if the tag is an identity tag.
pub fn identity_from_tag(tag: &str) -> Option<&str> {
    tag.strip_prefix(IDENTITY_TAG_PREFIX)
        .filter(|identity| !identity.is_empty())
}

/// Strip identity tags out of a tag set.
pub fn content_tags<'a>(tags: impl IntoIterator<Item = &'a String>) -> BTreeSet<String> {
    tags.into_iter()
        .filter(|tag| identity_from_tag(tag).is_none())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn note_fields_project_follows_given_order() {
        let mut fields = NoteFields::new();
        fields.insert("Back", "A1");
        fields.insert("Front", "Q1");

        let result = fields.project(["Front", "Back", "Extra"]);
        let expect = NoteFields::from_names_and_values(["Front", "Back", "Extra"], ["Q1", "A1", ""]);
        assert_eq!(result, expect);
    }

    #[test]
    fn note_fields_insert_overwrites_in_place() {
        let mut fields = NoteFields::from_names_and_values(["Front", "Back"], ["Q1", "A1"]);
        fields.insert("Front", "Q2");
        assert_eq!(fields.values().collect::<Vec<_>>(), vec!["Q2", "A1"]);
    }

    #[test]
    fn remote_tags_carry_identity() {
        let note = NoteRecord::new("Basic", NoteFields::new())
            .with_identity("n1")
            .with_tags(["verbs"]);

        let result = note.remote_tags().into_iter().collect::<Vec<_>>();
        assert_eq!(result, vec!["id::n1".to_string(), "verbs".to_string()]);
    }

    #[test]
    fn content_tags_drop_identity_tags() {
        let tags: BTreeSet<String> = ["id::n1", "verbs", "id::"]
            .into_iter()
            .map(String::from)
            .collect();

        let result = content_tags(&tags);
        assert_eq!(
            result.into_iter().collect::<Vec<_>>(),
            vec!["id::".to_string(), "verbs".to_string()]
        );
    }
}
