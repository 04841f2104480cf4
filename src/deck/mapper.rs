// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Raw record to note mapping.
//!
//! Deck sources describe notes as loosely keyed records: field names are
//! matched without regard to case, and values may be any scalar. The mapper
//! aligns such a record to the declared fields of a note model.
//!
//! # Reserved Keys
//!
//! A few keys of a raw record are not fields:
//!
//! - `id` (or `note_id`): stable identity of the note.
//! - `tags`: single tag or list of tags.
//! - `model` (or `type`): name of the note model to use.
//! - `_deleted`: truthy value marks the note for forced deletion.

use crate::{
    deck::model::ModelSet,
    note::{NoteFields, NoteRecord},
};

use std::collections::{BTreeSet, HashMap};
use toml::{Table, Value};

/// Raw record as written in a deck source.
pub type RawRecord = Table;

/// Align raw record values to model field names.
///
/// Looks up each declared field name in the raw record without regard to
/// case. Missing fields map to the empty string, and every value is coerced
/// to text. The result always has exactly one entry per field name.
pub fn map_fields(model_fields: &[String], raw: &RawRecord) -> Vec<String> {
    let lowered = lowercase_keys(raw);
    model_fields
        .iter()
        .map(|field| {
            lowered
                .get(field.to_lowercase().as_str())
                .map(|value| value_to_text(value))
                .unwrap_or_default()
        })
        .collect()
}

/// Build desired note from raw record.
///
/// Picks the note model named by the record, falling back to the default
/// model of `models` when the name is unknown. Returns `None` only if
/// `models` is empty.
pub fn note_from_record(models: &ModelSet, raw: &RawRecord) -> Option<NoteRecord> {
    let lowered = lowercase_keys(raw);
    let model_name = lowered
        .get("model")
        .or_else(|| lowered.get("type"))
        .map(|value| value_to_text(value));
    let model = models.resolve(model_name.as_deref())?;

    let values = map_fields(&model.fields, raw);
    let fields = NoteFields::from_names_and_values(&model.fields, values);
    let mut note = NoteRecord::new(&model.name, fields);

    note.identity = lowered
        .get("id")
        .or_else(|| lowered.get("note_id"))
        .map(|value| value_to_text(value))
        .map(|identity| identity.trim().to_string())
        .filter(|identity| !identity.is_empty());
    note.tags = lowered
        .get("tags")
        .map(|value| tags_from_value(value))
        .unwrap_or_default();
    note.deleted = lowered.get("_deleted").is_some_and(is_truthy);

    Some(note)
}

/// Render raw value as field text.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Integer(number) => number.to_string(),
        Value::Float(number) => number.to_string(),
        Value::Boolean(flag) => flag.to_string(),
        Value::Datetime(datetime) => datetime.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Table(table) => table.to_string().trim_end().to_string(),
    }
}

fn lowercase_keys(raw: &RawRecord) -> HashMap<String, &Value> {
    raw.iter()
        .map(|(key, value)| (key.to_lowercase(), value))
        .collect()
}

fn tags_from_value(value: &Value) -> BTreeSet<String> {
    let tags = match value {
        Value::Array(items) => items.iter().map(value_to_text).collect::<Vec<_>>(),
        other => vec![value_to_text(other)],
    };

    tags.into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}

fn is_truthy(value: &&Value) -> bool {
    match value {
        Value::Boolean(flag) => *flag,
        Value::Integer(number) => *number != 0,
        Value::String(text) => matches!(text.to_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::model::NoteModel;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn record(toml: &str) -> RawRecord {
        toml.parse::<Table>().unwrap()
    }

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn map_fields_defaults_missing_to_empty() {
        let raw = record(r#"front = "What is 2 + 2?""#);
        let result = map_fields(&fields(&["Front", "Back"]), &raw);
        assert_eq!(result, vec!["What is 2 + 2?".to_string(), String::new()]);
    }

    #[test]
    fn map_fields_ignores_key_case_and_coerces_text() {
        let raw = record(indoc! {r#"
            FRONT = 4
            bAcK = true
            Extra = [1, "two"]
            unused = "dropped"
        "#});

        let result = map_fields(&fields(&["Front", "Back", "extra"]), &raw);
        assert_eq!(result, fields(&["4", "true", "1, two"]));
    }

    #[test]
    fn note_from_record_reads_reserved_keys() {
        let models = ModelSet::new([
            NoteModel {
                name: "Basic".into(),
                fields: fields(&["Front", "Back"]),
                ..Default::default()
            },
            NoteModel {
                name: "Vocab".into(),
                fields: fields(&["Word", "Meaning"]),
                ..Default::default()
            },
        ]);
        let raw = record(indoc! {r#"
            id = 17
            model = "Vocab"
            word = "gato"
            meaning = "cat"
            tags = ["animals", " ", "spanish"]
            _deleted = true
        "#});

        let result = note_from_record(&models, &raw).unwrap();
        let expect = NoteRecord::new(
            "Vocab",
            NoteFields::from_names_and_values(["Word", "Meaning"], ["gato", "cat"]),
        )
        .with_identity("17")
        .with_tags(["animals", "spanish"])
        .deleted();
        assert_eq!(result, expect);
    }

    #[test]
    fn note_from_record_falls_back_to_default_model() {
        let models = ModelSet::new([NoteModel {
            name: "Basic".into(),
            fields: fields(&["Front", "Back"]),
            ..Default::default()
        }]);
        let raw = record(indoc! {r#"
            type = "Missing"
            front = "Q"
            tags = "single"
        "#});

        let result = note_from_record(&models, &raw).unwrap();
        assert_eq!(result.model_name, "Basic");
        assert_eq!(result.identity, None);
        assert_eq!(result.tags.into_iter().collect::<Vec<_>>(), vec!["single".to_string()]);
        assert!(!result.deleted);
    }

    #[test]
    fn note_from_record_needs_a_model() {
        let raw = record(r#"front = "Q""#);
        assert_eq!(note_from_record(&ModelSet::default(), &raw), None);
    }
}
