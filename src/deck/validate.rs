// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Non-fatal checks over a loaded deck source.
//!
//! Nothing reported here stops a build. Findings are surfaced as warnings
//! during builds and listed by the `check` command.

use crate::deck::{
    mapper::{value_to_text, RawRecord},
    source::DeckSource,
};

use std::{
    collections::HashMap,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Single finding about a deck source.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Finding {
    /// Two rows claim the same identity.
    DuplicateIdentity {
        identity: String,
        first: usize,
        second: usize,
    },

    /// Row names a model the source does not declare.
    UnknownModel { row: usize, model: String },

    /// Row lacks values for some fields of its model.
    MissingFields {
        row: usize,
        model: String,
        fields: Vec<String>,
    },
}

impl Display for Finding {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::DuplicateIdentity {
                identity,
                first,
                second,
            } => write!(fmt, "note #{second} reuses id {identity:?} of note #{first}"),
            Self::UnknownModel { row, model } => {
                write!(fmt, "note #{row} names unknown model {model:?}")
            }
            Self::MissingFields { row, model, fields } => write!(
                fmt,
                "note #{row} ({model}) has no value for {}",
                fields.join(", ")
            ),
        }
    }
}

/// Check every raw note row of a deck source.
///
/// Row numbers in findings start at 1.
pub fn validate(source: &DeckSource) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut identities: HashMap<String, usize> = HashMap::new();

    for (index, raw) in source.notes.iter().enumerate() {
        let row = index + 1;
        let lowered = lowered_text(raw);

        if let Some(identity) = lowered
            .get("id")
            .or_else(|| lowered.get("note_id"))
            .map(|identity| identity.trim())
            .filter(|identity| !identity.is_empty())
        {
            match identities.get(identity) {
                Some(first) => findings.push(Finding::DuplicateIdentity {
                    identity: identity.to_string(),
                    first: *first,
                    second: row,
                }),
                None => {
                    identities.insert(identity.to_string(), row);
                }
            }
        }

        let requested = lowered.get("model").or_else(|| lowered.get("type"));
        let model = match requested {
            Some(name) => match source.models.get(name) {
                Some(model) => model,
                None => {
                    findings.push(Finding::UnknownModel {
                        row,
                        model: name.clone(),
                    });
                    continue;
                }
            },
            None => match source.models.default_model() {
                Some(model) => model,
                None => continue,
            },
        };

        let missing = model
            .fields
            .iter()
            .filter(|field| {
                lowered
                    .get(&field.to_lowercase())
                    .is_none_or(|value| value.trim().is_empty())
            })
            .cloned()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            findings.push(Finding::MissingFields {
                row,
                model: model.name.clone(),
                fields: missing,
            });
        }
    }

    findings
}

fn lowered_text(raw: &RawRecord) -> HashMap<String, String> {
    raw.iter()
        .map(|(key, value)| (key.to_lowercase(), value_to_text(value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::model::{ModelSet, NoteModel};
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn source(notes: &str) -> DeckSource {
        let table: toml::Table = notes.parse().unwrap();
        let notes = table["notes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row.as_table().unwrap().clone())
            .collect();

        DeckSource {
            path: PathBuf::from("deck.toml"),
            deck_name: None,
            media_dir: None,
            models: ModelSet::new([NoteModel {
                name: "Basic".into(),
                fields: vec!["Front".into(), "Back".into()],
                ..Default::default()
            }]),
            notes,
        }
    }

    #[test]
    fn validate_reports_each_kind_of_finding() {
        let source = source(indoc! {r#"
            [[notes]]
            id = "n1"
            front = "Q1"
            back = "A1"

            [[notes]]
            id = "n1"
            front = "Q2"
            back = ""

            [[notes]]
            model = "Cloze"
            text = "{{c1::x}}"
        "#});

        let result = validate(&source);
        let expect = vec![
            Finding::DuplicateIdentity {
                identity: "n1".into(),
                first: 1,
                second: 2,
            },
            Finding::MissingFields {
                row: 2,
                model: "Basic".into(),
                fields: vec!["Back".into()],
            },
            Finding::UnknownModel {
                row: 3,
                model: "Cloze".into(),
            },
        ];
        assert_eq!(result, expect);
        assert_eq!(result[0].to_string(), r#"note #2 reuses id "n1" of note #1"#);
    }

    #[test]
    fn validate_accepts_clean_source() {
        let source = source(indoc! {r#"
            [[notes]]
            id = 1
            FRONT = "Q1"
            back = "A1"

            [[notes]]
            note_id = 2
            front = "Q2"
            back = "A2"
        "#});

        assert!(validate(&source).is_empty());
    }
}
