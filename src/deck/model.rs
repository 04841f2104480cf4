// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Note model layout.
///
/// A __note model__ declares the ordered field names every note of the model
/// carries, and the card templates used to render those fields.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct NoteModel {
    /// Name of the model.
    pub name: String,

    /// Declared field names, in order.
    pub fields: Vec<String>,

    /// Card templates rendered from the fields.
    #[serde(default)]
    pub templates: Vec<CardTemplate>,

    /// Styling shared by every card of the model.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub css: String,
}

impl NoteModel {
    /// Check model layout.
    ///
    /// # Errors
    ///
    /// - Return [`ModelError::EmptyName`] if model has no name.
    /// - Return [`ModelError::NoFields`] if model declares no fields.
    /// - Return [`ModelError::EmptyField`] if a field name is blank.
    /// - Return [`ModelError::DuplicateField`] if a field name repeats.
    pub fn check(&self) -> Result<(), ModelError> {
        if self.name.trim().is_empty() {
            return Err(ModelError::EmptyName);
        }

        if self.fields.is_empty() {
            return Err(ModelError::NoFields {
                model: self.name.clone(),
            });
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            let field = field.trim();
            if field.is_empty() {
                return Err(ModelError::EmptyField {
                    model: self.name.clone(),
                });
            }

            if !seen.insert(field.to_lowercase()) {
                return Err(ModelError::DuplicateField {
                    model: self.name.clone(),
                    field: field.to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Card template of a note model.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct CardTemplate {
    pub name: String,

    /// Question side.
    pub qfmt: String,

    /// Answer side.
    pub afmt: String,
}

/// Ordered set of note models available to a deck.
///
/// # Invariant
///
/// - The first model is the default model.
/// - No two models share a name.
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct ModelSet {
    models: Vec<NoteModel>,
}

impl ModelSet {
    /// Construct new model set.
    ///
    /// Later models sharing a name with an earlier model are dropped.
    pub fn new(models: impl IntoIterator<Item = NoteModel>) -> Self {
        let mut set = Self::default();
        for model in models {
            set.push(model);
        }

        set
    }

    /// Add model unless a model with the same name is already present.
    ///
    /// Returns `true` if the model was added.
    pub fn push(&mut self, model: NoteModel) -> bool {
        if self.get(&model.name).is_some() {
            return false;
        }

        self.models.push(model);
        true
    }

    /// Lookup model by exact name.
    pub fn get(&self, name: &str) -> Option<&NoteModel> {
        self.models.iter().find(|model| model.name == name)
    }

    /// Default model of the set.
    pub fn default_model(&self) -> Option<&NoteModel> {
        self.models.first()
    }

    /// Pick model by name, falling back to the default model.
    ///
    /// An unknown name is a mapping error: it is logged and the default model
    /// is used instead. Returns `None` only if the set is empty.
    pub fn resolve(&self, name: Option<&str>) -> Option<&NoteModel> {
        match name {
            None => self.default_model(),
            Some(name) => match self.get(name) {
                Some(model) => Some(model),
                None => {
                    let default = self.default_model()?;
                    warn!(
                        "model {name:?} not found (available: {}), defaulting to {:?}",
                        self.names().collect::<Vec<_>>().join(", "),
                        default.name
                    );
                    Some(default)
                }
            },
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|model| model.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &NoteModel> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn into_vec(self) -> Vec<NoteModel> {
        self.models
    }
}

/// Note model layout errors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("note model has no name")]
    EmptyName,

    #[error("note model {model:?} declares no fields")]
    NoFields { model: String },

    #[error("note model {model:?} declares a blank field name")]
    EmptyField { model: String },

    #[error("note model {model:?} declares field {field:?} more than once")]
    DuplicateField { model: String, field: String },
}
