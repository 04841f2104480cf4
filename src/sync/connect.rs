// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! AnkiConnect client.
//!
//! AnkiConnect exposes the collection of a running Anki instance over HTTP.
//! Every request is a JSON object `{action, version, params}` posted to the
//! server, and every response is a JSON object `{result, error}` where a
//! non-null `error` means the action failed.
//!
//! # See Also
//!
//! - [AnkiConnect](https://git.sr.ht/~foosoft/anki-connect)

use crate::{
    note::NoteFields,
    sync::remote::{RemoteError, RemoteErrorKind, RemoteNote, RemoteStore, Result},
};

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    collections::{BTreeSet, HashMap},
    path::Path,
    time::Duration,
};
use tracing::{debug, instrument, trace};

/// Default address of the AnkiConnect server.
pub const DEFAULT_CONNECT_URL: &str = "http://127.0.0.1:8765";

/// Protocol version spoken by this client.
pub const CONNECT_VERSION: u8 = 6;

/// Remote collection reached through AnkiConnect.
#[derive(Debug, Clone)]
pub struct AnkiConnect {
    client: Client,
    url: String,
}

#[derive(Debug, Serialize)]
struct Request<'a> {
    action: &'a str,
    version: u8,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct Response<T> {
    result: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoteInfo {
    note_id: Option<u64>,
    #[serde(default)]
    model_name: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    fields: HashMap<String, FieldInfo>,
}

#[derive(Debug, Deserialize)]
struct FieldInfo {
    value: String,
    order: usize,
}

impl AnkiConnect {
    /// Construct new client talking to `url`.
    ///
    /// # Errors
    ///
    /// - Return [`RemoteErrorKind::Transport`] if the HTTP client cannot be
    ///   built.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|error| RemoteError::new("connect", RemoteErrorKind::Transport, error.to_string()))?;

        Ok(Self::with_client(client, url))
    }

    /// Construct new client from existing HTTP client.
    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Invoke action expecting a result.
    #[instrument(skip(self, params), level = "debug")]
    async fn invoke<T: DeserializeOwned>(&self, action: &str, params: Value) -> Result<T> {
        let response: Response<T> = self.post(action, params).await?;
        if let Some(message) = response.error {
            return Err(classify(action, message));
        }

        response.result.ok_or_else(|| {
            RemoteError::new(action, RemoteErrorKind::Protocol, "response carries no result")
        })
    }

    /// Invoke action whose result is meaningless.
    async fn invoke_unit(&self, action: &str, params: Value) -> Result<()> {
        let response: Response<Value> = self.post(action, params).await?;
        match response.error {
            Some(message) => Err(classify(action, message)),
            None => Ok(()),
        }
    }

    async fn post<T: DeserializeOwned>(&self, action: &str, params: Value) -> Result<Response<T>> {
        let request = Request {
            action,
            version: CONNECT_VERSION,
            params,
        };
        trace!("post {action} to {}", self.url);

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|error| RemoteError::new(action, RemoteErrorKind::Transport, error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::new(
                action,
                RemoteErrorKind::Transport,
                format!("server answered with status {status}"),
            ));
        }

        response
            .json::<Response<T>>()
            .await
            .map_err(|error| RemoteError::new(action, RemoteErrorKind::Protocol, error.to_string()))
    }
}

#[async_trait]
impl RemoteStore for AnkiConnect {
    async fn deck_names(&self) -> Result<Vec<String>> {
        self.invoke("deckNames", json!({})).await
    }

    async fn model_names(&self) -> Result<Vec<String>> {
        self.invoke("modelNames", json!({})).await
    }

    async fn create_deck(&self, deck: &str) -> Result<()> {
        let _: u64 = self.invoke("createDeck", json!({ "deck": deck })).await?;
        Ok(())
    }

    async fn list_notes(&self, deck: &str) -> Result<Vec<RemoteNote>> {
        let ids: Vec<u64> = self
            .invoke("findNotes", json!({ "query": deck_query(deck) }))
            .await?;
        debug!("deck {deck:?} holds {} notes", ids.len());
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let infos: Vec<NoteInfo> = self.invoke("notesInfo", json!({ "notes": ids })).await?;
        Ok(infos.into_iter().filter_map(NoteInfo::into_remote).collect())
    }

    async fn add_note(
        &self,
        deck: &str,
        model: &str,
        fields: &NoteFields,
        tags: &BTreeSet<String>,
    ) -> Result<u64> {
        let note = json!({
            "deckName": deck,
            "modelName": model,
            "fields": fields_object(fields),
            "tags": tags,
            "options": { "allowDuplicate": true },
        });
        self.invoke("addNote", json!({ "note": note })).await
    }

    async fn update_note_fields(&self, remote_id: u64, fields: &NoteFields) -> Result<()> {
        let note = json!({ "id": remote_id, "fields": fields_object(fields) });
        self.invoke_unit("updateNoteFields", json!({ "note": note }))
            .await
    }

    async fn update_note_tags(&self, remote_id: u64, tags: &BTreeSet<String>) -> Result<()> {
        self.invoke_unit("updateNoteTags", json!({ "note": remote_id, "tags": tags }))
            .await
    }

    async fn delete_notes(&self, remote_ids: &[u64]) -> Result<()> {
        self.invoke_unit("deleteNotes", json!({ "notes": remote_ids }))
            .await
    }

    async fn store_media_file(&self, local: &Path, remote_name: &str) -> Result<()> {
        let path = local.canonicalize().map_err(|error| {
            RemoteError::new("storeMediaFile", RemoteErrorKind::Rejected, error.to_string())
        })?;
        let params = json!({
            "filename": remote_name,
            "path": path.to_string_lossy(),
        });
        let _: String = self.invoke("storeMediaFile", params).await?;
        Ok(())
    }

    async fn sync(&self) -> Result<()> {
        self.invoke_unit("sync", json!({})).await
    }
}

impl NoteInfo {
    fn into_remote(self) -> Option<RemoteNote> {
        let remote_id = self.note_id?;
        let mut fields = self.fields.into_iter().collect::<Vec<_>>();
        fields.sort_by_key(|(_, info)| info.order);
        let (names, values): (Vec<_>, Vec<_>) = fields
            .into_iter()
            .map(|(name, info)| (name, info.value))
            .unzip();

        Some(RemoteNote {
            remote_id,
            model_name: self.model_name,
            fields: NoteFields::from_names_and_values(names, values),
            tags: self.tags.into_iter().collect(),
        })
    }
}

/// Search query selecting notes of exactly one deck, subdecks excluded.
pub fn deck_query(deck: &str) -> String {
    let escaped = escape_search(deck);
    format!("deck:\"{escaped}\" -deck:\"{escaped}::*\"")
}

fn escape_search(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '"' | '\\' | '*' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}

fn fields_object(fields: &NoteFields) -> Value {
    let object = fields
        .iter()
        .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
        .collect::<serde_json::Map<_, _>>();
    Value::Object(object)
}

/// Classify error message reported by AnkiConnect.
pub fn classify(action: &str, message: String) -> RemoteError {
    let lowered = message.to_lowercase();
    let missing_note = lowered.contains("invalid id")
        || (lowered.contains("note")
            && (lowered.contains("not found") || lowered.contains("does not exist")));
    let kind = if missing_note {
        RemoteErrorKind::NoteNotFound
    } else {
        RemoteErrorKind::Rejected
    };

    RemoteError::new(action, kind, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;

    #[test_case("Note was not found: 1496198395707", RemoteErrorKind::NoteNotFound; "missing note")]
    #[test_case("invalid id", RemoteErrorKind::NoteNotFound; "invalid id")]
    #[test_case("note 12 does not exist", RemoteErrorKind::NoteNotFound; "note does not exist")]
    #[test_case("cannot create note because it is a duplicate", RemoteErrorKind::Rejected; "duplicate")]
    #[test_case("model was not found: Cloze", RemoteErrorKind::Rejected; "missing model")]
    #[test]
    fn classify_error_message(message: &str, expect: RemoteErrorKind) {
        pretty_assertions::assert_eq!(classify("updateNoteFields", message.to_string()).kind, expect);
    }

    #[test]
    fn deck_query_escapes_and_excludes_subdecks() {
        pretty_assertions::assert_eq!(
            deck_query(r#"My "Deck"_1"#),
            r#"deck:"My \"Deck\"\_1" -deck:"My \"Deck\"\_1::*""#
        );
    }

    #[test]
    fn note_info_orders_fields() -> anyhow::Result<()> {
        let info: NoteInfo = serde_json::from_value(json!({
            "noteId": 1502298033753u64,
            "modelName": "Basic",
            "tags": ["id::n1"],
            "fields": {
                "Back": { "value": "A1", "order": 1 },
                "Front": { "value": "Q1", "order": 0 }
            },
            "cards": [1498938915662u64]
        }))?;

        let note = info.into_remote().unwrap();
        pretty_assertions::assert_eq!(note.remote_id, 1502298033753);
        pretty_assertions::assert_eq!(note.fields.names().collect::<Vec<_>>(), vec!["Front", "Back"]);
        pretty_assertions::assert_eq!(note.identity(), Some("n1"));

        Ok(())
    }

    #[test]
    fn note_info_skips_vanished_note() -> anyhow::Result<()> {
        let info: NoteInfo = serde_json::from_value(json!({}))?;
        pretty_assertions::assert_eq!(info.into_remote(), None);
        Ok(())
    }
}
