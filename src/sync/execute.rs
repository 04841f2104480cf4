// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Plan execution against a remote collection.
//!
//! Actions run one by one and stand on their own: a failed action is counted
//! and logged, then execution moves on. Deletions are gathered and issued as
//! a single request at the end of the plan.
//!
//! # Stale Identities
//!
//! An update can target a remote note that vanished after the snapshot was
//! taken. When the remote collection reports
//! [`NoteNotFound`](crate::sync::remote::RemoteErrorKind::NoteNotFound) for an
//! update, the note is created instead. The created note carries the
//! identity tag, so the next pass matches it and plans a skip.

use crate::{
    deck::{media::media_references, package::DeckBundle},
    note::NoteRecord,
    sync::{
        reconcile::{reconcile, SyncAction},
        remote::{RemoteStore, Result},
    },
};

use std::{
    collections::HashSet,
    fmt::{Display, Formatter, Result as FmtResult},
    ops::AddAssign,
    path::Path,
};
use tracing::{debug, info, instrument, warn};

/// Outcome counters of one or more synchronization passes.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy)]
pub struct SyncStats {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl SyncStats {
    /// Total number of notes accounted for.
    pub fn total(&self) -> usize {
        self.added + self.updated + self.deleted + self.unchanged + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Counters a plan would produce if every action succeeded.
    pub fn forecast(plan: &[SyncAction]) -> Self {
        let mut stats = Self::default();
        for action in plan {
            match action {
                SyncAction::Add(_) => stats.added += 1,
                SyncAction::Update(..) => stats.updated += 1,
                SyncAction::Delete(_) => stats.deleted += 1,
                SyncAction::Skip => stats.unchanged += 1,
            }
        }

        stats
    }
}

impl AddAssign for SyncStats {
    fn add_assign(&mut self, other: Self) {
        self.added += other.added;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
    }
}

impl Display for SyncStats {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(
            fmt,
            "{} added, {} updated, {} deleted, {} unchanged, {} failed",
            self.added, self.updated, self.deleted, self.unchanged, self.failed
        )
    }
}

/// Apply plan to deck `deck` of the remote collection.
///
/// Media referenced by added or updated notes is uploaded from `media_dir`
/// first, once per file.
pub async fn apply_plan(
    store: &dyn RemoteStore,
    deck: &str,
    plan: Vec<SyncAction>,
    media_dir: Option<&Path>,
) -> SyncStats {
    let mut stats = SyncStats::default();
    let mut uploaded = HashSet::new();
    let mut doomed = Vec::new();

    for action in plan {
        match action {
            SyncAction::Skip => stats.unchanged += 1,
            SyncAction::Delete(remote_id) => doomed.push(remote_id),
            SyncAction::Add(note) => {
                upload_media(store, &note, media_dir, &mut uploaded).await;
                match add_note(store, deck, &note).await {
                    Ok(remote_id) => {
                        debug!("added note {remote_id}");
                        stats.added += 1;
                    }
                    Err(error) => {
                        warn!("{error}");
                        stats.failed += 1;
                    }
                }
            }
            SyncAction::Update(remote_id, note) => {
                upload_media(store, &note, media_dir, &mut uploaded).await;
                match update_note(store, remote_id, &note).await {
                    Ok(()) => stats.updated += 1,
                    Err(error) if error.is_note_not_found() => {
                        info!("note {remote_id} vanished remotely, adding it again");
                        match add_note(store, deck, &note).await {
                            Ok(_) => stats.added += 1,
                            Err(error) => {
                                warn!("{error}");
                                stats.failed += 1;
                            }
                        }
                    }
                    Err(error) => {
                        warn!("{error}");
                        stats.failed += 1;
                    }
                }
            }
        }
    }

    if !doomed.is_empty() {
        match store.delete_notes(&doomed).await {
            Ok(()) => stats.deleted += doomed.len(),
            Err(error) => {
                warn!("{error}");
                stats.failed += doomed.len();
            }
        }
    }

    stats
}

/// Push bundled deck to the remote collection.
///
/// Creates the deck if needed, snapshots its notes, reconciles, then applies
/// the plan.
///
/// # Errors
///
/// - Return [`RemoteError`](crate::sync::remote::RemoteError) if the deck
///   cannot be prepared or its notes cannot be listed. Failures of single
///   actions are only counted.
#[instrument(skip(store, bundle), fields(deck = %bundle.deck_name), level = "debug")]
pub async fn push_deck(store: &dyn RemoteStore, bundle: &DeckBundle, prune: bool) -> Result<SyncStats> {
    let deck = bundle.deck_name.as_str();
    if !store.deck_names().await?.iter().any(|name| name == deck) {
        info!("create deck {deck:?}");
        store.create_deck(deck).await?;
    }

    match store.model_names().await {
        Ok(known) => {
            for model in &bundle.models {
                if !known.contains(&model.name) {
                    warn!("model {:?} does not exist remotely, notes using it will fail", model.name);
                }
            }
        }
        Err(error) => warn!("cannot check remote models: {error}"),
    }

    let actual = store.list_notes(deck).await?;
    let plan = reconcile(&bundle.notes, &actual, prune);
    debug!("planned {} actions against {} remote notes", plan.len(), actual.len());

    let stats = apply_plan(store, deck, plan, bundle.media_dir.as_deref()).await;
    info!("pushed deck {deck:?}: {stats}");

    Ok(stats)
}

/// Plan push of bundled deck without touching the remote collection.
///
/// A deck missing remotely plans as if it were empty.
///
/// # Errors
///
/// - Return [`RemoteError`](crate::sync::remote::RemoteError) if decks or
///   notes cannot be listed.
#[instrument(skip(store, bundle), fields(deck = %bundle.deck_name), level = "debug")]
pub async fn plan_push(
    store: &dyn RemoteStore,
    bundle: &DeckBundle,
    prune: bool,
) -> Result<Vec<SyncAction>> {
    let deck = bundle.deck_name.as_str();
    let actual = if store.deck_names().await?.iter().any(|name| name == deck) {
        store.list_notes(deck).await?
    } else {
        debug!("deck {deck:?} does not exist remotely yet");
        Vec::new()
    };

    Ok(reconcile(&bundle.notes, &actual, prune))
}

async fn add_note(store: &dyn RemoteStore, deck: &str, note: &NoteRecord) -> Result<u64> {
    store
        .add_note(deck, &note.model_name, &note.fields, &note.remote_tags())
        .await
}

async fn update_note(store: &dyn RemoteStore, remote_id: u64, note: &NoteRecord) -> Result<()> {
    store.update_note_fields(remote_id, &note.fields).await?;
    store.update_note_tags(remote_id, &note.remote_tags()).await
}

async fn upload_media(
    store: &dyn RemoteStore,
    note: &NoteRecord,
    media_dir: Option<&Path>,
    uploaded: &mut HashSet<String>,
) {
    let Some(media_dir) = media_dir else {
        return;
    };

    for name in note.fields.values().flat_map(media_references) {
        if uploaded.contains(&name) {
            continue;
        }

        let local = media_dir.join(&name);
        if !local.is_file() {
            warn!("media file {:?} not found", local.display());
            continue;
        }

        match store.store_media_file(&local, &name).await {
            Ok(()) => {
                debug!("uploaded media {name:?}");
                uploaded.insert(name);
            }
            Err(error) => warn!("{error}"),
        }
    }
}
