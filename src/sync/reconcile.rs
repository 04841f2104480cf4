// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Desired versus actual note reconciliation.
//!
//! Reconciliation is pure planning: given the desired notes of a deck and a
//! snapshot of the notes the remote collection holds for it, decide what to
//! do with every note. No I/O happens here, so nothing here can fail.
//!
//! # Matching
//!
//! Notes are matched by identity only. A remote note's identity is the value
//! of its `id::` tag, or failing that its remote identifier written out in
//! decimal. Content equality never matches two notes together, so two notes
//! with the same content but different identities stay distinct.

use crate::{
    note::NoteRecord,
    sync::{
        fingerprint::{fingerprint, Fingerprint},
        remote::RemoteNote,
    },
};

use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

/// Planned action for a single note.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum SyncAction {
    /// Create desired note remotely.
    Add(NoteRecord),

    /// Overwrite remote note with desired content.
    Update(u64, NoteRecord),

    /// Remove remote note.
    Delete(u64),

    /// Leave note alone.
    Skip,
}

impl SyncAction {
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip)
    }
}

/// Plan actions bringing `actual` in line with `desired`.
///
/// Every desired note yields exactly one action, in order. With `prune`
/// set, every remote note no desired note matched is appended as a
/// [`SyncAction::Delete`], in ascending remote identifier order.
pub fn reconcile(desired: &[NoteRecord], actual: &[RemoteNote], prune: bool) -> Vec<SyncAction> {
    let lookup = index_by_identity(actual);
    let mut matched = HashSet::new();
    let mut plan = Vec::with_capacity(desired.len());

    for note in desired {
        let found = note
            .identity
            .as_deref()
            .and_then(|identity| lookup.get(identity).map(|index| (identity, *index)));

        let action = match found {
            Some((identity, index)) => {
                if !matched.insert(index) {
                    warn!("identity {identity:?} claimed by more than one note, skipping repeat");
                    SyncAction::Skip
                } else {
                    plan_matched(identity, note, &actual[index])
                }
            }
            None if note.deleted => {
                debug!("note {:?} marked deleted but absent remotely", note.identity);
                SyncAction::Skip
            }
            None => SyncAction::Add(note.clone()),
        };
        plan.push(action);
    }

    if prune {
        let stale = actual
            .iter()
            .enumerate()
            .filter(|(index, _)| !matched.contains(index))
            .map(|(_, remote)| remote.remote_id)
            .collect::<BTreeSet<_>>();
        plan.extend(stale.into_iter().map(SyncAction::Delete));
    }

    plan
}

/// Fingerprint of desired note under `identity`.
pub fn desired_fingerprint(identity: &str, note: &NoteRecord) -> Fingerprint {
    fingerprint(
        identity,
        note.fields.values(),
        note.tags.iter().map(String::as_str),
    )
}

/// Fingerprint of remote note lined up on the fields of `desired`.
pub fn remote_fingerprint(identity: &str, remote: &RemoteNote, desired: &NoteRecord) -> Fingerprint {
    let fields = remote.fields.project(desired.fields.names());
    let tags = remote.content_tags();
    fingerprint(identity, fields.values(), tags.iter().map(String::as_str))
}

fn plan_matched(identity: &str, note: &NoteRecord, remote: &RemoteNote) -> SyncAction {
    if note.deleted {
        return SyncAction::Delete(remote.remote_id);
    }

    if desired_fingerprint(identity, note) == remote_fingerprint(identity, remote, note) {
        SyncAction::Skip
    } else {
        SyncAction::Update(remote.remote_id, note.clone())
    }
}

fn index_by_identity(actual: &[RemoteNote]) -> HashMap<String, usize> {
    let mut lookup = HashMap::new();

    // INVARIANT: Identity tags beat decimal remote identifiers.
    for (index, remote) in actual.iter().enumerate() {
        if let Some(identity) = remote.identity() {
            lookup.entry(identity.to_string()).or_insert(index);
        }
    }
    for (index, remote) in actual.iter().enumerate() {
        lookup.entry(remote.remote_id.to_string()).or_insert(index);
    }

    lookup
}
