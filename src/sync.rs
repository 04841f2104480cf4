// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote collection synchronization.
//!
//! Synchronizing a deck is a one-way affair: the local deck source is the
//! source of truth, and the remote collection is brought in line with it.
//! There is no merge, and local always wins.
//!
//! # Passes
//!
//! A single synchronization __pass__ over one deck goes like this:
//!
//! 1. Snapshot the notes the remote collection currently holds for the deck.
//! 2. Compare them against the desired notes of the deck (see [`reconcile`]),
//!    producing a __plan__ with exactly one [`SyncAction`] per note.
//! 3. Apply the plan action by action (see [`execute`]). Each action stands
//!    on its own, so one failure never aborts the rest of the plan.
//!
//! Running a pass twice without changing anything in between must produce a
//! plan made only of skips the second time around.
//!
//! # See Also
//!
//! 1. [`remote::RemoteStore`]
//! 2. [`fingerprint`]

pub mod connect;
pub mod execute;
pub mod export;
pub mod fingerprint;
pub mod memory;
pub mod reconcile;
pub mod remote;

pub use execute::{apply_plan, plan_push, push_deck, SyncStats};
pub use export::export_deck;
pub use reconcile::{reconcile, SyncAction};
pub use remote::{RemoteError, RemoteErrorKind, RemoteNote, RemoteStore};
