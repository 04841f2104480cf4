// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Flashcard deck builder and synchronizer.
//!
//! Deckhand turns plain TOML deck sources into deck artifacts and keeps a
//! remote flashcard collection in line with them.
//!
//! # Pipeline
//!
//! 1. [`deck`] loads a source, maps raw records onto note models, and writes
//!    a [`DeckBundle`](deck::package::DeckBundle) artifact.
//! 2. [`sync`] snapshots the remote deck, [reconciles](sync::reconcile) the
//!    desired notes against it, and applies the resulting plan. It can also
//!    export a remote deck back into a deck source.
//! 3. [`batch`] runs the first two steps over many sources at once, with a
//!    bounded pool of push workers and a live status table.
//! 4. [`watch`] reruns a build whenever sources change on disk.
//!
//! # Note Identity
//!
//! Notes are matched across runs by a stable identity carried as an `id::`
//! tag on the remote note. Identity matching never uses note content, so
//! editing a note updates it in place instead of creating a duplicate.

pub mod batch;
pub mod config;
pub mod deck;
pub mod note;
pub mod path;
pub mod sync;
pub mod watch;
