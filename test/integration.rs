// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{memory_store, write_broken, DeckFixture};

use deckhand::{
    batch::{run_batch, scan_directory, BatchOptions, SyncOutcome},
    deck::{bundle_source, package::JsonPackager, source::DeckSource},
    sync::{reconcile, RemoteErrorKind, RemoteStore, SyncAction, SyncStats},
};
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

fn push_options() -> BatchOptions {
    BatchOptions {
        output_dir: PathBuf::from("out"),
        push: true,
        ..Default::default()
    }
}

#[sealed_test]
fn batch_keeps_going_past_broken_source() -> anyhow::Result<()> {
    let sources = vec![
        DeckFixture::new("a/deck.toml").note("a1", "Q", "A").write()?,
        write_broken("b/deck.toml")?,
        DeckFixture::new("c/deck.toml").note("c1", "Q", "A").write()?,
    ];
    let (store, remote) = memory_store();

    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(run_batch(
        sources,
        &BatchOptions {
            sync_after_push: true,
            ..push_options()
        },
        Arc::new(JsonPackager),
        Some(remote),
    ))?;

    assert_eq!(report.success_count, 2);
    assert_eq!(report.error_count, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].0, "b");
    assert_eq!(report.summary(), "built 2/3 decks, 1 failed");
    assert_eq!(report.sync, SyncOutcome::Completed);
    assert_eq!(report.stats, SyncStats { added: 2, ..Default::default() });
    assert_eq!(store.sync_count(), 1);
    assert_eq!(store.notes("a").len(), 1);
    assert_eq!(store.notes("c").len(), 1);

    Ok(())
}

#[sealed_test]
fn batch_skips_sync_when_nothing_pushed() -> anyhow::Result<()> {
    let sources = vec![write_broken("a/deck.toml")?];
    let (store, remote) = memory_store();

    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(run_batch(
        sources,
        &BatchOptions {
            sync_after_push: true,
            ..push_options()
        },
        Arc::new(JsonPackager),
        Some(remote),
    ))?;

    assert!(!report.is_success());
    assert_eq!(report.sync, SyncOutcome::Skipped);
    assert_eq!(store.sync_count(), 0);

    Ok(())
}

#[sealed_test]
fn edited_note_is_updated_and_rest_skipped() -> anyhow::Result<()> {
    let fixture = DeckFixture::new("spanish.toml")
        .named("Spanish")
        .note("n1", "hablar", "to speak")
        .note("n2", "comer", "to eat");
    let source = fixture.write()?;
    let (store, remote) = memory_store();
    let runtime = tokio::runtime::Runtime::new()?;

    let first = runtime.block_on(run_batch(
        vec![source.clone()],
        &push_options(),
        Arc::new(JsonPackager),
        Some(remote.clone()),
    ))?;
    assert_eq!(first.stats, SyncStats { added: 2, ..Default::default() });

    DeckFixture::new("spanish.toml")
        .named("Spanish")
        .note("n1", "hablar", "to speak")
        .note("n2", "comer", "to eat, to dine")
        .write()?;
    let second = runtime.block_on(run_batch(
        vec![source.clone()],
        &push_options(),
        Arc::new(JsonPackager),
        Some(remote.clone()),
    ))?;
    assert_eq!(second.stats, SyncStats { updated: 1, unchanged: 1, ..Default::default() });

    let third = runtime.block_on(run_batch(
        vec![source],
        &push_options(),
        Arc::new(JsonPackager),
        Some(remote),
    ))?;
    assert_eq!(third.stats, SyncStats { unchanged: 2, ..Default::default() });

    let notes = store.notes("Spanish");
    assert_eq!(notes.len(), 2);
    assert!(notes
        .iter()
        .any(|note| note.fields.get("Back") == Some("to eat, to dine")));

    Ok(())
}

#[sealed_test]
fn pushed_deck_reconciles_to_all_skips() -> anyhow::Result<()> {
    let path = DeckFixture::new("verbs.toml")
        .named("Verbs")
        .note("v1", "ir", "to go")
        .note("v2", "ser", "to be")
        .write()?;
    let (store, remote) = memory_store();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        run_batch(
            vec![path.clone()],
            &push_options(),
            Arc::new(JsonPackager),
            Some(remote),
        )
        .await?;

        let source = DeckSource::load(&path)?;
        let desired = bundle_source(&source, "Verbs").notes;
        let actual = store.list_notes("Verbs").await?;
        assert_eq!(reconcile(&desired, &actual, true), vec![SyncAction::Skip, SyncAction::Skip]);

        Ok::<(), anyhow::Error>(())
    })
}

#[sealed_test]
fn delete_after_push_keeps_artifacts_of_failed_pushes() -> anyhow::Result<()> {
    let sources = vec![
        DeckFixture::new("first/deck.toml").note("f1", "Q", "A").write()?,
        DeckFixture::new("second/deck.toml").note("s1", "Q", "A").write()?,
    ];
    let (store, remote) = memory_store();
    store.fail_next("addNote", RemoteErrorKind::Transport);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(run_batch(
        sources,
        &BatchOptions {
            delete_after_push: true,
            workers: 1,
            ..push_options()
        },
        Arc::new(JsonPackager),
        Some(remote),
    ))?;

    // INVARIANT: One worker on one thread pushes in source order.
    assert_eq!(report.success_count, 1);
    assert_eq!(report.error_count, 1);
    assert_eq!(report.errors[0].0, "first");
    assert!(Path::new("out/first.deck.json").is_file());
    assert!(!Path::new("out/second.deck.json").exists());

    Ok(())
}

#[sealed_test]
fn hierarchical_names_drive_the_filter() -> anyhow::Result<()> {
    DeckFixture::new("langs/spanish/verbs/deck.toml").note("s1", "Q", "A").write()?;
    DeckFixture::new("langs/french/deck.toml").note("f1", "Q", "A").write()?;
    let sources = scan_directory(Path::new("langs"), "deck.toml", true)?;
    assert_eq!(sources.len(), 2);

    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(run_batch(
        sources,
        &BatchOptions {
            output_dir: PathBuf::from("out"),
            scan_root: Some(PathBuf::from("langs")),
            name_filter: Some("SPANISH::*".into()),
            ..Default::default()
        },
        Arc::new(JsonPackager),
        None,
    ))?;

    assert_eq!(report.success_count, 1);
    assert!(Path::new("out/spanish_verbs.deck.json").is_file());
    assert!(!Path::new("out/french.deck.json").exists());

    Ok(())
}
