// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Batch orchestration.
//!
//! A __batch__ builds many deck sources in one go, and optionally pushes
//! every built deck to the remote collection.
//!
//! # Ordering
//!
//! Builds run strictly one after another in source order on the calling
//! task. Pushes are handed to a [`WorkerPool`] as soon as their build
//! finishes, so building the next source overlaps with pushing earlier ones.
//! At most `workers` pushes run at the same time.
//!
//! # Failures
//!
//! A failing source never stops the batch. Load, build, and push failures
//! are recorded on the [`StatusBoard`] and returned in the [`BatchReport`].
//! A push only counts as successful if every note action of it succeeded;
//! otherwise its artifact is left on disk for inspection. Two decks whose
//! names map to the same artifact file never overwrite each other: the later
//! one fails before it is built.
//!
//! # Modes
//!
//! - __Separate__ (default): every source becomes its own deck.
//! - __Merge__: all sources are merged into one deck, see
//!   [`merge_sources`]. Sources that fail to load are left out and listed as
//!   skipped rather than failed.

pub mod pool;
pub mod status;

use crate::{
    batch::{
        pool::{WorkerPool, DEFAULT_WORKERS},
        status::{ItemStatus, StatusBoard},
    },
    deck::{
        build_deck, build_target, merge_sources, package::DeckPackager, resolve_deck_name,
        source::DeckSource, BuildOptions, BuildOutput, DeckError, MERGED_DECK_NAME,
    },
    sync::{execute::push_deck, remote::RemoteStore, SyncStats},
};

use glob::{MatchOptions, Pattern};
use std::{
    collections::{BTreeSet, HashMap},
    fs::remove_file,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, info, instrument, warn};

/// Options of a batch run.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BatchOptions {
    /// Directory artifacts are written to.
    pub output_dir: PathBuf,

    /// Merge every source into one deck.
    pub merge: bool,

    /// Deck name override. Names the merged deck in merge mode.
    pub deck_name: Option<String>,

    /// Number of concurrent pushes, clamped into `1..=8`.
    pub workers: usize,

    /// Push built decks to the remote collection.
    pub push: bool,

    /// Remove artifacts of successfully pushed decks.
    pub delete_after_push: bool,

    /// Trigger one remote sync after all pushes.
    pub sync_after_push: bool,

    /// Delete remote notes no source describes.
    pub prune: bool,

    /// Root for hierarchical deck names.
    pub scan_root: Option<PathBuf>,

    /// Case-insensitive glob over resolved deck names.
    pub name_filter: Option<String>,

    /// Draw the status table to the terminal while running.
    pub live: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            merge: false,
            deck_name: None,
            workers: DEFAULT_WORKERS,
            push: false,
            delete_after_push: false,
            sync_after_push: false,
            prune: false,
            scan_root: None,
            name_filter: None,
            live: false,
        }
    }
}

/// Outcome of the remote sync requested after pushing.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum SyncOutcome {
    /// No sync was requested.
    NotRequested,

    /// Sync was requested, but no push succeeded.
    Skipped,

    /// Sync ran successfully.
    Completed,

    /// Sync failed with message.
    Failed(String),
}

/// Final report of a batch run.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BatchReport {
    /// Number of decks built (and pushed, if requested) successfully.
    pub success_count: usize,

    /// Number of failures.
    pub error_count: usize,

    /// Failures as `(name, message)` pairs.
    pub errors: Vec<(String, String)>,

    /// Sources left out of a merged deck as `(name, message)` pairs.
    pub skipped: Vec<(String, String)>,

    /// Outcome of the remote sync.
    pub sync: SyncOutcome,

    /// Note counters summed over every push.
    pub stats: SyncStats,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.error_count == 0
    }

    /// One line summary, e.g., "built 2/3 decks, 1 failed".
    pub fn summary(&self) -> String {
        format!(
            "built {}/{} decks, {} failed",
            self.success_count,
            self.success_count + self.error_count,
            self.error_count
        )
    }
}

/// Expand literal paths and glob patterns into a sorted list of files.
///
/// Literal paths are kept even if missing, so they are reported when
/// loading. Patterns matching nothing are logged and skipped.
pub fn expand_patterns(patterns: impl IntoIterator<Item = impl AsRef<str>>) -> Vec<PathBuf> {
    let mut found = BTreeSet::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        if !is_glob(pattern) {
            found.insert(PathBuf::from(pattern));
            continue;
        }

        let entries = match glob::glob(pattern) {
            Ok(entries) => entries,
            Err(error) => {
                warn!("invalid pattern {pattern:?}: {error}");
                continue;
            }
        };

        let before = found.len();
        found.extend(entries.filter_map(std::result::Result::ok).filter(|path| path.is_file()));
        if found.len() == before {
            warn!("pattern {pattern:?} matched no files");
        }
    }

    found.into_iter().collect()
}

/// Find files named by `pattern` inside `dir`.
///
/// # Errors
///
/// - Return [`BatchError::NotADirectory`] if `dir` is not a directory.
/// - Return [`BatchError::Pattern`] if `pattern` is not a valid glob.
pub fn scan_directory(dir: &Path, pattern: &str, recursive: bool) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(BatchError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    let base = Pattern::escape(dir.to_string_lossy().as_ref());
    let full = if recursive {
        format!("{base}/**/{pattern}")
    } else {
        format!("{base}/{pattern}")
    };
    debug!("scan {full:?}");

    let found = glob::glob(&full)?
        .filter_map(std::result::Result::ok)
        .filter(|path| path.is_file())
        .collect::<BTreeSet<_>>();

    Ok(found.into_iter().collect())
}

/// Run batch over deck sources.
///
/// Pushes go through `store`; a push requested without a store fails per
/// source.
///
/// # Errors
///
/// - Return [`BatchError::Pattern`] if the name filter is not a valid glob.
/// - Return [`BatchError::Style`] if the status table cannot be set up.
#[instrument(skip(sources, options, packager, store), level = "debug")]
pub async fn run_batch(
    sources: Vec<PathBuf>,
    options: &BatchOptions,
    packager: Arc<dyn DeckPackager>,
    store: Option<Arc<dyn RemoteStore>>,
) -> Result<BatchReport> {
    let filter = options
        .name_filter
        .as_deref()
        .map(Pattern::new)
        .transpose()?;
    let sources = select_sources(sources, options, filter.as_ref());
    info!("processing {} deck sources", sources.len());

    let store = if options.push { store } else { None };
    let report = if options.merge {
        run_merged(sources, options, packager, store).await?
    } else {
        run_separate(sources, options, packager, store).await?
    };

    info!("{}", report.summary());
    Ok(report)
}

/// Source paired with its resolved deck name.
struct Job {
    path: PathBuf,
    name: String,
}

fn select_sources(sources: Vec<PathBuf>, options: &BatchOptions, filter: Option<&Pattern>) -> Vec<Job> {
    let match_options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };

    sources
        .into_iter()
        .filter_map(|path| {
            let name = match filter {
                Some(_) => source_name(&path, options),
                None => resolve_deck_name(
                    options.deck_name.as_deref().filter(|_| !options.merge),
                    None,
                    &path,
                    options.scan_root.as_deref(),
                ),
            };

            if let Some(filter) = filter {
                if !filter.matches_with(&name, match_options) {
                    debug!("deck {name:?} does not match filter {:?}", filter.as_str());
                    return None;
                }
            }

            Some(Job { path, name })
        })
        .collect()
}

/// Name a source will be built under, reading its declared name if possible.
fn source_name(path: &Path, options: &BatchOptions) -> String {
    let declared = match DeckSource::load(path) {
        Ok(source) => source.deck_name,
        Err(error) => {
            debug!("cannot read deck name of {:?}: {error}", path.display());
            None
        }
    };

    resolve_deck_name(
        options.deck_name.as_deref().filter(|_| !options.merge),
        declared.as_deref(),
        path,
        options.scan_root.as_deref(),
    )
}

async fn run_separate(
    jobs: Vec<Job>,
    options: &BatchOptions,
    packager: Arc<dyn DeckPackager>,
    store: Option<Arc<dyn RemoteStore>>,
) -> Result<BatchReport> {
    let board = Arc::new(StatusBoard::new(jobs.iter().map(|job| job.name.clone()), options.live)?);
    if options.live {
        board.tick(Duration::from_millis(100));
    }

    let build = BuildOptions {
        output_dir: options.output_dir.clone(),
        name_override: options.deck_name.clone(),
        scan_root: options.scan_root.clone(),
    };
    let mut claimed: HashMap<PathBuf, String> = HashMap::new();
    let mut pool = WorkerPool::new(options.workers);
    for (index, job) in jobs.into_iter().enumerate() {
        board.set(index, ItemStatus::Building, "");
        let built = DeckSource::load(&job.path)
            .map_err(DeckError::from)
            .and_then(|source| {
                // INVARIANT: No build may overwrite an artifact of the same batch.
                let (deck_name, artifact) = build_target(&source, &build, packager.as_ref());
                if let Some(owner) = claimed.get(&artifact) {
                    return Err(DeckError::ArtifactTaken {
                        path: artifact,
                        deck: owner.clone(),
                    });
                }
                let output = build_deck(&source, &build, packager.as_ref())?;
                claimed.insert(artifact, deck_name);
                Ok(output)
            });

        let output = match built {
            Ok(output) => output,
            Err(error) => {
                let message = describe(error);
                warn!("{:?}: {message}", job.path.display());
                board.fail(index, message);
                continue;
            }
        };
        board.rename(index, output.deck_name.clone());

        if !options.push {
            board.succeed(index, format!("{} notes", output.notes));
            continue;
        }

        board.set(index, ItemStatus::Queued, "");
        pool.submit(push_job(
            index,
            output,
            Arc::clone(&board),
            store.clone(),
            options.clone(),
        ));
    }

    let stats = finish_pushes(pool, &board).await;
    let sync = sync_after(&board, options, store.as_deref()).await;
    board.finish();

    Ok(report_from(&board, sync, stats, Vec::new()))
}

async fn run_merged(
    jobs: Vec<Job>,
    options: &BatchOptions,
    packager: Arc<dyn DeckPackager>,
    store: Option<Arc<dyn RemoteStore>>,
) -> Result<BatchReport> {
    let deck_name = options
        .deck_name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| MERGED_DECK_NAME.to_string());
    let board = Arc::new(StatusBoard::new([deck_name.clone()], options.live)?);
    if options.live {
        board.tick(Duration::from_millis(100));
    }
    board.set(0, ItemStatus::Building, "");

    let mut loaded = Vec::new();
    let mut skipped = Vec::new();
    for job in jobs {
        match DeckSource::load(&job.path) {
            Ok(source) => loaded.push(source),
            Err(error) => {
                let message = describe(error);
                warn!("skipping {:?}: {message}", job.path.display());
                skipped.push((job.name, message));
            }
        }
    }

    let mut pool = WorkerPool::new(options.workers);
    match merge_sources(loaded) {
        None => board.fail(0, "no deck source could be loaded"),
        Some(source) => {
            let build = BuildOptions {
                output_dir: options.output_dir.clone(),
                name_override: Some(deck_name),
                scan_root: None,
            };
            match build_deck(&source, &build, packager.as_ref()) {
                Err(error) => board.fail(0, describe(error)),
                Ok(output) if !options.push => {
                    board.succeed(0, format!("{} notes", output.notes));
                }
                Ok(output) => {
                    board.set(0, ItemStatus::Queued, "");
                    pool.submit(push_job(
                        0,
                        output,
                        Arc::clone(&board),
                        store.clone(),
                        options.clone(),
                    ));
                }
            }
        }
    }

    let stats = finish_pushes(pool, &board).await;
    let sync = sync_after(&board, options, store.as_deref()).await;
    board.finish();

    Ok(report_from(&board, sync, stats, skipped))
}

/// Push one built deck, reporting the outcome on the board.
///
/// Pushes the bundle kept in memory by the build, never the artifact on
/// disk.
async fn push_job(
    index: usize,
    output: BuildOutput,
    board: Arc<StatusBoard>,
    store: Option<Arc<dyn RemoteStore>>,
    options: BatchOptions,
) -> SyncStats {
    board.set(index, ItemStatus::Pushing, "");
    let Some(store) = store else {
        board.fail(index, "push requested without a remote collection");
        return SyncStats::default();
    };

    let stats = match push_deck(store.as_ref(), &output.bundle, options.prune).await {
        Ok(stats) => stats,
        Err(error) => {
            board.fail(index, describe(error));
            return SyncStats::default();
        }
    };

    if stats.has_failures() {
        board.fail(
            index,
            format!("{} of {} note actions failed", stats.failed, stats.total()),
        );
        return stats;
    }

    if options.delete_after_push {
        match remove_file(&output.artifact) {
            Ok(()) => debug!("removed artifact {:?}", output.artifact.display()),
            Err(error) => warn!("cannot remove artifact {:?}: {error}", output.artifact.display()),
        }
    }
    board.succeed(index, stats.to_string());

    stats
}

async fn finish_pushes(pool: WorkerPool<SyncStats>, board: &StatusBoard) -> SyncStats {
    let mut total = SyncStats::default();
    for result in pool.join().await {
        match result {
            Ok(stats) => total += stats,
            Err(error) => warn!("push task aborted: {error}"),
        }
    }

    // INVARIANT: Rows of aborted push tasks must not stay in progress.
    board.fail_stuck(ItemStatus::Queued, "push task aborted");
    board.fail_stuck(ItemStatus::Pushing, "push task aborted");
    total
}

async fn sync_after(
    board: &StatusBoard,
    options: &BatchOptions,
    store: Option<&dyn RemoteStore>,
) -> SyncOutcome {
    if !(options.push && options.sync_after_push) {
        return SyncOutcome::NotRequested;
    }

    let Some(store) = store.filter(|_| board.succeeded() > 0) else {
        info!("no deck pushed, skipping sync");
        return SyncOutcome::Skipped;
    };

    match store.sync().await {
        Ok(()) => {
            info!("remote collection synced");
            SyncOutcome::Completed
        }
        Err(error) => {
            warn!("sync failed: {error}");
            SyncOutcome::Failed(error.to_string())
        }
    }
}

fn report_from(
    board: &StatusBoard,
    sync: SyncOutcome,
    stats: SyncStats,
    skipped: Vec<(String, String)>,
) -> BatchReport {
    BatchReport {
        success_count: board.succeeded(),
        error_count: board.failed(),
        errors: board.errors(),
        skipped,
        sync,
        stats,
    }
}

/// Render error with every cause, outermost first.
fn describe(error: impl Into<anyhow::Error>) -> String {
    format!("{:#}", error.into())
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Batch setup error types.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// Glob pattern is malformed.
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    Style(#[from] indicatif::style::TemplateError),

    /// Directory to scan is not a directory.
    #[error("{:?} is not a directory", path.display())]
    NotADirectory { path: PathBuf },
}

/// Friendly result alias :3
pub type Result<T, E = BatchError> = std::result::Result<T, E>;
