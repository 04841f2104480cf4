// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Debounced file watching.
//!
//! Editors rarely save a file in one go: a single save can show up as a
//! burst of create, modify, and rename events, often alongside swap and
//! backup files. The watcher coalesces such a burst into exactly one
//! callback, fired once the watched sources have been quiet for a while.
//!
//! # States
//!
//! ```text
//! Idle --relevant event--> Armed --relevant event--> Armed (deadline reset)
//!   ^                        |
//!   +------ callback <-- deadline passes
//! ```
//!
//! Events first pass an [`IgnoreFilter`] of gitignore-style patterns, then a
//! relevance check: when watching a single file only that file counts, when
//! watching a directory only deck sources (`.toml`) count. Everything else
//! never arms or resets the deadline.
//!
//! Filesystem notifications are bridged into a channel that the
//! [`Debouncer`] reads from. Stopping the watcher signals the debounce loop
//! directly and drops the filesystem subscription. The loop ends right away,
//! and a pending deadline never fires.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::{
    future::Future,
    path::{Component, Path, PathBuf},
    time::Duration,
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{debug, error, info, instrument, trace};

/// Quiet period used when none is configured.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(1000);

/// Patterns ignored when none are configured.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "*.swp",
    "*.swo",
    "*~",
    ".*.swp",
    ".*.swo",
    "*.bak",
    "*.tmp",
    "__pycache__",
    ".pytest_cache",
    ".vscode",
    ".idea",
    ".DS_Store",
    ".git",
    ".cache",
];

const EVENT_BUFFER: usize = 256;

/// Kind of filesystem change.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum WatchEventKind {
    Create,
    Modify,
    Remove,
}

/// Single filesystem change notification.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchEventKind,
}

impl WatchEvent {
    pub fn new(path: impl Into<PathBuf>, kind: WatchEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Matcher of paths to ignore.
///
/// Patterns follow gitignore syntax. A path is ignored if any of its
/// components matches, so `.git` ignores everything below a `.git`
/// directory too.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    matcher: Gitignore,
}

impl IgnoreFilter {
    /// Construct new filter from patterns.
    ///
    /// # Errors
    ///
    /// - Return [`WatchError::Ignore`] if a pattern is malformed.
    pub fn new(patterns: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Self> {
        let mut builder = GitignoreBuilder::new("");
        for pattern in patterns {
            builder.add_line(None, pattern.as_ref())?;
        }

        Ok(Self {
            matcher: builder.build()?,
        })
    }

    /// Filter built from [`DEFAULT_IGNORE_PATTERNS`].
    pub fn with_defaults() -> Result<Self> {
        Self::new(DEFAULT_IGNORE_PATTERNS)
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        path.components()
            .filter_map(|component| match component {
                Component::Normal(name) => Some(Path::new(name)),
                _ => None,
            })
            .any(|name| {
                self.matcher.matched(name, false).is_ignore()
                    || self.matcher.matched(name, true).is_ignore()
            })
    }
}

/// Which paths count as changes to the watched target.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Relevance {
    /// Only the file with this name counts.
    File(PathBuf),

    /// Any deck source counts.
    Sources,
}

impl Relevance {
    /// Pick relevance rule for watched `path`.
    pub fn for_target(path: &Path) -> Self {
        match path.file_name() {
            Some(name) if path.is_file() => Self::File(PathBuf::from(name)),
            _ => Self::Sources,
        }
    }

    pub fn is_relevant(&self, path: &Path) -> bool {
        match self {
            Self::File(name) => path.file_name() == Some(name.as_os_str()),
            Self::Sources => path.extension().is_some_and(|ext| ext == "toml"),
        }
    }
}

/// Debounce state machine over a channel of events.
#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet: Duration,
    filter: IgnoreFilter,
    relevance: Relevance,
}

impl Debouncer {
    /// Construct new debouncer.
    pub fn new(quiet: Duration, filter: IgnoreFilter, relevance: Relevance) -> Self {
        Self {
            quiet,
            filter,
            relevance,
        }
    }

    /// Event may arm or reset the deadline.
    pub fn accepts(&self, event: &WatchEvent) -> bool {
        if self.filter.is_ignored(&event.path) {
            trace!("ignore change to {:?}", event.path.display());
            return false;
        }

        self.relevance.is_relevant(&event.path)
    }

    /// Run until the event channel closes or `stop` is signaled.
    ///
    /// Calls `on_change` once per burst of accepted events, `quiet` after the
    /// last one. Callback errors and panics are logged and the loop keeps
    /// going. Any change to `stop`, or dropping its sender, stops the loop.
    /// Returns the number of callbacks fired.
    pub async fn run<F, Fut>(
        self,
        mut events: mpsc::Receiver<WatchEvent>,
        mut stop: watch::Receiver<bool>,
        mut on_change: F,
    ) -> usize
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut deadline: Option<Instant> = None;
        let mut fired = 0;

        loop {
            // INVARIANT: A stop signal beats a deadline that passes at the same time.
            tokio::select! {
                biased;
                _ = stop.changed() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        if self.accepts(&event) {
                            debug!("change detected: {:?} ({:?})", event.path.display(), event.kind);
                            deadline = Some(Instant::now() + self.quiet);
                        }
                    }
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    fired += 1;
                    match tokio::spawn(on_change()).await {
                        Ok(Ok(())) => debug!("change callback finished"),
                        Ok(Err(error)) => error!("change callback failed: {error:?}"),
                        Err(error) => error!("change callback panicked: {error}"),
                    }
                }
            }
        }

        debug!("watch loop stopped after {fired} callbacks");
        fired
    }
}

/// Handle of a running watcher.
#[derive(Debug)]
pub struct WatchHandle {
    watcher: Option<RecommendedWatcher>,
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<usize>>,
}

impl WatchHandle {
    /// Spawn debounce loop over `events`, keeping `watcher` alive until
    /// stopped.
    fn start<F, Fut>(
        debouncer: Debouncer,
        events: mpsc::Receiver<WatchEvent>,
        watcher: Option<RecommendedWatcher>,
        on_change: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let (stop, stopped) = watch::channel(false);
        let task = tokio::spawn(debouncer.run(events, stopped, on_change));

        Self {
            watcher,
            stop,
            task: Some(task),
        }
    }

    /// Stop watching.
    ///
    /// Pending deadlines are dropped without firing. Calling this more than
    /// once does nothing.
    pub fn stop(&mut self) {
        if !self.stop.send_replace(true) {
            info!("stopped watching");
        }
        self.watcher.take();
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Wait for the debounce loop to end, returning the number of callbacks
    /// fired.
    pub async fn wait(mut self) -> usize {
        match self.task.take() {
            Some(task) => task.await.unwrap_or_else(|error| {
                error!("watch loop panicked: {error}");
                0
            }),
            None => 0,
        }
    }
}

/// Watch deck source file or directory for changes.
///
/// Must be called inside a tokio runtime.
///
/// # Errors
///
/// - Return [`WatchError::Missing`] if `path` does not exist.
/// - Return [`WatchError::Ignore`] if an ignore pattern is malformed.
/// - Return [`WatchError::Notify`] if the filesystem cannot be watched.
#[instrument(skip(ignore_patterns, on_change), level = "debug")]
pub fn watch<F, Fut>(
    path: &Path,
    quiet_period: Duration,
    ignore_patterns: &[String],
    on_change: F,
) -> Result<WatchHandle>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    if !path.exists() {
        return Err(WatchError::Missing {
            path: path.to_path_buf(),
        });
    }

    let filter = if ignore_patterns.is_empty() {
        IgnoreFilter::with_defaults()?
    } else {
        IgnoreFilter::new(ignore_patterns)?
    };
    let relevance = Relevance::for_target(path);
    let dir = match &relevance {
        Relevance::File(_) => match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        },
        Relevance::Sources => path.to_path_buf(),
    };

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
        let event = match result {
            Ok(event) => event,
            Err(error) => {
                error!("watch error: {error}");
                return;
            }
        };

        let kind = match event.kind {
            notify::EventKind::Create(_) => WatchEventKind::Create,
            notify::EventKind::Modify(_) => WatchEventKind::Modify,
            notify::EventKind::Remove(_) => WatchEventKind::Remove,
            _ => return,
        };

        for path in event.paths {
            // INVARIANT: A full channel already holds events that arm the deadline.
            let _ = tx.try_send(WatchEvent::new(path, kind));
        }
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    info!("watching {:?} for changes", path.display());

    let debouncer = Debouncer::new(quiet_period, filter, relevance);
    Ok(WatchHandle::start(debouncer, rx, Some(watcher), on_change))
}

/// Watcher error types.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Filesystem notifications cannot be set up.
    #[error(transparent)]
    Notify(#[from] notify::Error),

    /// Ignore pattern is malformed.
    #[error(transparent)]
    Ignore(#[from] ignore::Error),

    /// Watched path does not exist.
    #[error("cannot watch missing path {:?}", path.display())]
    Missing { path: PathBuf },
}

/// Friendly result alias :3
pub type Result<T, E = WatchError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use simple_test_case::test_case;
    use std::sync::{Arc, Mutex};
    use tokio::time::sleep;

    fn debouncer() -> Debouncer {
        Debouncer::new(
            Duration::from_secs(1),
            IgnoreFilter::with_defaults().unwrap(),
            Relevance::Sources,
        )
    }

    fn change(path: &str) -> WatchEvent {
        WatchEvent::new(path, WatchEventKind::Modify)
    }

    #[test_case("decks/deck.toml", false; "plain source")]
    #[test_case("decks/.deck.toml.swp", true; "vim swap")]
    #[test_case("decks/deck.toml~", true; "backup")]
    #[test_case("decks/.git/index", true; "vcs metadata")]
    #[test_case("decks/__pycache__/x.toml", true; "cache dir")]
    #[test]
    fn ignore_filter_defaults(path: &str, expect: bool) {
        let filter = IgnoreFilter::with_defaults().unwrap();
        pretty_assertions::assert_eq!(filter.is_ignored(Path::new(path)), expect);
    }

    #[test]
    fn relevance_rules() {
        let file = Relevance::File(PathBuf::from("deck.toml"));
        assert!(file.is_relevant(Path::new("/abs/decks/deck.toml")));
        assert!(!file.is_relevant(Path::new("/abs/decks/other.toml")));
        assert!(Relevance::Sources.is_relevant(Path::new("other.toml")));
        assert!(!Relevance::Sources.is_relevant(Path::new("notes.txt")));
    }

    #[tokio::test(start_paused = true)]
    async fn debouncer_coalesces_burst_into_one_callback() {
        let (tx, rx) = mpsc::channel(16);
        let fired_at = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();

        let (_stop, stopped) = watch::channel(false);
        let record = Arc::clone(&fired_at);
        let task = tokio::spawn(debouncer().run(rx, stopped, move || {
            let record = Arc::clone(&record);
            async move {
                record.lock().unwrap().push(Instant::now());
                Ok(())
            }
        }));

        for _ in 0..5 {
            tx.send(change("decks/deck.toml")).await.unwrap();
            sleep(Duration::from_millis(100)).await;
        }
        sleep(Duration::from_secs(3)).await;
        drop(tx);

        pretty_assertions::assert_eq!(task.await.unwrap(), 1);
        let fired_at = fired_at.lock().unwrap();
        pretty_assertions::assert_eq!(fired_at.len(), 1);
        let elapsed = fired_at[0] - start;
        assert!(elapsed >= Duration::from_millis(1400), "fired early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1500), "fired late: {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn debouncer_ignores_irrelevant_events() {
        let (tx, rx) = mpsc::channel(16);
        let (_stop, stopped) = watch::channel(false);
        let task = tokio::spawn(debouncer().run(rx, stopped, || async { Ok(()) }));

        tx.send(change("decks/.deck.toml.swp")).await.unwrap();
        tx.send(change("decks/notes.txt")).await.unwrap();
        sleep(Duration::from_secs(5)).await;
        drop(tx);

        pretty_assertions::assert_eq!(task.await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn debouncer_closed_channel_drops_pending_deadline() {
        let (tx, rx) = mpsc::channel(16);
        let (_stop, stopped) = watch::channel(false);
        let task = tokio::spawn(debouncer().run(rx, stopped, || async { Ok(()) }));

        tx.send(change("decks/deck.toml")).await.unwrap();
        sleep(Duration::from_millis(500)).await;
        drop(tx);

        pretty_assertions::assert_eq!(task.await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn debouncer_survives_failing_callback() {
        let (tx, rx) = mpsc::channel(16);
        let calls = Arc::new(Mutex::new(0usize));

        let (_stop, stopped) = watch::channel(false);
        let counter = Arc::clone(&calls);
        let task = tokio::spawn(debouncer().run(rx, stopped, move || {
            let counter = Arc::clone(&counter);
            async move {
                let call = {
                    let mut calls = counter.lock().unwrap();
                    *calls += 1;
                    *calls
                };
                match call {
                    1 => anyhow::bail!("rebuild failed"),
                    2 => panic!("rebuild crashed"),
                    _ => Ok(()),
                }
            }
        }));

        for _ in 0..3 {
            tx.send(change("decks/deck.toml")).await.unwrap();
            sleep(Duration::from_secs(2)).await;
        }
        drop(tx);

        pretty_assertions::assert_eq!(task.await.unwrap(), 3);
        pretty_assertions::assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn watch_handle_stop_cancels_armed_deadline() {
        let (tx, rx) = mpsc::channel(16);
        let calls = Arc::new(Mutex::new(0usize));

        let counter = Arc::clone(&calls);
        let mut handle = WatchHandle::start(debouncer(), rx, None, move || {
            let counter = Arc::clone(&counter);
            async move {
                *counter.lock().unwrap() += 1;
                Ok(())
            }
        });

        tx.send(change("decks/deck.toml")).await.unwrap();
        sleep(Duration::from_millis(500)).await;
        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());

        sleep(Duration::from_secs(5)).await;
        pretty_assertions::assert_eq!(handle.wait().await, 0);
        pretty_assertions::assert_eq!(*calls.lock().unwrap(), 0);
        drop(tx);
    }
}
