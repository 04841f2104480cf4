// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use deckhand::{
    batch::{expand_patterns, run_batch, scan_directory, BatchOptions, BatchReport, SyncOutcome},
    config::{Settings, ToolConfig, CONFIG_TEMPLATE},
    deck::{
        build_deck_file, bundle_source,
        package::{DeckBundle, DeckPackager, JsonPackager},
        resolve_deck_name,
        source::DeckSource,
        validate::validate,
        BuildOptions,
    },
    path::config_layers,
    sync::{
        connect::AnkiConnect, export_deck, plan_push, push_deck, RemoteStore, SyncAction,
        SyncStats,
    },
    watch::watch,
};

use anyhow::{bail, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::{fs::write, path::PathBuf, process::exit, sync::Arc, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(about, subcommand_help_heading = "Commands", version)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log more, repeat for even more.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration profile to apply.
    #[arg(long, global = true, value_name = "name")]
    pub profile: Option<String>,

    /// AnkiConnect endpoint.
    #[arg(long, global = true, value_name = "url")]
    pub url: Option<String>,
}

impl Cli {
    /// Settings given on the command line.
    fn overrides(&self) -> Settings {
        Settings {
            verbose: (self.verbose > 0).then_some(self.verbose),
            quiet: self.quiet.then_some(true),
            connect_url: self.url.clone(),
            ..Default::default()
        }
    }

    fn settings(&self, config: &ToolConfig) -> Result<Settings> {
        let mut settings = config.resolve(self.profile.as_deref())?;
        settings.overlay(&self.overrides());
        Ok(settings)
    }

    async fn run(self, settings: Settings) -> Result<()> {
        match self.command {
            Command::Build(opts) => run_build(opts, &settings),
            Command::Push(opts) => run_push(opts, &settings).await,
            Command::Export(opts) => run_export(opts, &settings).await,
            Command::Batch(opts) => run_batch_command(opts, &settings).await,
            Command::Watch(opts) => run_watch(opts, &settings).await,
            Command::Check(opts) => run_check(opts),
            Command::Config(opts) => run_config(opts, settings),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Build deck artifact from a deck source.
    #[command(override_usage = "deckhand build [options] <source>")]
    Build(BuildArgs),

    /// Push deck source or built artifact to the remote collection.
    #[command(override_usage = "deckhand push [options] <source>")]
    Push(PushArgs),

    /// Export deck of the remote collection as a deck source.
    #[command(override_usage = "deckhand export [options] <deck>")]
    Export(ExportArgs),

    /// Build, and optionally push, many deck sources at once.
    #[command(override_usage = "deckhand batch [options] (-f <pattern>... | -d <dir>)")]
    Batch(BatchArgs),

    /// Rebuild deck sources whenever they change.
    #[command(override_usage = "deckhand watch [options] <path>")]
    Watch(WatchArgs),

    /// Check deck sources without building them.
    #[command(override_usage = "deckhand check <source>...")]
    Check(CheckArgs),

    /// Show effective configuration.
    #[command(override_usage = "deckhand config [options]")]
    Config(ConfigArgs),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct BuildArgs {
    /// Deck source to build.
    #[arg(required = true, value_name = "source")]
    pub source: PathBuf,

    /// Directory to write the artifact to.
    #[arg(short, long, value_name = "dir")]
    pub output_dir: Option<PathBuf>,

    /// Deck name to use instead of the declared one.
    #[arg(long, value_name = "name")]
    pub deck_name: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PushArgs {
    /// Deck source or `.deck.json` artifact to push.
    #[arg(required = true, value_name = "source")]
    pub source: PathBuf,

    /// Deck name to use instead of the declared one.
    #[arg(long, value_name = "name")]
    pub deck_name: Option<String>,

    /// Delete remote notes the deck no longer describes.
    #[arg(long)]
    pub prune: bool,

    /// Trigger a remote sync after pushing.
    #[arg(long)]
    pub sync: bool,

    /// Print planned note actions without applying them.
    #[arg(long, conflicts_with = "sync")]
    pub dry_run: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ExportArgs {
    /// Name of the remote deck to export.
    #[arg(required = true, value_name = "deck")]
    pub deck: String,

    /// File to write the deck source to instead of standard output.
    #[arg(short, long, value_name = "file")]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct BatchArgs {
    /// Deck source path or glob pattern.
    #[arg(short = 'f', long = "file", value_name = "pattern")]
    pub files: Vec<String>,

    /// Directory to scan for deck sources.
    #[arg(short = 'd', long = "dir", value_name = "dir")]
    pub dir: Option<PathBuf>,

    /// Only scan the top of the directory.
    #[arg(long)]
    pub no_recursive: bool,

    /// File name pattern to scan for.
    #[arg(long, default_value = "deck.toml", value_name = "pattern")]
    pub pattern: String,

    /// Directory to write artifacts to.
    #[arg(short, long, value_name = "dir")]
    pub output_dir: Option<PathBuf>,

    /// Merge every source into one deck.
    #[arg(long)]
    pub merge: bool,

    /// Deck name override, or name of the merged deck.
    #[arg(long, value_name = "name")]
    pub deck_name: Option<String>,

    /// Name decks after their directory, segments joined with `::`.
    #[arg(short = 'H', long)]
    pub hierarchical: bool,

    /// Push built decks to the remote collection.
    #[arg(short, long)]
    pub push: bool,

    /// Remove artifacts of successfully pushed decks.
    #[arg(long)]
    pub delete_after: bool,

    /// Trigger a remote sync after pushing.
    #[arg(long)]
    pub sync: bool,

    /// Number of concurrent pushes (1 to 8).
    #[arg(short, long, value_name = "count")]
    pub workers: Option<usize>,

    /// Only process decks whose name matches this glob.
    #[arg(long, value_name = "pattern")]
    pub deck_filter: Option<String>,

    /// Delete remote notes no source describes.
    #[arg(long)]
    pub prune: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct WatchArgs {
    /// Deck source or directory of deck sources to watch.
    #[arg(required = true, value_name = "path")]
    pub path: PathBuf,

    /// Directory to write artifacts to.
    #[arg(short, long, value_name = "dir")]
    pub output_dir: Option<PathBuf>,

    /// Push rebuilt decks to the remote collection.
    #[arg(short, long)]
    pub push: bool,

    /// Delete remote notes no source describes.
    #[arg(long)]
    pub prune: bool,

    /// Quiet period in milliseconds before rebuilding.
    #[arg(long, value_name = "ms")]
    pub debounce_ms: Option<u64>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CheckArgs {
    /// Deck sources to check.
    #[arg(required = true, value_name = "source")]
    pub sources: Vec<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ConfigArgs {
    /// Print a commented configuration template.
    #[arg(long, group = "view")]
    pub template: bool,

    /// List configuration files in the order they apply.
    #[arg(long, group = "view")]
    pub layers: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let layer = fmt::layer().compact().with_target(false).without_time();
    let (filter, reload) = reload::Layer::new(log_filter(&cli.overrides()));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    let config = ToolConfig::load(config_layers());
    let settings = match cli.settings(&config) {
        Ok(settings) => settings,
        Err(error) => {
            error!("{error:?}");
            exit(1);
        }
    };
    if let Err(error) = reload.reload(log_filter(&settings)) {
        warn!("cannot apply configured log level: {error}");
    }

    if let Err(error) = cli.run(settings).await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

/// Log filter for settings, with `RUST_LOG` taking precedence.
fn log_filter(settings: &Settings) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let level = if settings.quiet == Some(true) {
        "error"
    } else {
        match settings.verbose.unwrap_or(0) {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    EnvFilter::new(level)
}

fn run_build(opts: BuildArgs, settings: &Settings) -> Result<()> {
    let options = BuildOptions {
        output_dir: opts.output_dir.unwrap_or_else(|| settings.output_dir()),
        name_override: opts.deck_name,
        scan_root: None,
    };
    let output = build_deck_file(&opts.source, &options, &JsonPackager)?;
    println!("{}", output.artifact.display());

    Ok(())
}

async fn run_push(opts: PushArgs, settings: &Settings) -> Result<()> {
    let bundle = load_bundle(&opts)?;
    let store = AnkiConnect::new(settings.connect_url())?;

    if opts.dry_run {
        let plan = plan_push(&store, &bundle, opts.prune).await?;
        for action in &plan {
            match action {
                SyncAction::Add(note) => {
                    println!("add    {}", note.identity.as_deref().unwrap_or("-"));
                }
                SyncAction::Update(remote_id, note) => println!(
                    "update {} (note {remote_id})",
                    note.identity.as_deref().unwrap_or("-")
                ),
                SyncAction::Delete(remote_id) => println!("delete note {remote_id}"),
                SyncAction::Skip => {}
            }
        }
        println!("{} (dry run): {}", bundle.deck_name, SyncStats::forecast(&plan));
        return Ok(());
    }

    let stats = push_deck(&store, &bundle, opts.prune).await?;
    println!("{}: {stats}", bundle.deck_name);

    if opts.sync {
        store.sync().await?;
        info!("remote collection synced");
    }

    if stats.has_failures() {
        bail!("{} note actions failed", stats.failed);
    }

    Ok(())
}

async fn run_export(opts: ExportArgs, settings: &Settings) -> Result<()> {
    let store = AnkiConnect::new(settings.connect_url())?;
    let text = export_deck(&store, &opts.deck).await?;

    match opts.output {
        Some(path) => {
            write(&path, text)?;
            info!("exported deck {:?} to {:?}", opts.deck, path.display());
        }
        None => print!("{text}"),
    }

    Ok(())
}

fn load_bundle(opts: &PushArgs) -> Result<DeckBundle> {
    let packager = JsonPackager;
    let is_artifact = opts
        .source
        .to_string_lossy()
        .ends_with(packager.extension());

    if is_artifact {
        let mut bundle = packager.read(&opts.source)?;
        if let Some(name) = &opts.deck_name {
            bundle.deck_name = name.clone();
        }
        return Ok(bundle);
    }

    let source = DeckSource::load(&opts.source)?;
    let name = resolve_deck_name(
        opts.deck_name.as_deref(),
        source.deck_name.as_deref(),
        &source.path,
        None,
    );

    Ok(bundle_source(&source, name))
}

async fn run_batch_command(opts: BatchArgs, settings: &Settings) -> Result<()> {
    if opts.files.is_empty() && opts.dir.is_none() {
        bail!("nothing to build, pass deck sources with -f or a directory with -d");
    }

    let mut sources = expand_patterns(&opts.files);
    if let Some(dir) = &opts.dir {
        sources.extend(scan_directory(dir, &opts.pattern, !opts.no_recursive)?);
    }

    let options = BatchOptions {
        output_dir: opts.output_dir.unwrap_or_else(|| settings.output_dir()),
        merge: opts.merge,
        deck_name: opts.deck_name,
        workers: opts.workers.unwrap_or_else(|| settings.workers()),
        push: opts.push,
        delete_after_push: opts.delete_after,
        sync_after_push: opts.sync,
        prune: opts.prune,
        scan_root: opts
            .hierarchical
            .then(|| opts.dir.clone().unwrap_or_default()),
        name_filter: opts.deck_filter,
        live: settings.quiet != Some(true),
    };
    let store = remote_store(opts.push, settings)?;

    let report = run_batch(sources, &options, Arc::new(JsonPackager), store).await?;
    print_report(&report);
    if !report.is_success() {
        bail!("{}", report.summary());
    }

    Ok(())
}

async fn run_watch(opts: WatchArgs, settings: &Settings) -> Result<()> {
    let options = Arc::new(BatchOptions {
        output_dir: opts.output_dir.unwrap_or_else(|| settings.output_dir()),
        workers: settings.workers(),
        push: opts.push,
        prune: opts.prune,
        ..Default::default()
    });
    let packager: Arc<dyn DeckPackager> = Arc::new(JsonPackager);
    let store = remote_store(opts.push, settings)?;
    let quiet = opts
        .debounce_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| settings.debounce());

    let target = opts.path.clone();
    if let Err(error) = rebuild(target.clone(), Arc::clone(&options), Arc::clone(&packager), store.clone()).await {
        warn!("initial build failed: {error:?}");
    }

    let mut handle = watch(&opts.path, quiet, &settings.ignore_patterns(), move || {
        rebuild(target.clone(), Arc::clone(&options), Arc::clone(&packager), store.clone())
    })?;

    tokio::signal::ctrl_c().await?;
    handle.stop();
    let rebuilds = handle.wait().await;
    info!("rebuilt {rebuilds} times");

    Ok(())
}

async fn rebuild(
    target: PathBuf,
    options: Arc<BatchOptions>,
    packager: Arc<dyn DeckPackager>,
    store: Option<Arc<dyn RemoteStore>>,
) -> Result<()> {
    let sources = if target.is_dir() {
        scan_directory(&target, "*.toml", false)?
    } else {
        vec![target]
    };

    let report = run_batch(sources, &options, packager, store).await?;
    if !report.is_success() {
        for (name, message) in &report.errors {
            warn!("{name}: {message}");
        }
        bail!("{}", report.summary());
    }

    info!("{}", report.summary());
    Ok(())
}

fn run_check(opts: CheckArgs) -> Result<()> {
    let mut broken = 0;
    for path in &opts.sources {
        let source = match DeckSource::load(path) {
            Ok(source) => source,
            Err(error) => {
                error!("{error}");
                broken += 1;
                continue;
            }
        };

        let findings = validate(&source);
        for finding in &findings {
            println!("{}: {finding}", path.display());
        }
        println!(
            "{}: {} notes, {} models, {} warnings",
            path.display(),
            source.notes.len(),
            source.models.len(),
            findings.len()
        );
    }

    if broken > 0 {
        bail!("{broken} of {} deck sources cannot be loaded", opts.sources.len());
    }

    Ok(())
}

fn run_config(opts: ConfigArgs, settings: Settings) -> Result<()> {
    if opts.template {
        print!("{CONFIG_TEMPLATE}");
    } else if opts.layers {
        for path in config_layers() {
            let state = if path.is_file() { "found" } else { "missing" };
            println!("{} ({state})", path.display());
        }
    } else {
        let effective = ToolConfig {
            defaults: settings,
            ..Default::default()
        };
        print!("{effective}");
    }

    Ok(())
}

fn remote_store(push: bool, settings: &Settings) -> Result<Option<Arc<dyn RemoteStore>>> {
    if !push {
        return Ok(None);
    }

    let store: Arc<dyn RemoteStore> = Arc::new(AnkiConnect::new(settings.connect_url())?);
    Ok(Some(store))
}

fn print_report(report: &BatchReport) {
    println!("{}", report.summary());
    if report.stats.total() > 0 {
        println!("notes: {}", report.stats);
    }
    match &report.sync {
        SyncOutcome::NotRequested => {}
        SyncOutcome::Skipped => println!("sync skipped, nothing was pushed"),
        SyncOutcome::Completed => println!("sync completed"),
        SyncOutcome::Failed(message) => println!("sync failed: {message}"),
    }

    if !report.skipped.is_empty() {
        println!("skipped:");
        for (name, message) in &report.skipped {
            println!("  {name}: {message}");
        }
    }

    if !report.errors.is_empty() {
        println!("errors:");
        for (index, (name, message)) in report.errors.iter().enumerate() {
            println!("  {}. {name}: {message}", index + 1);
        }
    }
}
