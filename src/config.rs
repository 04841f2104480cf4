// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Deckhand reads its settings from layered TOML files. The user file comes
//! first, then the project file in the working directory, then an optional
//! named profile, and finally command-line flags. Later layers only replace
//! the settings they actually set.
//!
//! # General Layout
//!
//! ```toml
//! [settings]
//! output-dir = "~/decks/out"
//! workers = 4
//!
//! [profiles.fast]
//! workers = 8
//! debounce-ms = 250
//! ```

use crate::{
    batch::pool::DEFAULT_WORKERS,
    sync::connect::DEFAULT_CONNECT_URL,
    watch::DEFAULT_QUIET_PERIOD,
};

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use tracing::{debug, warn};

/// Name of the per-project configuration file.
pub const PROJECT_CONFIG_FILE: &str = ".deckhand.toml";

/// Template printed by `deckhand config --template`.
pub const CONFIG_TEMPLATE: &str = r#"# Deckhand configuration.
#
# Settings apply to every command. Profiles selected with `--profile <name>`
# override them.

[settings]
# Directory receiving built deck artifacts.
output-dir = "."

# Number of concurrent push workers (1 to 8).
workers = 4

# AnkiConnect endpoint.
connect-url = "http://127.0.0.1:8765"

# Quiet period of the watcher in milliseconds.
debounce-ms = 1000

# Gitignore-style patterns the watcher never reacts to.
ignore = ["*.swp", "*~", ".git"]

[profiles.fast]
workers = 8
debounce-ms = 250
"#;

/// Layered tool configuration.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ToolConfig {
    /// Settings applied to every command.
    #[serde(default, rename = "settings")]
    pub defaults: Settings,

    /// Named overlays selected with `--profile`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, Settings>,
}

impl ToolConfig {
    /// Load every readable layer in order.
    ///
    /// Missing files are skipped quietly, malformed files with a warning.
    pub fn load(paths: impl IntoIterator<Item = impl AsRef<Path>>) -> Self {
        let mut config = Self::default();
        for path in paths {
            let path = path.as_ref();
            match Self::read(path) {
                Ok(Some(layer)) => {
                    debug!("loaded configuration layer {:?}", path.display());
                    config.merge(layer);
                }
                Ok(None) => {}
                Err(error) => warn!("skipping configuration {:?}: {error}", path.display()),
            }
        }

        config
    }

    /// Read single configuration file, if it exists.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if the file exists but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if the file is malformed.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }

        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            source,
            path: path.to_path_buf(),
        })?;

        data.parse().map(Some)
    }

    /// Overlay `other` on top of this configuration.
    pub fn merge(&mut self, other: ToolConfig) {
        self.defaults.overlay(&other.defaults);
        for (name, settings) in other.profiles {
            self.profiles.entry(name).or_default().overlay(&settings);
        }
    }

    /// Effective settings with profile `profile` applied.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::UnknownProfile`] if no layer defines the
    ///   profile.
    pub fn resolve(&self, profile: Option<&str>) -> Result<Settings> {
        let mut settings = self.defaults.clone();
        if let Some(name) = profile {
            let overlay = self
                .profiles
                .get(name)
                .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })?;
            settings.overlay(overlay);
        }

        Ok(settings)
    }
}

impl FromStr for ToolConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: ToolConfig = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every output directory.
        config.defaults.expand()?;
        for settings in config.profiles.values_mut() {
            settings.expand()?;
        }

        Ok(config)
    }
}

impl Display for ToolConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Single layer of settings.
///
/// Every field is optional so layers can be stacked. Use the accessor
/// methods to read a setting with its default filled in.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    /// Directory receiving built artifacts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    /// Number of concurrent push workers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// AnkiConnect endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_url: Option<String>,

    /// Verbosity level, same as passing `-v` that many times.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose: Option<u8>,

    /// Only log errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiet: Option<bool>,

    /// Quiet period of the watcher in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,

    /// Patterns the watcher ignores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore: Option<Vec<String>>,
}

impl Settings {
    /// Replace every setting that `other` sets.
    pub fn overlay(&mut self, other: &Settings) {
        if other.output_dir.is_some() {
            self.output_dir.clone_from(&other.output_dir);
        }
        if other.workers.is_some() {
            self.workers = other.workers;
        }
        if other.connect_url.is_some() {
            self.connect_url.clone_from(&other.connect_url);
        }
        if other.verbose.is_some() {
            self.verbose = other.verbose;
        }
        if other.quiet.is_some() {
            self.quiet = other.quiet;
        }
        if other.debounce_ms.is_some() {
            self.debounce_ms = other.debounce_ms;
        }
        if other.ignore.is_some() {
            self.ignore.clone_from(&other.ignore);
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or(DEFAULT_WORKERS)
    }

    pub fn connect_url(&self) -> &str {
        self.connect_url.as_deref().unwrap_or(DEFAULT_CONNECT_URL)
    }

    pub fn debounce(&self) -> Duration {
        self.debounce_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_QUIET_PERIOD)
    }

    /// Configured ignore patterns, empty if none are set.
    pub fn ignore_patterns(&self) -> Vec<String> {
        self.ignore.clone().unwrap_or_default()
    }

    fn expand(&mut self) -> Result<()> {
        if let Some(dir) = &self.output_dir {
            let expanded = shellexpand::full(dir.to_string_lossy().as_ref())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned();
            self.output_dir = Some(PathBuf::from(expanded));
        }

        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Failed to read configuration file.
    #[error("failed to read configuration {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Requested profile is not defined by any layer.
    #[error("profile {name:?} is not defined")]
    UnknownProfile { name: String },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("DECKS", "/home/blah/decks")])]
    fn deserialize_tool_config() -> anyhow::Result<()> {
        let result: ToolConfig = r#"
            [settings]
            output-dir = "$DECKS/out"
            workers = 2
            ignore = ["*.swp", ".git"]

            [profiles.fast]
            workers = 8
            debounce-ms = 250
        "#
        .parse()?;

        let expect = ToolConfig {
            defaults: Settings {
                output_dir: Some(PathBuf::from("/home/blah/decks/out")),
                workers: Some(2),
                ignore: Some(vec!["*.swp".into(), ".git".into()]),
                ..Default::default()
            },
            profiles: BTreeMap::from([(
                "fast".to_string(),
                Settings {
                    workers: Some(8),
                    debounce_ms: Some(250),
                    ..Default::default()
                },
            )]),
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn serialize_tool_config() {
        let result = ToolConfig {
            defaults: Settings {
                output_dir: Some(PathBuf::from("/home/blah/decks")),
                workers: Some(2),
                ..Default::default()
            },
            ..Default::default()
        }
        .to_string();

        let expect = indoc! {r#"
            [settings]
            output-dir = "/home/blah/decks"
            workers = 2
        "#};

        assert_eq!(result, expect);
    }

    #[test]
    fn template_parses() -> anyhow::Result<()> {
        let config: ToolConfig = CONFIG_TEMPLATE.parse()?;
        assert_eq!(config.defaults.workers(), 4);
        assert_eq!(config.resolve(Some("fast"))?.workers(), 8);

        Ok(())
    }

    #[test]
    fn resolve_applies_profile_overlay() -> anyhow::Result<()> {
        let mut config: ToolConfig = indoc! {r#"
            [settings]
            workers = 2
            connect-url = "http://user:8765"

            [profiles.ci]
            quiet = true
        "#}
        .parse()?;
        let project: ToolConfig = indoc! {r#"
            [settings]
            workers = 3

            [profiles.ci]
            workers = 1
        "#}
        .parse()?;
        config.merge(project);

        let plain = config.resolve(None)?;
        assert_eq!(plain.workers(), 3);
        assert_eq!(plain.connect_url(), "http://user:8765");
        assert_eq!(plain.debounce(), DEFAULT_QUIET_PERIOD);

        let ci = config.resolve(Some("ci"))?;
        assert_eq!(ci.workers(), 1);
        assert_eq!(ci.quiet, Some(true));

        assert!(matches!(
            config.resolve(Some("missing")),
            Err(ConfigError::UnknownProfile { .. })
        ));

        Ok(())
    }

    #[sealed_test]
    fn load_skips_missing_and_malformed_layers() -> anyhow::Result<()> {
        std::fs::write("user.toml", "[settings]\nworkers = 2\n")?;
        std::fs::write("broken.toml", "[settings\nworkers = ")?;
        std::fs::write(PROJECT_CONFIG_FILE, "[settings]\ndebounce-ms = 10\n")?;

        let config = ToolConfig::load(["user.toml", "missing.toml", "broken.toml", PROJECT_CONFIG_FILE]);
        let settings = config.resolve(None)?;
        assert_eq!(settings.workers(), 2);
        assert_eq!(settings.debounce(), Duration::from_millis(10));
        assert_eq!(settings.output_dir(), PathBuf::from("."));

        Ok(())
    }
}
