// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where configuration layers live on the user's system.

use crate::config::PROJECT_CONFIG_FILE;

use std::path::PathBuf;

/// Determine default absolute path to the user configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/deckhand/config.toml`.
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("deckhand").join("config.toml"))
        .ok_or(NoWayHome)
}

/// Configuration layers in the order they apply.
///
/// The user file is left out if the home directory cannot be determined.
pub fn config_layers() -> Vec<PathBuf> {
    let mut layers = Vec::with_capacity(2);
    if let Ok(path) = default_config_path() {
        layers.push(path);
    }
    layers.push(PathBuf::from(PROJECT_CONFIG_FILE));

    layers
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("HOME", "/home/blah"), ("XDG_CONFIG_HOME", "/home/blah/.config")])]
    fn config_layers_end_with_project_file() {
        let layers = config_layers();
        assert_eq!(layers.last(), Some(&PathBuf::from(PROJECT_CONFIG_FILE)));
        assert_eq!(
            layers.first(),
            Some(&PathBuf::from("/home/blah/.config/deckhand/config.toml"))
        );
    }
}
