// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Media references inside field values.
//!
//! Field values refer to media files through the `src` attribute of image
//! and audio tags, e.g., `<img src="cat.png">`, or through sound tags, e.g.,
//! `[sound:gato.mp3]`. References with a directory part are reduced to the
//! file name. URLs and inline data are not media references.

use regex::Regex;
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::LazyLock,
};

static REFERENCE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"<img[^>]+src=["']([^"']+)["']"#,
        r#"<audio[^>]+src=["']([^"']+)["']"#,
        r"\[sound:([^\]]+)\]",
    ]
    .into_iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Collect media file names referenced by a field value.
pub fn media_references(text: &str) -> BTreeSet<String> {
    REFERENCE_PATTERNS
        .iter()
        .flat_map(|pattern| pattern.captures_iter(text))
        .filter_map(|captures| captures.get(1))
        .filter_map(|found| reference_name(found.as_str()))
        .collect()
}

/// Split referenced media into files found in `media_dir` and missing names.
pub fn locate_media(
    media_dir: &Path,
    refs: impl IntoIterator<Item = impl AsRef<str>>,
) -> (Vec<(String, PathBuf)>, Vec<String>) {
    let mut found = Vec::new();
    let mut missing = Vec::new();
    for name in refs {
        let name = name.as_ref();
        let path = media_dir.join(name);
        if path.is_file() {
            found.push((name.to_string(), path));
        } else {
            missing.push(name.to_string());
        }
    }

    (found, missing)
}

fn reference_name(candidate: &str) -> Option<String> {
    let candidate = candidate.trim();
    if candidate.contains("://") || candidate.starts_with("data:") {
        return None;
    }

    Path::new(candidate)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs::{create_dir_all, write};

    #[test]
    fn media_references_finds_images_and_sounds() {
        let text = r#"<img src="cat.png"> [sound:gato.mp3] <img src='dog.jpg'/> [sound:cat.png]"#;
        let result = media_references(text).into_iter().collect::<Vec<_>>();
        assert_eq!(result, vec!["cat.png", "dog.jpg", "gato.mp3"]);
    }

    #[test]
    fn media_references_reduces_paths_and_skips_urls() {
        let text = r#"<img src="https://x.org/a.png"><img src="sub/b.png"><img src=c.png>[sound:"#;
        let result = media_references(text).into_iter().collect::<Vec<_>>();
        assert_eq!(result, vec!["b.png"]);
    }

    #[test]
    fn media_references_only_reads_media_tags() {
        let text = r#"<script src="x.js"></script> see src="notes.txt" <audio controls src="hola.ogg">"#;
        let result = media_references(text).into_iter().collect::<Vec<_>>();
        assert_eq!(result, vec!["hola.ogg"]);
    }

    #[sealed_test]
    fn locate_media_splits_found_and_missing() {
        create_dir_all("media").unwrap();
        write("media/cat.png", b"png").unwrap();

        let (found, missing) = locate_media(Path::new("media"), ["cat.png", "dog.png"]);
        assert_eq!(found, vec![("cat.png".to_string(), PathBuf::from("media/cat.png"))]);
        assert_eq!(missing, vec!["dog.png".to_string()]);
    }
}
