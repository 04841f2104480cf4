// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Note content fingerprints.
//!
//! A __fingerprint__ is a short digest over the identity, field values, and
//! tags of a note. Two notes with equal fingerprints are considered to carry
//! the same content. Field values are hashed in the order given, so callers
//! must line both sides up on the same field order first. Tags are hashed in
//! sorted order, because tags are a set.

use sha2::{Digest, Sha256};
use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Byte length of a fingerprint.
pub const FINGERPRINT_LEN: usize = 8;

/// Short digest of note content.
#[derive(Default, Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for byte in self.0 {
            write!(fmt, "{byte:02x}")?;
        }

        Ok(())
    }
}

/// Compute fingerprint of note content.
///
/// Every piece is length-prefixed, so moving characters between adjacent
/// values always changes the result.
pub fn fingerprint<'a>(
    identity: &str,
    values: impl IntoIterator<Item = &'a str>,
    tags: impl IntoIterator<Item = &'a str>,
) -> Fingerprint {
    let mut hasher = Sha256::new();
    feed(&mut hasher, identity.as_bytes());

    let values = values.into_iter().collect::<Vec<_>>();
    hasher.update((values.len() as u64).to_le_bytes());
    for value in values {
        feed(&mut hasher, value.as_bytes());
    }

    let tags = tags.into_iter().collect::<BTreeSet<_>>();
    hasher.update((tags.len() as u64).to_le_bytes());
    for tag in tags {
        feed(&mut hasher, tag.as_bytes());
    }

    let digest = hasher.finalize();
    let mut bytes = [0u8; FINGERPRINT_LEN];
    bytes.copy_from_slice(&digest[..FINGERPRINT_LEN]);
    Fingerprint(bytes)
}

fn feed(hasher: &mut Sha256, data: &[u8]) {
    hasher.update((data.len() as u64).to_le_bytes());
    hasher.update(data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fingerprint_is_deterministic() {
        let first = fingerprint("n1", ["Q1", "A1"], ["verbs", "spanish"]);
        let second = fingerprint("n1", ["Q1", "A1"], ["spanish", "verbs"]);
        assert_eq!(first, second);
        assert_eq!(first.to_string().len(), FINGERPRINT_LEN * 2);
    }

    #[test]
    fn fingerprint_separates_adjacent_values() {
        assert_ne!(fingerprint("n1", ["ab", "c"], []), fingerprint("n1", ["a", "bc"], []));
        assert_ne!(fingerprint("n1", ["a"], ["b"]), fingerprint("n1", ["a", "b"], []));
    }

    #[test]
    fn fingerprint_covers_every_input() {
        let base = fingerprint("n1", ["Q1", "A1"], ["verbs"]);
        assert_ne!(base, fingerprint("n2", ["Q1", "A1"], ["verbs"]));
        assert_ne!(base, fingerprint("n1", ["A1", "Q1"], ["verbs"]));
        assert_ne!(base, fingerprint("n1", ["Q1", "A1"], ["nouns"]));
    }
}
