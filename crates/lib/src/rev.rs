//! Revision stamps.
//!
//! A revision is `"<N>-<suffix>"`. `N` increases by one on every bump of the
//! same path. The suffix starts with a fresh random character and keeps the
//! leading characters of the previous suffix, so two writers bumping from the
//! same base almost never produce the same string.

use std::fmt;

use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};

/// Default number of characters in a revision suffix.
pub const DEFAULT_SUFFIX_LEN: usize = 5;

/// A revision stamp for one path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rev(String);

impl Rev {
    /// Wrap a revision string as received from a caller or peer.
    pub fn new(rev: impl Into<String>) -> Self {
        Self(rev.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The numeric prefix, or 0 for a malformed revision.
    pub fn number(&self) -> u64 {
        self.0
            .split_once('-')
            .map_or(self.0.as_str(), |(n, _)| n)
            .parse()
            .unwrap_or(0)
    }

    /// Everything after the first `-`.
    pub fn suffix(&self) -> &str {
        self.0.split_once('-').map_or("", |(_, s)| s)
    }

    /// The revision that follows `previous` (or the first revision).
    pub fn bump(previous: Option<&Rev>, suffix_len: usize) -> Rev {
        let mut rng = rand::thread_rng();
        let number = previous.map_or(0, Rev::number) + 1;
        let inherited = previous.map_or("", Rev::suffix);

        let mut suffix = String::with_capacity(suffix_len);
        if suffix_len > 0 {
            suffix.push(rng.sample(Alphanumeric) as char);
        }
        suffix.extend(inherited.chars().take(suffix_len.saturating_sub(1)));
        while suffix.chars().count() < suffix_len {
            suffix.push(rng.sample(Alphanumeric) as char);
        }
        Rev(format!("{number}-{suffix}"))
    }
}

impl fmt::Display for Rev {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Rev {
    fn from(s: &str) -> Self {
        Rev(s.to_string())
    }
}

impl From<String> for Rev {
    fn from(s: String) -> Self {
        Rev(s)
    }
}
