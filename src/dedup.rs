//! Persistent URL dedup index keyed by SHA-256 of the canonical link.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

/// Lowercase hex SHA-256 of a link (always 64 chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of_link(link: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(link.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DedupIndex {
    seen: HashSet<Fingerprint>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.seen.contains(fp)
    }

    /// Idempotent. Returns true if the fingerprint was not present before.
    pub fn add(&mut self, fp: Fingerprint) -> bool {
        self.seen.insert(fp)
    }

    /// Un-marks a fingerprint whose article never reached the log.
    pub fn remove(&mut self, fp: &Fingerprint) -> bool {
        self.seen.remove(fp)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Sorted fingerprints, so the persisted file is stable between runs.
    pub fn snapshot(&self) -> Vec<Fingerprint> {
        let mut out: Vec<Fingerprint> = self.seen.iter().cloned().collect();
        out.sort();
        out
    }
}

impl FromIterator<Fingerprint> for DedupIndex {
    fn from_iter<I: IntoIterator<Item = Fingerprint>>(iter: I) -> Self {
        Self {
            seen: iter.into_iter().collect(),
        }
    }
}
