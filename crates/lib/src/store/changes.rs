//! The global update sequence and its change feed.
//!
//! Every committed mutation reserves the next sequence number from a counter
//! kept in the engine itself, then writes one entry under `by-seq/<seq>` in
//! the same batch as its document edits. The feed never lists a change that
//! did not happen, and stores sharing an engine never reuse a number. A
//! failed commit leaves a gap in the numbering.

use serde::{Deserialize, Serialize};

use super::{Store, StoreError, prefix_end};
use crate::{Path, Result, Rev, backend::KeyRange, constants::UPDATE_SEQ_KEY, sublevel::Sublevel};

/// One committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub seq: u64,
    /// Every node whose revision was bumped, with its new revision.
    pub revs: Vec<(Path, Rev)>,
}

/// Zero-padded so keys sort numerically.
pub(crate) fn seq_key(seq: u64) -> String {
    format!("{seq:020}")
}

/// The highest sequence recorded in `seqs`, or 0 for a fresh store.
pub(crate) async fn load_update_seq(seqs: &Sublevel) -> Result<u64> {
    let range = KeyRange::new(Vec::new(), prefix_end(""))
        .reverse(true)
        .limit(Some(1));
    let Some((key, _)) = seqs.scan(&range).await?.into_iter().next() else {
        return Ok(0);
    };
    let key = String::from_utf8_lossy(&key).into_owned();
    key.parse().map_err(|_| {
        StoreError::MalformedValue {
            key,
            reason: "sequence key is not a number".to_string(),
        }
        .into()
    })
}

/// Start the counter above an existing feed that has none yet.
pub(crate) async fn seed_counter(local: &Sublevel, last_seq: u64) -> Result<()> {
    if last_seq > 0 && local.get(UPDATE_SEQ_KEY.as_bytes()).await?.is_none() {
        local
            .put(UPDATE_SEQ_KEY.as_bytes(), last_seq.to_string().as_bytes())
            .await?;
    }
    Ok(())
}

pub(crate) async fn reserve_seq(local: &Sublevel) -> Result<u64> {
    local.increment(UPDATE_SEQ_KEY.as_bytes()).await
}

impl Store {
    /// Sequence number of the last committed mutation, 0 for an empty feed.
    ///
    /// Read from the engine, so commits made through other stores on the
    /// same engine count too.
    pub async fn update_seq(&self) -> Result<u64> {
        load_update_seq(&self.inner.seqs).await
    }

    /// Changes committed after `since`, oldest first.
    pub async fn changes(&self, since: u64, limit: Option<usize>) -> Result<Vec<Change>> {
        let range = KeyRange::new(seq_key(since.saturating_add(1)), prefix_end(""))
            .limit(limit.filter(|limit| *limit > 0));
        self.scan_changes(&range).await
    }

    /// Changes after `since` that bumped a node strictly below `path`.
    ///
    /// Each change keeps only those nodes, with paths relative to `path`, the
    /// way [`Store::all_revs`] lists them.
    pub async fn changes_at(&self, path: &Path, since: u64) -> Result<Vec<Change>> {
        let range = KeyRange::new(seq_key(since.saturating_add(1)), prefix_end(""));
        Ok(self
            .scan_changes(&range)
            .await?
            .into_iter()
            .filter_map(|change| change.below(path))
            .collect())
    }

    /// Sequence of the last change below `path`, or 0 when there is none.
    pub async fn last_seq_at(&self, path: &Path) -> Result<u64> {
        let range = KeyRange::new(Vec::new(), prefix_end("")).reverse(true);
        Ok(self
            .scan_changes(&range)
            .await?
            .into_iter()
            .find_map(|change| change.below(path))
            .map_or(0, |change| change.seq))
    }

    async fn scan_changes(&self, range: &KeyRange) -> Result<Vec<Change>> {
        let mut changes = Vec::new();
        for (key, value) in self.inner.seqs.scan(range).await? {
            let change: Change = serde_json::from_slice(&value).map_err(|err| StoreError::MalformedValue {
                key: String::from_utf8_lossy(&key).into_owned(),
                reason: err.to_string(),
            })?;
            changes.push(change);
        }
        Ok(changes)
    }
}

impl Change {
    /// This change restricted to nodes strictly below `base`, if any.
    fn below(self, base: &Path) -> Option<Self> {
        let revs: Vec<(Path, Rev)> = self
            .revs
            .into_iter()
            .filter_map(|(path, rev)| {
                path.relative_to(base)
                    .filter(|rel| !rel.is_root())
                    .map(|rel| (rel, rev))
            })
            .collect();
        (!revs.is_empty()).then_some(Self { seq: self.seq, revs })
    }
}
