//! Running map scripts and maintaining their rows.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::{EmittedRow, ViewCommand};
use crate::{
    Path, Result, Store,
    backend::KeyRange,
    constants::{MAP, REDUCE, REDUCED_VALUE},
    store::prefix_end,
    sublevel::Batch,
    tree::validate_segment,
};

const MAPPED: &str = "mapped";

/// Bookkeeping key listing the rows `child` emitted into the view at `base`.
///
/// JSON-encoded so that no base or child name can make one key a prefix of
/// another base's keys.
fn mapped_key(base: &Path, child: &str) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&(MAPPED, base.join(), child))?)
}

/// Prefix shared by every bookkeeping key of `base`.
fn mapped_prefix(base: &Path) -> Result<String> {
    let mut prefix = serde_json::to_string(&(MAPPED, base.join()))?;
    prefix.pop();
    prefix.push(',');
    Ok(prefix)
}

impl Store {
    pub(crate) async fn apply_view_command(&self, command: ViewCommand) -> Result<()> {
        match command {
            ViewCommand::RecomputeChildren { base, .. } => self.recompute_children(&base).await,
            ViewCommand::DocumentsChanged { paths } => self.documents_changed(&paths).await,
            ViewCommand::Flush { response } => {
                let _ = response.send(());
                Ok(())
            }
        }
    }

    /// Rebuild the whole view at `base` from its current map script.
    ///
    /// An absent or empty script clears every row and the reduction.
    async fn recompute_children(&self, base: &Path) -> Result<()> {
        let mut children: BTreeSet<String> = self.mapped_children(base).await?;
        match self.records(base, &Default::default()).await {
            Ok(records) => children.extend(records.into_iter().map(|record| record.key)),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        self.reset_reduction(base).await?;
        debug!(base = %base, children = children.len(), "recomputing view");
        for child in children {
            self.run_map(base, &child, false).await?;
        }
        Ok(())
    }

    /// Re-run the map of every ancestor view of each changed path.
    async fn documents_changed(&self, paths: &[Path]) -> Result<()> {
        let mut affected = BTreeSet::new();
        for path in paths {
            let segments = path.segments();
            for (i, key) in segments.iter().enumerate() {
                affected.insert((Path::from_segments(segments[..i].iter().cloned()), key.clone()));
            }
        }

        for (base, child) in affected {
            if self.stored_script(&base, MAP).await?.is_some() {
                self.run_map(&base, &child, true).await?;
            }
        }
        Ok(())
    }

    /// Children of `base` that currently have rows in its view.
    async fn mapped_children(&self, base: &Path) -> Result<BTreeSet<String>> {
        let prefix = mapped_prefix(base)?;
        let range = KeyRange::new(prefix.clone().into_bytes(), prefix_end(&prefix));
        let mut children = BTreeSet::new();
        for (key, _) in self.local().scan(&range).await? {
            let (_, _, child): (String, String, String) = serde_json::from_slice(&key)?;
            children.insert(child);
        }
        Ok(children)
    }

    /// Run the map script of `base` over one child and store the result.
    ///
    /// With `incremental` set, rows that disappear are also folded out of the
    /// reduction; otherwise the caller has already reset it.
    async fn run_map(&self, base: &Path, child: &str, incremental: bool) -> Result<()> {
        let script = self.stored_script(base, MAP).await?.unwrap_or_default();
        let mut rows = Vec::new();
        if !script.is_empty() {
            let doc = match self.read(&base.child(child)).await {
                Ok(doc) => Some(doc),
                Err(err) if err.is_not_found() => None,
                Err(err) => return Err(err),
            };
            if let Some(doc) = doc.filter(|doc| !doc.deleted) {
                let key = child.to_string();
                match self
                    .call_script(move |runtime| runtime.map(&script, &doc, &key))
                    .await
                {
                    Ok(emitted) => rows = emitted,
                    Err(e) => warn!(base = %base, child, "map script failed: {e}"),
                }
            }
        }

        rows.retain(|row| match check_row(row) {
            Ok(()) => true,
            Err(reason) => {
                warn!(base = %base, child, row = %row.path, "dropping emitted row: {reason}");
                false
            }
        });
        self.update_emitted(base, child, rows, incremental).await
    }

    /// Replace the rows `child` contributes to the view at `base`.
    async fn update_emitted(
        &self,
        base: &Path,
        child: &str,
        rows: Vec<EmittedRow>,
        incremental: bool,
    ) -> Result<()> {
        let map_base = base.child(MAP);
        let mapped = mapped_key(base, child)?;
        let previous: Vec<Path> = match self.local().get(&mapped).await? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => Vec::new(),
        };
        let reduce = self.stored_script(base, REDUCE).await?;

        let mut batch = Batch::new();
        let mut removed = Vec::new();
        for rel in &previous {
            let row_path = map_base.concat(rel);
            if incremental && reduce.is_some() {
                match self.read(&row_path).await {
                    Ok(value) => removed.push(EmittedRow::new(rel.clone(), value)),
                    Err(err) if err.is_not_found() => {}
                    Err(err) => return Err(err),
                }
            }
            for scanned in self.scan_subtree(&row_path).await? {
                batch.delete(self.docs(), &scanned.key);
            }
        }

        for row in &rows {
            for (path, value) in row.value.flatten(&map_base.concat(&row.path))? {
                batch.put(self.docs(), path.key(), value);
            }
        }
        if rows.is_empty() {
            batch.delete(self.local(), &mapped);
        } else {
            let paths: Vec<&Path> = rows.iter().map(|row| &row.path).collect();
            batch.put(self.local(), &mapped, serde_json::to_vec(&paths)?);
        }

        if let Some(script) = reduce {
            self.fold_reduction(base, &script, child, &removed, &rows, &mut batch)
                .await?;
        }

        batch.commit(self.backend().as_ref()).await?;
        debug!(base = %base, child, removed = previous.len(), added = rows.len(), "updated view rows");
        Ok(())
    }

    /// Drop the stored reduction of `base`.
    async fn reset_reduction(&self, base: &Path) -> Result<()> {
        let mut batch = Batch::new();
        for scanned in self
            .scan_subtree(&base.child(REDUCE).child(REDUCED_VALUE))
            .await?
        {
            batch.delete(self.docs(), &scanned.key);
        }
        batch.commit(self.backend().as_ref()).await
    }
}

/// Rows need a non-empty path of plain segments and a storable value.
fn check_row(row: &EmittedRow) -> std::result::Result<(), String> {
    if row.path.is_root() {
        return Err("empty row path".to_string());
    }
    for segment in row.path.segments() {
        validate_segment(segment).map_err(|reason| format!("segment '{segment}': {reason}"))?;
    }
    row.value
        .validate_fragment(&row.path)
        .map_err(|err| err.to_string())
}
