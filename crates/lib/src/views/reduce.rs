//! Folding view rows into a stored reduction.

use std::collections::BTreeMap;

use tracing::warn;

use super::{Directive, EmittedRow};
use crate::{
    Path, Result, Store,
    constants::{REDUCE, REDUCED_VALUE},
    sublevel::Batch,
};

impl Store {
    /// Fold `removed` then `added` into the reduction of `base`.
    ///
    /// Only keys whose value actually changed are written to `batch`. A failing
    /// script call, including one that runs out of budget, keeps the value
    /// accumulated so far.
    pub(super) async fn fold_reduction(
        &self,
        base: &Path,
        script: &str,
        child: &str,
        removed: &[EmittedRow],
        added: &[EmittedRow],
        batch: &mut Batch,
    ) -> Result<()> {
        let value_path = base.child(REDUCE).child(REDUCED_VALUE);
        let mut current = self.reduced(base).await?;

        let steps = removed
            .iter()
            .map(|row| (Directive::Remove, row))
            .chain(added.iter().map(|row| (Directive::Add, row)));
        for (directive, row) in steps {
            let (source, step, key) = (script.to_string(), row.clone(), child.to_string());
            let acc = current.clone();
            match self
                .call_script(move |runtime| runtime.reduce(&source, directive, &acc, &step, &key))
                .await
            {
                Ok(next) => match next.validate_fragment(&value_path) {
                    Ok(()) => current = next,
                    Err(e) => warn!(base = %base, child, %directive, "discarding reduction: {e}"),
                },
                Err(e) => warn!(base = %base, child, %directive, "reduce script failed: {e}"),
            }
        }

        let mut stored: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        for scanned in self.scan_subtree(&value_path).await? {
            stored.insert(scanned.key.into_bytes(), scanned.value);
        }
        for (path, value) in current.flatten(&value_path)? {
            let key = path.key();
            if stored.remove(&key).as_ref() != Some(&value) {
                batch.put(self.docs(), key, value);
            }
        }
        for key in stored.into_keys() {
            batch.delete(self.docs(), key);
        }
        Ok(())
    }
}
