//! Store configuration.

use serde::{Deserialize, Serialize};

use crate::rev::DEFAULT_SUFFIX_LEN;

/// Default for [`StoreConfig::script_instruction_limit`].
pub const DEFAULT_INSTRUCTION_LIMIT: u64 = 10_000_000;

/// Tunables for a [`crate::Store`].
///
/// Deserializes from any serde format; missing fields take their defaults.
///
/// ```rust
/// use canopy::StoreConfig;
///
/// let config: StoreConfig = serde_json::from_str(r#"{"views_enabled": false}"#)?;
/// assert!(!config.views_enabled);
/// assert_eq!(config.revision_suffix_len, 5);
/// assert_eq!(config.script_instruction_limit, 10_000_000);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Characters in the random part of each revision.
    pub revision_suffix_len: usize,
    /// Run map/reduce scripts after mutations. Scripts are still stored when disabled.
    pub views_enabled: bool,
    /// Instructions one call of the built-in Lua runtime may run before it is
    /// aborted. Ignored when the builder is given a runtime.
    pub script_instruction_limit: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            revision_suffix_len: DEFAULT_SUFFIX_LEN,
            views_enabled: true,
            script_instruction_limit: DEFAULT_INSTRUCTION_LIMIT,
        }
    }
}
