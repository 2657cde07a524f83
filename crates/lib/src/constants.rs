//! Constants used throughout the canopy library.
//!
//! Reserved path segments live in the same keyspace as document data, so every
//! component that builds or interprets physical keys goes through these names.

/// Separator between path segments in a physical key.
pub const SEPARATOR: char = '/';

/// Segment holding the revision of its parent node.
pub const REV: &str = "_rev";

/// Segment holding the tombstone flag of its parent node.
pub const DELETED: &str = "_del";

/// JSON key for a node's own leaf value. Never stored as a segment.
pub const VALUE: &str = "_val";

/// Segment holding a node's map script; emitted rows live beneath it.
pub const MAP: &str = "@map";

/// Segment holding a node's reduce script.
pub const REDUCE: &str = "!reduce";

/// Segment under `!reduce` where the accumulated reduction is stored.
pub const REDUCED_VALUE: &str = "value";

/// Value written at a `_del` key.
pub const TOMBSTONE: &[u8] = b"1";

/// Leading characters that mark a segment as reserved.
pub const RESERVED_SIGILS: [char; 3] = ['_', '@', '!'];

/// Byte that sorts above every byte of a UTF-8 encoded key.
///
/// Appending it to a key prefix gives the exclusive upper bound of a subtree scan.
pub const SCAN_SENTINEL: u8 = 0xFF;

/// Sublevel holding document data.
pub const DOCS_NAMESPACE: &str = "docs";

/// Sublevel holding local-only bookkeeping (never replicated).
pub const LOCAL_NAMESPACE: &str = "local";

/// Sublevel holding the by-sequence change feed.
pub const SEQ_NAMESPACE: &str = "by-seq";

/// Key in the `local` sublevel counting reserved sequence numbers.
pub const UPDATE_SEQ_KEY: &str = "update_seq";
