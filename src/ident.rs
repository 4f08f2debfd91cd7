//! Deterministic chunk identity.
//!
//! A chunk id is the normalized source path, the 1-based page number when
//! present, and the 0-based chunk index, joined by the ASCII unit
//! separator. The separator is a control character that does not occur in
//! file paths and is distinct from `/` and `\`, so ids are injective over
//! the `(source, page, index)` triples a run produces — which is what
//! makes re-indexing an upsert instead of a duplicate insert.

use std::path::Path;

/// Field separator inside chunk ids. Control character, never present in
/// real paths.
pub const ID_SEPARATOR: char = '\u{1f}';

/// Derive the id for a chunk of `source`. Stable across runs as long as
/// chunking parameters are unchanged.
pub fn assign(source: &Path, page: Option<u32>, chunk_index: u32) -> String {
    let source = normalize(source);
    match page {
        Some(page) => format!("{source}{ID_SEPARATOR}{page}{ID_SEPARATOR}{chunk_index}"),
        None => format!("{source}{ID_SEPARATOR}{chunk_index}"),
    }
}

/// Normalize a path for use as a store key: lossy UTF-8, backslashes
/// folded to forward slashes so ids match across platforms.
pub fn normalize(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
