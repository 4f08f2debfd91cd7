//! Content-addressed change detection.
//!
//! Decides, per file, whether indexing work is needed by comparing the
//! file's current fingerprint against what the store already holds for
//! that source. The store is the source of truth; there is no separate
//! bookkeeping file to drift out of sync.
//!
//! When the store lookup itself fails the detector fails open: the file
//! is reindexed rather than silently skipped. A repeated store outage
//! costs repeated work, never a stale index. That outcome is kept
//! distinct from "never indexed" so callers can log and count it.

use std::path::Path;

use crate::hash;
use crate::ident;
use crate::store::IndexStore;

/// Why the detector decided the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    /// File vanished between scan and detection; nothing to index.
    Missing,
    /// No record for this source exists yet.
    NotIndexed,
    /// Stored fingerprint matches the current one.
    Unchanged,
    /// Stored fingerprint differs from the current one.
    Changed,
    /// The store lookup failed; fail-open toward reindexing.
    StoreUnavailable,
}

/// The detector's verdict for one file.
#[derive(Debug, Clone)]
pub struct Decision {
    pub reindex: bool,
    pub outcome: LookupOutcome,
    /// Current fingerprint, present whenever the file exists. Reused by
    /// the pipeline so each document is hashed exactly once per run.
    pub fingerprint: Option<String>,
}

/// Decide whether `path` needs (re)indexing.
///
/// Fails only when the file exists but cannot be hashed; store failures
/// are absorbed into the fail-open decision.
pub async fn needs_indexing(
    store: &dyn IndexStore,
    path: &Path,
) -> std::io::Result<Decision> {
    if !path.exists() {
        return Ok(Decision {
            reindex: false,
            outcome: LookupOutcome::Missing,
            fingerprint: None,
        });
    }

    let current = hash::fingerprint(path)?;
    let source = ident::normalize(path);

    let records = match store.get_by_source(&source).await {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(source = %source, error = %e, "store lookup failed, failing open");
            return Ok(Decision {
                reindex: true,
                outcome: LookupOutcome::StoreUnavailable,
                fingerprint: Some(current),
            });
        }
    };

    if records.is_empty() {
        return Ok(Decision {
            reindex: true,
            outcome: LookupOutcome::NotIndexed,
            fingerprint: Some(current),
        });
    }

    // All chunks of a document carry the same hash; one match suffices.
    let unchanged = records.iter().any(|r| r.chunk.content_hash == current);
    Ok(Decision {
        reindex: !unchanged,
        outcome: if unchanged {
            LookupOutcome::Unchanged
        } else {
            LookupOutcome::Changed
        },
        fingerprint: Some(current),
    })
}
