//! Deterministic reconciliation of two versions of the same key.
//!
//! Ordering, highest priority first:
//! 1. a missing side loses;
//! 2. entries from the same origin compare by `version`;
//! 3. otherwise the later `timestamp_ms` wins;
//! 4. equal timestamps: tombstone over value, then greater value bytes,
//!    greater origin, greater version, greater `max_age_ms`.
//!
//! Every field takes part in step 4, so two entries compare `Equal` only
//! when they are identical and the result never depends on argument order.

use std::cmp::Ordering;

use disco_types::Entry;

/// `Greater` means `a` wins over `b`.
pub fn compare(a: &Entry, b: &Entry) -> Ordering {
    if a.origin == b.origin && a.version != b.version {
        return a.version.cmp(&b.version);
    }
    a.timestamp_ms
        .cmp(&b.timestamp_ms)
        .then_with(|| a.is_tombstone().cmp(&b.is_tombstone()))
        .then_with(|| a.value.cmp(&b.value))
        .then_with(|| a.origin.cmp(&b.origin))
        .then_with(|| a.version.cmp(&b.version))
        .then_with(|| a.max_age_ms.cmp(&b.max_age_ms))
}

/// Pick the winner between two entries for the same key.
pub fn resolve_pair<'a>(a: &'a Entry, b: &'a Entry) -> &'a Entry {
    match compare(a, b) {
        Ordering::Less => b,
        Ordering::Equal | Ordering::Greater => a,
    }
}

/// Reconcile an incoming entry with whatever is stored locally.
pub fn resolve(existing: Option<&Entry>, incoming: &Entry) -> Entry {
    match existing {
        None => incoming.clone(),
        Some(current) => resolve_pair(current, incoming).clone(),
    }
}
