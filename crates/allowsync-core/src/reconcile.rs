//! Allow-list merge
//!
//! [`reconcile`] decides whether the remote list needs rewriting for a
//! newly observed address, and if so computes the complete replacement.
//! It is pure: no I/O, no errors, same output for the same input.
//!
//! ## Ownership
//!
//! The agent owns every entry whose label equals its configured label.
//! Normally that is zero or one entry; earlier partial failures or manual
//! edits can leave several, and all of them are treated as ours. Everything
//! else belongs to other writers and is passed through verbatim, in order.

use std::net::IpAddr;

use crate::model::{AllowList, AllowListEntry};

/// Outcome of a merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The remote list already holds exactly one owned entry for the address
    NoChange,
    /// The complete list that should replace the remote one
    Desired(AllowList),
}

impl Reconciliation {
    /// Whether a remote mutation is needed
    pub fn needs_update(&self) -> bool {
        matches!(self, Reconciliation::Desired(_))
    }
}

/// Merge the owned entry for `observed` into `current`
///
/// Returns [`Reconciliation::NoChange`] only when exactly one entry carries
/// `owned_label` and it already points at `observed`. Any other state
/// (missing entry, stale address, duplicates) yields the foreign entries
/// followed by a single fresh owned entry.
pub fn reconcile(observed: IpAddr, owned_label: &str, current: &AllowList) -> Reconciliation {
    let candidate = AllowListEntry::for_host(observed, owned_label);

    let (mine, others): (Vec<&AllowListEntry>, Vec<&AllowListEntry>) = current
        .entries()
        .iter()
        .partition(|entry| entry.label == owned_label);

    if let [only] = mine.as_slice()
        && only.same_network(&candidate)
    {
        return Reconciliation::NoChange;
    }

    if mine.len() > 1 {
        tracing::debug!(
            "Found {} entries labelled {}, collapsing to one",
            mine.len(),
            owned_label
        );
    }

    let desired = others
        .into_iter()
        .cloned()
        .chain(std::iter::once(candidate))
        .collect();

    Reconciliation::Desired(desired)
}
