//! Total ordering, incremental-path computation, and conflict detection over
//! a filesystem's snapshots and bookmarks.

use std::fmt;

use replication_endpoint::{FilesystemVersion, Guid, VersionKind};
use rustc_hash::FxHashSet;

/// Sorts versions by creation TXG ascending, then by kind, so that a
/// bookmark sharing a TXG and GUID with a snapshot sorts strictly before it.
///
/// Snapshots are preferred as send endpoints over bookmarks sharing the same
/// point in time, but the ordering itself only needs the bookmark to sort
/// first; callers that want "the snapshot at this point in time" filter by
/// kind after sorting.
pub fn sort_versions(versions: &mut [FilesystemVersion]) {
    versions.sort_by(|a, b| {
        a.createtxg()
            .cmp(&b.createtxg())
            .then_with(|| kind_rank(a.kind()).cmp(&kind_rank(b.kind())))
    });
}

const fn kind_rank(kind: VersionKind) -> u8 {
    match kind {
        VersionKind::Bookmark => 0,
        VersionKind::Snapshot => 1,
    }
}

/// One edge of an incremental path: replicate from `from` (absent for an
/// initial full send) to `to`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct PathEdge {
    from: Option<FilesystemVersion>,
    to: FilesystemVersion,
}

impl PathEdge {
    /// Builds an edge of an incremental (or initial) path.
    #[must_use]
    pub const fn new(from: Option<FilesystemVersion>, to: FilesystemVersion) -> Self {
        Self { from, to }
    }

    /// Returns the base version, absent for an initial full send.
    #[must_use]
    pub const fn from(&self) -> Option<&FilesystemVersion> {
        self.from.as_ref()
    }

    /// Returns the target version.
    #[must_use]
    pub const fn to(&self) -> &FilesystemVersion {
        &self.to
    }
}

/// A classified conflict between a sender's and a receiver's version
/// histories for one filesystem.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum ConflictClassification {
    /// The two sorted lists share no GUID.
    NoCommonAncestor {
        /// The sender's versions, sorted.
        sender_versions: Vec<FilesystemVersion>,
        /// The receiver's versions, sorted.
        receiver_versions: Vec<FilesystemVersion>,
    },
    /// The lists share a GUID, but the receiver holds versions after it that
    /// the sender does not have: the receiver has diverged.
    DivergedAfter {
        /// The last version both sides agree on.
        common_ancestor: FilesystemVersion,
        /// The sender's most recent version.
        sender_tip: FilesystemVersion,
        /// The receiver's most recent version.
        receiver_tip: FilesystemVersion,
    },
    /// The sender's tip GUID is already present on the receiver; no-op.
    MostRecentAlreadyPresent,
    /// The sender reports no versions at all for this filesystem; fatal.
    SenderHasNoVersions,
}

impl fmt::Display for ConflictClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCommonAncestor {
                sender_versions,
                receiver_versions,
            } => write!(
                f,
                "no common ancestor ({} sender version(s), {} receiver version(s))",
                sender_versions.len(),
                receiver_versions.len()
            ),
            Self::DivergedAfter {
                common_ancestor,
                sender_tip,
                receiver_tip,
            } => write!(
                f,
                "receiver diverged after {} (sender tip {}, receiver tip {})",
                common_ancestor.name(),
                sender_tip.name(),
                receiver_tip.name()
            ),
            Self::MostRecentAlreadyPresent => write!(f, "sender's most recent version is already present on the receiver"),
            Self::SenderHasNoVersions => write!(f, "sender reports no versions for this filesystem"),
        }
    }
}

/// Result of diffing a sender's and a receiver's sorted version lists.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum VersionDiff {
    /// A clean incremental path with no conflict to resolve. Never empty.
    Clean(Vec<PathEdge>),
    /// A conflict (or no-op) classification requiring the auto-resolver, or
    /// that must be surfaced verbatim.
    Classification(ConflictClassification),
}

/// Diffs a sender's and a receiver's sorted version lists for one filesystem.
///
/// Both lists must already be sorted by [`sort_versions`].
///
/// # Panics
///
/// Panics if the computed clean path would be of length exactly one (a
/// common ancestor that is also the sender's tip): the
/// [`ConflictClassification::MostRecentAlreadyPresent`] check above must
/// have already caught that case, so reaching this point with zero edges
/// is a logic bug in this function, not a representable condition.
#[must_use]
pub fn diff(sorted_receiver: &[FilesystemVersion], sorted_sender: &[FilesystemVersion]) -> VersionDiff {
    let Some(tip) = sorted_sender.last() else {
        return VersionDiff::Classification(ConflictClassification::SenderHasNoVersions);
    };

    let receiver_guids: FxHashSet<Guid> = sorted_receiver.iter().map(FilesystemVersion::guid).collect();
    if receiver_guids.contains(&tip.guid()) {
        return VersionDiff::Classification(ConflictClassification::MostRecentAlreadyPresent);
    }

    let Some(base_index) = sorted_sender.iter().position(|v| receiver_guids.contains(&v.guid())) else {
        return VersionDiff::Classification(ConflictClassification::NoCommonAncestor {
            sender_versions: sorted_sender.to_vec(),
            receiver_versions: sorted_receiver.to_vec(),
        });
    };

    let common_guid = sorted_sender[base_index].guid();
    let receiver_pos = sorted_receiver
        .iter()
        .position(|v| v.guid() == common_guid)
        .expect("guid found in receiver_guids set must occur in sorted_receiver");

    let sender_guids: FxHashSet<Guid> = sorted_sender.iter().map(FilesystemVersion::guid).collect();
    let diverged = sorted_receiver[receiver_pos + 1..]
        .iter()
        .any(|v| !sender_guids.contains(&v.guid()));
    if diverged {
        return VersionDiff::Classification(ConflictClassification::DivergedAfter {
            common_ancestor: sorted_receiver[receiver_pos].clone(),
            sender_tip: tip.clone(),
            receiver_tip: sorted_receiver
                .last()
                .expect("receiver_pos < len implies non-empty")
                .clone(),
        });
    }

    let mut edges = Vec::with_capacity(sorted_sender.len() - base_index - 1);
    let mut prev = sorted_sender[base_index].clone();
    for version in &sorted_sender[base_index + 1..] {
        edges.push(PathEdge::new(Some(prev), version.clone()));
        prev = version.clone();
    }
    assert!(
        !edges.is_empty(),
        "internal path of length exactly one for filesystem tip {}: common ancestor cannot equal the sender's tip here",
        tip.name()
    );
    VersionDiff::Clean(edges)
}

#[cfg(test)]
mod tests {
    use replication_endpoint::Txg;

    use super::*;

    fn version(name: &str, kind: VersionKind, guid: u64, txg: u64) -> FilesystemVersion {
        FilesystemVersion::new("tank/data", name, kind, Guid::new(guid), Txg::new(txg), 0)
    }

    fn snap(name: &str, guid: u64, txg: u64) -> FilesystemVersion {
        version(name, VersionKind::Snapshot, guid, txg)
    }

    fn bookmark(name: &str, guid: u64, txg: u64) -> FilesystemVersion {
        version(name, VersionKind::Bookmark, guid, txg)
    }

    #[test]
    fn sort_orders_by_txg_then_bookmark_before_snapshot() {
        let mut versions = vec![snap("c", 3, 3), bookmark("b#", 2, 2), snap("a", 1, 1), snap("b", 2, 2)];
        sort_versions(&mut versions);
        let names: Vec<_> = versions.iter().map(FilesystemVersion::name).collect();
        assert_eq!(names, ["a", "b#", "b", "c"]);
    }

    #[test]
    fn clean_incremental_path_excludes_receiver_only_prefix() {
        let sender = vec![snap("a", 1, 1), snap("b", 2, 2), snap("c", 3, 3)];
        let receiver = vec![snap("a", 1, 1)];
        match diff(&receiver, &sender) {
            VersionDiff::Clean(edges) => {
                assert_eq!(edges.len(), 2);
                assert_eq!(edges[0].from().unwrap().guid(), Guid::new(1));
                assert_eq!(edges[0].to().guid(), Guid::new(2));
                assert_eq!(edges[1].from().unwrap().guid(), Guid::new(2));
                assert_eq!(edges[1].to().guid(), Guid::new(3));
            }
            other => panic!("expected a clean path, got {other:?}"),
        }
    }

    #[test]
    fn most_recent_already_present_is_a_no_op() {
        let sender = vec![snap("a", 1, 1), snap("b", 2, 2)];
        let receiver = vec![snap("a", 1, 1), snap("b", 2, 2)];
        assert_eq!(
            diff(&receiver, &sender),
            VersionDiff::Classification(ConflictClassification::MostRecentAlreadyPresent)
        );
    }

    #[test]
    fn no_common_ancestor_when_guids_disjoint() {
        let sender = vec![snap("a", 1, 1)];
        let receiver = vec![snap("x", 99, 1)];
        assert!(matches!(
            diff(&receiver, &sender),
            VersionDiff::Classification(ConflictClassification::NoCommonAncestor { .. })
        ));
    }

    #[test]
    fn diverged_after_when_receiver_has_extra_history() {
        let sender = vec![snap("a", 1, 1), snap("b", 2, 2)];
        let receiver = vec![snap("a", 1, 1), snap("r", 99, 2)];
        match diff(&receiver, &sender) {
            VersionDiff::Classification(ConflictClassification::DivergedAfter {
                common_ancestor,
                sender_tip,
                receiver_tip,
            }) => {
                assert_eq!(common_ancestor.guid(), Guid::new(1));
                assert_eq!(sender_tip.guid(), Guid::new(2));
                assert_eq!(receiver_tip.guid(), Guid::new(99));
            }
            other => panic!("expected DivergedAfter, got {other:?}"),
        }
    }

    #[test]
    fn sender_with_no_versions_is_fatal() {
        let receiver = vec![snap("a", 1, 1)];
        assert_eq!(
            diff(&receiver, &[]),
            VersionDiff::Classification(ConflictClassification::SenderHasNoVersions)
        );
    }
}
