//! Auto-resolution of conflicts detected during initial replication.

use replication_endpoint::FilesystemVersion;

use crate::error::ReplicationError;
use crate::version_algebra::{ConflictClassification, PathEdge};

/// Policy consulted when initial replication (an empty receiver with no
/// common ancestor) hits a conflict.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum InitialReplicationPolicy {
    /// Replicate only the sender's most recent snapshot as a single full
    /// send. Bookmarks are skipped when selecting it.
    #[default]
    MostRecent,
    /// Replicate every sender snapshot in TXG order, bookmarks dropped.
    All,
    /// Propagate the conflict verbatim; never auto-resolve.
    Fail,
}

/// Attempts to auto-resolve a classified conflict for one filesystem.
///
/// Only [`ConflictClassification::NoCommonAncestor`] with an empty receiver
/// is ever auto-resolved, and only according to `policy`.
/// [`ConflictClassification::DivergedAfter`] and a non-empty-receiver
/// [`ConflictClassification::NoCommonAncestor`] always surface to the
/// caller. [`ConflictClassification::SenderHasNoVersions`] always fails,
/// regardless of policy.
pub fn resolve(
    path: &str,
    classification: ConflictClassification,
    receiver_is_empty: bool,
    policy: InitialReplicationPolicy,
) -> Result<Vec<PathEdge>, ReplicationError> {
    let ConflictClassification::NoCommonAncestor { ref sender_versions, .. } = classification else {
        return Err(ReplicationError::Conflict {
            path: path.to_string(),
            classification,
        });
    };
    if !receiver_is_empty {
        return Err(ReplicationError::Conflict {
            path: path.to_string(),
            classification,
        });
    }

    let snapshots: Vec<FilesystemVersion> = sender_versions.iter().filter(|v| v.is_snapshot()).cloned().collect();

    match policy {
        InitialReplicationPolicy::Fail => Err(ReplicationError::Conflict {
            path: path.to_string(),
            classification,
        }),
        InitialReplicationPolicy::MostRecent => {
            let Some(target) = snapshots.last() else {
                return Err(ReplicationError::Conflict {
                    path: path.to_string(),
                    classification,
                });
            };
            Ok(vec![PathEdge::new(None, target.clone())])
        }
        InitialReplicationPolicy::All => {
            if snapshots.is_empty() {
                return Err(ReplicationError::Conflict {
                    path: path.to_string(),
                    classification,
                });
            }
            let mut edges = Vec::with_capacity(snapshots.len());
            let mut prev: Option<FilesystemVersion> = None;
            for snapshot in snapshots {
                edges.push(PathEdge::new(prev.clone(), snapshot.clone()));
                prev = Some(snapshot);
            }
            Ok(edges)
        }
    }
}

#[cfg(test)]
mod tests {
    use replication_endpoint::{Guid, Txg, VersionKind};

    use super::*;

    fn snap(name: &str, guid: u64, txg: u64) -> FilesystemVersion {
        FilesystemVersion::new("tank/data", name, VersionKind::Snapshot, Guid::new(guid), Txg::new(txg), 0)
    }

    fn bookmark(name: &str, guid: u64, txg: u64) -> FilesystemVersion {
        FilesystemVersion::new("tank/data", name, VersionKind::Bookmark, Guid::new(guid), Txg::new(txg), 0)
    }

    fn no_common_ancestor(sender_versions: Vec<FilesystemVersion>) -> ConflictClassification {
        ConflictClassification::NoCommonAncestor {
            sender_versions,
            receiver_versions: Vec::new(),
        }
    }

    #[test]
    fn most_recent_skips_bookmarks() {
        let classification = no_common_ancestor(vec![snap("a", 1, 1), bookmark("b#", 2, 2), snap("c", 3, 3)]);
        let edges = resolve("tank/data", classification, true, InitialReplicationPolicy::MostRecent).unwrap();
        assert_eq!(edges.len(), 1);
        assert!(edges[0].from().is_none());
        assert_eq!(edges[0].to().guid(), Guid::new(3));
    }

    #[test]
    fn all_chains_every_snapshot_and_drops_bookmarks() {
        let classification = no_common_ancestor(vec![snap("a", 1, 1), bookmark("b#", 2, 2), snap("b", 4, 2), snap("c", 3, 3)]);
        let edges = resolve("tank/data", classification, true, InitialReplicationPolicy::All).unwrap();
        assert_eq!(edges.len(), 3);
        assert!(edges[0].from().is_none());
        assert_eq!(edges[0].to().guid(), Guid::new(1));
        assert_eq!(edges[1].from().unwrap().guid(), Guid::new(1));
        assert_eq!(edges[1].to().guid(), Guid::new(4));
        assert_eq!(edges[2].from().unwrap().guid(), Guid::new(4));
        assert_eq!(edges[2].to().guid(), Guid::new(3));
    }

    #[test]
    fn fail_propagates_conflict_verbatim() {
        let classification = no_common_ancestor(vec![snap("a", 1, 1)]);
        let err = resolve("tank/data", classification, true, InitialReplicationPolicy::Fail).unwrap_err();
        assert!(matches!(err, ReplicationError::Conflict { .. }));
    }

    #[test]
    fn non_empty_receiver_is_never_auto_resolved() {
        let classification = no_common_ancestor(vec![snap("a", 1, 1)]);
        let err = resolve("tank/data", classification, false, InitialReplicationPolicy::MostRecent).unwrap_err();
        assert!(matches!(err, ReplicationError::Conflict { .. }));
    }

    #[test]
    fn diverged_after_is_never_auto_resolved() {
        let classification = ConflictClassification::DivergedAfter {
            common_ancestor: snap("a", 1, 1),
            sender_tip: snap("b", 2, 2),
            receiver_tip: snap("r", 99, 2),
        };
        let err = resolve("tank/data", classification, true, InitialReplicationPolicy::All).unwrap_err();
        assert!(matches!(err, ReplicationError::Conflict { .. }));
    }
}
