//! Value types shared by the sender and receiver sides of a replication.

use std::fmt;

/// Storage-assigned identifier that uniquely identifies a point in time
/// within a filesystem, stable across renames and across the sender/receiver
/// boundary.
///
/// # Examples
///
/// ```
/// use replication_endpoint::Guid;
///
/// let guid = Guid::new(42);
/// assert_eq!(guid.get(), 42);
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Guid(u64);

impl Guid {
    /// Wraps a raw 64-bit storage-assigned identifier.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Transaction-group ordinal: monotonically increasing per storage pool,
/// giving a total order on a pool's history.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct Txg(u64);

impl Txg {
    /// Wraps a raw transaction-group ordinal.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw ordinal.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Txg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Distinguishes a snapshot (retains data) from a bookmark (metadata only).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum VersionKind {
    /// A named, data-retaining point in time.
    Snapshot,
    /// A named, metadata-only reference to a point in time.
    Bookmark,
}

impl VersionKind {
    /// Reports whether this is a snapshot.
    #[must_use]
    pub const fn is_snapshot(self) -> bool {
        matches!(self, Self::Snapshot)
    }

    /// Reports whether this is a bookmark.
    #[must_use]
    pub const fn is_bookmark(self) -> bool {
        matches!(self, Self::Bookmark)
    }
}

/// A snapshot or bookmark reported by an endpoint for one filesystem.
///
/// # Invariants
///
/// - [`Self::guid`] is stable across renames and across the sender/receiver
///   boundary: the receiver inherits the sender's GUID on successful
///   receive.
/// - Within one filesystem, two entries may share a GUID only if one is a
///   snapshot and the other a bookmark derived from it.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct FilesystemVersion {
    filesystem: String,
    name: String,
    kind: VersionKind,
    guid: Guid,
    createtxg: Txg,
    creation_time_secs: u64,
}

impl FilesystemVersion {
    /// Constructs a filesystem version from its essential attributes.
    #[must_use]
    pub fn new(
        filesystem: impl Into<String>,
        name: impl Into<String>,
        kind: VersionKind,
        guid: Guid,
        createtxg: Txg,
        creation_time_secs: u64,
    ) -> Self {
        Self {
            filesystem: filesystem.into(),
            name: name.into(),
            kind,
            guid,
            createtxg,
            creation_time_secs,
        }
    }

    /// Returns the owning filesystem path.
    #[must_use]
    pub fn filesystem(&self) -> &str {
        &self.filesystem
    }

    /// Returns the short name (e.g. the text after `@` or `#`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether this entry is a snapshot or a bookmark.
    #[must_use]
    pub const fn kind(&self) -> VersionKind {
        self.kind
    }

    /// Returns whether this entry is a snapshot.
    #[must_use]
    pub const fn is_snapshot(&self) -> bool {
        self.kind.is_snapshot()
    }

    /// Returns whether this entry is a bookmark.
    #[must_use]
    pub const fn is_bookmark(&self) -> bool {
        self.kind.is_bookmark()
    }

    /// Returns the storage-assigned GUID.
    #[must_use]
    pub const fn guid(&self) -> Guid {
        self.guid
    }

    /// Returns the creation transaction-group ordinal.
    #[must_use]
    pub const fn createtxg(&self) -> Txg {
        self.createtxg
    }

    /// Returns the advisory wall-clock creation time, in seconds since the
    /// Unix epoch.
    #[must_use]
    pub const fn creation_time_secs(&self) -> u64 {
        self.creation_time_secs
    }
}

/// Full path and per-endpoint state of one filesystem, as reported by
/// [`Endpoint::list_filesystems`](crate::traits::Endpoint::list_filesystems).
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct EndpointFilesystem {
    path: String,
    is_placeholder: bool,
    resume_token: Option<String>,
}

impl EndpointFilesystem {
    /// Constructs a descriptor for a filesystem reported by an endpoint.
    #[must_use]
    pub fn new(path: impl Into<String>, is_placeholder: bool, resume_token: Option<String>) -> Self {
        Self {
            path: path.into(),
            is_placeholder,
            resume_token,
        }
    }

    /// Returns the filesystem path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Reports whether this is a receiver-created empty stand-in for an
    /// intermediate path.
    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        self.is_placeholder
    }

    /// Returns the opaque resume token reported by the storage layer, if a
    /// previous receive on this filesystem was interrupted.
    #[must_use]
    pub fn resume_token(&self) -> Option<&str> {
        self.resume_token.as_deref()
    }
}

/// Opaque replication options forwarded to both sender and receiver inside
/// every request.
///
/// The planner and step engine never inspect these flags; they only
/// transport them. Real deployments carry protection/encryption/compression
/// flags here.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct ReplicationOptions {
    fields: Vec<(String, String)>,
}

impl ReplicationOptions {
    /// Constructs an empty set of replication options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an opaque key/value field, returning the updated options.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Returns the opaque fields in insertion order.
    #[must_use]
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guid_round_trips_through_display() {
        let guid = Guid::new(0xdead_beef);
        assert_eq!(guid.to_string(), "0x00000000deadbeef");
    }

    #[test]
    fn txg_orders_by_raw_value() {
        assert!(Txg::new(1) < Txg::new(2));
        assert_eq!(Txg::new(5), Txg::new(5));
    }

    #[test]
    fn version_kind_predicates_are_mutually_exclusive() {
        assert!(VersionKind::Snapshot.is_snapshot());
        assert!(!VersionKind::Snapshot.is_bookmark());
        assert!(VersionKind::Bookmark.is_bookmark());
        assert!(!VersionKind::Bookmark.is_snapshot());
    }

    #[test]
    fn filesystem_version_exposes_constructor_fields() {
        let version = FilesystemVersion::new(
            "tank/data",
            "a",
            VersionKind::Snapshot,
            Guid::new(1),
            Txg::new(1),
            1_700_000_000,
        );
        assert_eq!(version.filesystem(), "tank/data");
        assert_eq!(version.name(), "a");
        assert!(version.is_snapshot());
        assert_eq!(version.guid(), Guid::new(1));
        assert_eq!(version.createtxg(), Txg::new(1));
    }

    #[test]
    fn endpoint_filesystem_reports_placeholder_and_token() {
        let fs = EndpointFilesystem::new("tank/data", true, Some("token".to_string()));
        assert!(fs.is_placeholder());
        assert_eq!(fs.resume_token(), Some("token"));
    }

    #[test]
    fn replication_options_preserve_field_order() {
        let options = ReplicationOptions::new()
            .with_field("compress", "on")
            .with_field("encrypt", "off");
        assert_eq!(
            options.fields(),
            &[
                ("compress".to_string(), "on".to_string()),
                ("encrypt".to_string(), "off".to_string()),
            ]
        );
    }
}
