//! Request and response value types exchanged with endpoints.

use std::pin::Pin;

use tokio::io::AsyncRead;

use crate::types::{FilesystemVersion, Guid, ReplicationOptions};

/// Boxed, owned byte stream produced by a sender's [`Sender::send`](crate::traits::Sender::send)
/// and consumed by a receiver's [`Receiver::receive`](crate::traits::Receiver::receive).
pub type StreamBytes = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Request to list the filesystems known to one endpoint.
///
/// The request carries no parameters today; it exists as a named type so the
/// [`Endpoint`](crate::traits::Endpoint) trait can grow parameters (e.g. a
/// path filter) without changing its method signature.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct ListFilesystemsRequest;

/// Request to list the snapshot/bookmark versions of one filesystem.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ListVersionsRequest {
    path: String,
}

impl ListVersionsRequest {
    /// Builds a request for the given filesystem path.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the filesystem path being queried.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Request to send an incremental or full stream for one step.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SendRequest {
    filesystem: String,
    from: Option<Guid>,
    to: Guid,
    to_name: String,
    resume_token: Option<String>,
    options: ReplicationOptions,
    dry_run: bool,
}

impl SendRequest {
    /// Builds a send request for one step.
    #[must_use]
    pub fn new(
        filesystem: impl Into<String>,
        from: Option<Guid>,
        to: Guid,
        to_name: impl Into<String>,
        resume_token: Option<String>,
        options: ReplicationOptions,
    ) -> Self {
        Self {
            filesystem: filesystem.into(),
            from,
            to,
            to_name: to_name.into(),
            resume_token,
            options,
            dry_run: false,
        }
    }

    /// Marks this request as a dry-run size estimate (no stream is produced).
    #[must_use]
    pub fn into_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Returns the filesystem path.
    #[must_use]
    pub fn filesystem(&self) -> &str {
        &self.filesystem
    }

    /// Returns the base version's GUID, absent for a full (initial) send.
    #[must_use]
    pub const fn from(&self) -> Option<Guid> {
        self.from
    }

    /// Returns the target version's GUID.
    #[must_use]
    pub const fn to(&self) -> Guid {
        self.to
    }

    /// Returns the target version's short name, for diagnostics.
    #[must_use]
    pub fn to_name(&self) -> &str {
        &self.to_name
    }

    /// Returns the raw resume token string, when resuming a partial receive.
    #[must_use]
    pub fn resume_token(&self) -> Option<&str> {
        self.resume_token.as_deref()
    }

    /// Returns the opaque replication options forwarded to the endpoint.
    #[must_use]
    pub const fn options(&self) -> &ReplicationOptions {
        &self.options
    }

    /// Reports whether this request is a dry-run size estimate.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

/// Metadata returned alongside the byte stream from [`Sender::send`](crate::traits::Sender::send).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SendResult {
    used_resume_token: bool,
}

impl SendResult {
    /// Constructs a send result.
    #[must_use]
    pub const fn new(used_resume_token: bool) -> Self {
        Self { used_resume_token }
    }

    /// Reports whether the sender consumed the request's resume token.
    #[must_use]
    pub const fn used_resume_token(&self) -> bool {
        self.used_resume_token
    }
}

/// Request to size-estimate a batch of steps without producing a stream.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SendDryRequest {
    items: Vec<SendRequest>,
    concurrency: usize,
}

impl SendDryRequest {
    /// Builds a batched dry-run request.
    #[must_use]
    pub fn new(items: Vec<SendRequest>, concurrency: usize) -> Self {
        Self { items, concurrency }
    }

    /// Returns the batched step requests.
    #[must_use]
    pub fn items(&self) -> &[SendRequest] {
        &self.items
    }

    /// Returns the requested internal fan-out, as a hint only.
    #[must_use]
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }
}

/// One item of a [`SendDryResponse`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct DryRunItem {
    expected_size: u64,
}

impl DryRunItem {
    /// Constructs a dry-run size estimate for one step.
    #[must_use]
    pub const fn new(expected_size: u64) -> Self {
        Self { expected_size }
    }

    /// Returns the expected size in bytes.
    #[must_use]
    pub const fn expected_size(&self) -> u64 {
        self.expected_size
    }
}

/// Response to a [`SendDryRequest`], one item per requested step, in order.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SendDryResponse {
    items: Vec<DryRunItem>,
}

impl SendDryResponse {
    /// Builds a dry-run response from per-step size estimates.
    #[must_use]
    pub fn new(items: Vec<DryRunItem>) -> Self {
        Self { items }
    }

    /// Returns the per-step size estimates, in request order.
    #[must_use]
    pub fn items(&self) -> &[DryRunItem] {
        &self.items
    }
}

/// Request to apply a stream on the receiver.
#[derive(Debug)]
pub struct ReceiveRequest {
    filesystem: String,
    to: Guid,
    to_name: String,
    clear_resume_token: bool,
    options: ReplicationOptions,
}

impl ReceiveRequest {
    /// Builds a receive request.
    #[must_use]
    pub fn new(
        filesystem: impl Into<String>,
        to: Guid,
        to_name: impl Into<String>,
        clear_resume_token: bool,
        options: ReplicationOptions,
    ) -> Self {
        Self {
            filesystem: filesystem.into(),
            to,
            to_name: to_name.into(),
            clear_resume_token,
            options,
        }
    }

    /// Returns the filesystem path.
    #[must_use]
    pub fn filesystem(&self) -> &str {
        &self.filesystem
    }

    /// Returns the target version's GUID.
    #[must_use]
    pub const fn to(&self) -> Guid {
        self.to
    }

    /// Returns the target version's short name.
    #[must_use]
    pub fn to_name(&self) -> &str {
        &self.to_name
    }

    /// Reports whether the receiver should discard any existing resume token
    /// before applying the stream.
    #[must_use]
    pub const fn clear_resume_token(&self) -> bool {
        self.clear_resume_token
    }

    /// Returns the opaque replication options forwarded to the endpoint.
    #[must_use]
    pub const fn options(&self) -> &ReplicationOptions {
        &self.options
    }
}

/// Request passed to [`Sender::send_completed`](crate::traits::Sender::send_completed);
/// carries the original [`SendRequest`] so the sender can release holds or
/// advance its replication cursor.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SendCompletedRequest {
    original: SendRequest,
}

impl SendCompletedRequest {
    /// Wraps the original send request that just completed successfully.
    #[must_use]
    pub const fn new(original: SendRequest) -> Self {
        Self { original }
    }

    /// Returns the original send request.
    #[must_use]
    pub const fn original(&self) -> &SendRequest {
        &self.original
    }
}

/// Request to destroy a batch of snapshots, used by pruning and by a
/// sender's internal replication-cursor bookkeeping. The core planner never
/// constructs this request itself.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DestroySnapshotsRequest {
    filesystem: String,
    names: Vec<String>,
}

impl DestroySnapshotsRequest {
    /// Builds a request to destroy the named snapshots of one filesystem.
    ///
    /// # Panics
    ///
    /// Panics if `names` is empty: an empty batch is a contract violation in
    /// the caller, not a representable request.
    #[must_use]
    pub fn new(filesystem: impl Into<String>, names: Vec<String>) -> Self {
        assert!(
            !names.is_empty(),
            "DestroySnapshotsRequest requires at least one snapshot name"
        );
        Self {
            filesystem: filesystem.into(),
            names,
        }
    }

    /// Returns the filesystem path.
    #[must_use]
    pub fn filesystem(&self) -> &str {
        &self.filesystem
    }

    /// Returns the snapshot short names to destroy.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Response to a [`DestroySnapshotsRequest`].
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct DestroySnapshotsResponse {
    destroyed: Vec<String>,
}

impl DestroySnapshotsResponse {
    /// Builds a response naming the snapshots actually destroyed.
    #[must_use]
    pub fn new(destroyed: Vec<String>) -> Self {
        Self { destroyed }
    }

    /// Returns the snapshot short names that were destroyed.
    #[must_use]
    pub fn destroyed(&self) -> &[String] {
        &self.destroyed
    }
}

/// Response to [`Endpoint::list_filesystems`](crate::traits::Endpoint::list_filesystems).
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct ListFilesystemsResponse {
    filesystems: Vec<crate::types::EndpointFilesystem>,
}

impl ListFilesystemsResponse {
    /// Builds a response from the listed filesystem descriptors.
    #[must_use]
    pub fn new(filesystems: Vec<crate::types::EndpointFilesystem>) -> Self {
        Self { filesystems }
    }

    /// Returns the listed filesystem descriptors.
    #[must_use]
    pub fn filesystems(&self) -> &[crate::types::EndpointFilesystem] {
        &self.filesystems
    }

    /// Consumes the response, returning the owned filesystem descriptors.
    #[must_use]
    pub fn into_filesystems(self) -> Vec<crate::types::EndpointFilesystem> {
        self.filesystems
    }
}

/// Response to [`Endpoint::list_versions`](crate::traits::Endpoint::list_versions).
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct ListVersionsResponse {
    versions: Vec<FilesystemVersion>,
}

impl ListVersionsResponse {
    /// Builds a response from the listed versions.
    #[must_use]
    pub fn new(versions: Vec<FilesystemVersion>) -> Self {
        Self { versions }
    }

    /// Returns the listed versions.
    #[must_use]
    pub fn versions(&self) -> &[FilesystemVersion] {
        &self.versions
    }

    /// Consumes the response, returning the owned versions.
    #[must_use]
    pub fn into_versions(self) -> Vec<FilesystemVersion> {
        self.versions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_request_dry_run_flag_is_independent_of_guids() {
        let request = SendRequest::new(
            "tank/data",
            Some(Guid::new(1)),
            Guid::new(2),
            "b",
            None,
            ReplicationOptions::new(),
        );
        assert!(!request.is_dry_run());
        let dry = request.clone().into_dry_run();
        assert!(dry.is_dry_run());
        assert_eq!(dry.from(), Some(Guid::new(1)));
        assert_eq!(dry.to(), Guid::new(2));
    }

    #[test]
    #[should_panic(expected = "at least one snapshot name")]
    fn destroy_snapshots_request_rejects_empty_batch() {
        let _ = DestroySnapshotsRequest::new("tank/data", Vec::new());
    }

    #[test]
    fn send_completed_request_wraps_original() {
        let original = SendRequest::new(
            "tank/data",
            None,
            Guid::new(1),
            "a",
            None,
            ReplicationOptions::new(),
        );
        let completed = SendCompletedRequest::new(original.clone());
        assert_eq!(completed.original(), &original);
    }
}
