//! `Sender`/`Receiver` capability traits.
//!
//! # Design
//!
//! The planner and step engine never know whether an endpoint is local, a
//! remote RPC stub, or a test fake: they hold `Arc<dyn Sender>` and
//! `Arc<dyn Receiver>` trait objects. Both traits extend [`Endpoint`], the
//! handful of operations available on either side, rather than duplicating
//! `list_filesystems`/`list_versions`/`wait_for_connectivity` on each.
//!
//! Methods are `async fn` via [`async_trait`] so the traits remain object
//! safe while still reading like ordinary async code at call sites.

use async_trait::async_trait;

use crate::error::EndpointError;
use crate::requests::{
    DestroySnapshotsRequest, DestroySnapshotsResponse, ListFilesystemsResponse, ListVersionsResponse,
    ReceiveRequest, SendCompletedRequest, SendDryRequest, SendDryResponse, SendRequest, SendResult,
    StreamBytes,
};

/// Operations available on both the sender and the receiver side of a
/// replication.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Lists the filesystems this endpoint knows about.
    ///
    /// The planner handles placeholder filesystems itself; an
    /// implementation is not required to filter them out.
    async fn list_filesystems(&self) -> Result<ListFilesystemsResponse, EndpointError>;

    /// Lists the snapshot/bookmark versions of one filesystem.
    async fn list_versions(&self, path: &str) -> Result<ListVersionsResponse, EndpointError>;

    /// Destroys a batch of snapshots. Used by pruning and by
    /// [`Sender::send_completed`]'s internal replication-cursor bookkeeping;
    /// the planner never calls this directly.
    async fn destroy_snapshots(
        &self,
        request: DestroySnapshotsRequest,
    ) -> Result<DestroySnapshotsResponse, EndpointError>;

    /// Probes whether this endpoint is reachable.
    async fn wait_for_connectivity(&self) -> Result<(), EndpointError>;
}

/// Operations available only on the sender side.
#[async_trait]
pub trait Sender: Endpoint {
    /// Opens a send stream for one step.
    ///
    /// Returns `(result, None)` only when `request.is_dry_run()` is set;
    /// any other `nil` stream is a protocol violation the caller should
    /// reject.
    async fn send(
        &self,
        request: SendRequest,
    ) -> Result<(SendResult, Option<StreamBytes>), EndpointError>;

    /// Estimates the expected size of a batch of steps without producing a
    /// stream.
    async fn send_dry(&self, request: SendDryRequest) -> Result<SendDryResponse, EndpointError>;

    /// Notifies the sender that a step completed successfully, so it can
    /// release holds or advance its replication cursor. Idempotent,
    /// best-effort: called after every successful receive.
    async fn send_completed(&self, request: SendCompletedRequest) -> Result<(), EndpointError>;
}

/// Operations available only on the receiver side.
#[async_trait]
pub trait Receiver: Endpoint {
    /// Applies a stream produced by [`Sender::send`] to this endpoint,
    /// driving it to EOF or until an error occurs.
    async fn receive(&self, request: ReceiveRequest, stream: StreamBytes) -> Result<(), EndpointError>;
}
