#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! In-memory `Sender`/`Receiver` fakes and fixture builders used by
//! `replication-core`'s unit and integration test suites. Nothing here
//! touches a real filesystem or RPC transport: a [`FakePool`] is a
//! `Mutex`-guarded in-memory model of a sender's and a receiver's
//! version histories for a set of filesystems, and [`FakePool::sender`] /
//! [`FakePool::receiver`] hand out `Arc<dyn Sender>` / `Arc<dyn Receiver>`
//! views over the same shared state.
//!
//! # Design
//!
//! - [`FakePoolBuilder`] assembles the starting state: which filesystems
//!   exist, their placeholder flags, each side's version list, an optional
//!   resume token, and per-step size estimates.
//! - [`FakePool`] is the shared state plus accessors a test uses after
//!   running a [`replication_core::Planner`](../replication_core/struct.Planner.html)
//!   to assert what was actually replicated: the receiver's resulting
//!   version list, and how many times `SendCompleted` was observed per
//!   filesystem.
//! - [`snapshot`] and [`bookmark`] build [`FilesystemVersion`] fixtures
//!   tersely, since every scenario test constructs several of these.
//!
//! # Errors
//!
//! A builder method panics if asked to register the same filesystem twice;
//! everything else mirrors the narrow [`EndpointError`] taxonomy the real
//! traits return.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use replication_endpoint::{
    DestroySnapshotsRequest, DestroySnapshotsResponse, EndpointError, EndpointFilesystem, EndpointRole,
    FilesystemVersion, Guid, ListFilesystemsResponse, ListVersionsResponse, ReceiveRequest, Receiver, Sender,
    SendCompletedRequest, SendDryRequest, SendDryResponse, SendRequest, SendResult, StreamBytes, Txg, VersionKind,
};
use rustc_hash::FxHashMap;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

/// Builds a snapshot fixture for the given filesystem, short name, GUID, and
/// creation TXG. Creation time is fixed at zero; no scenario in this
/// workspace depends on the advisory wall-clock value.
#[must_use]
pub fn snapshot(filesystem: &str, name: &str, guid: u64, txg: u64) -> FilesystemVersion {
    FilesystemVersion::new(filesystem, name, VersionKind::Snapshot, Guid::new(guid), Txg::new(txg), 0)
}

/// Builds a bookmark fixture for the given filesystem, short name, GUID, and
/// creation TXG.
#[must_use]
pub fn bookmark(filesystem: &str, name: &str, guid: u64, txg: u64) -> FilesystemVersion {
    FilesystemVersion::new(filesystem, name, VersionKind::Bookmark, Guid::new(guid), Txg::new(txg), 0)
}

#[derive(Default)]
struct FilesystemState {
    sender_placeholder: bool,
    receiver_placeholder: bool,
    sender_versions: Vec<FilesystemVersion>,
    receiver_versions: Vec<FilesystemVersion>,
    resume_token: Option<String>,
    send_completed_count: usize,
    fail_list_versions: bool,
    fail_receive: bool,
    expected_size: u64,
}

struct PoolState {
    order: Vec<String>,
    filesystems: FxHashMap<String, FilesystemState>,
    sender_unreachable: bool,
    receiver_unreachable: bool,
}

/// Assembles the starting state of a [`FakePool`].
#[derive(Default)]
pub struct FakePoolBuilder {
    order: Vec<String>,
    filesystems: FxHashMap<String, FilesystemState>,
    sender_unreachable: bool,
    receiver_unreachable: bool,
}

impl FakePoolBuilder {
    /// Starts an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, path: &str) -> &mut FilesystemState {
        if !self.filesystems.contains_key(path) {
            self.order.push(path.to_string());
            self.filesystems.insert(path.to_string(), FilesystemState::default());
        }
        self.filesystems.get_mut(path).expect("just inserted")
    }

    /// Registers a filesystem with the given sender-side version list. The
    /// receiver side starts absent (initial replication) unless
    /// [`Self::receiver_versions`] is also called for this path.
    #[must_use]
    pub fn sender_versions(mut self, path: &str, versions: Vec<FilesystemVersion>) -> Self {
        self.entry(path).sender_versions = versions;
        self
    }

    /// Sets the receiver-side version list for a filesystem, implying the
    /// receiver reports a (non-placeholder) descriptor for it.
    #[must_use]
    pub fn receiver_versions(mut self, path: &str, versions: Vec<FilesystemVersion>) -> Self {
        self.entry(path).receiver_versions = versions;
        self
    }

    /// Marks the sender side of a filesystem as a placeholder.
    #[must_use]
    pub fn sender_placeholder(mut self, path: &str) -> Self {
        self.entry(path).sender_placeholder = true;
        self
    }

    /// Marks the receiver side of a filesystem as a placeholder.
    #[must_use]
    pub fn receiver_placeholder(mut self, path: &str) -> Self {
        self.entry(path).receiver_placeholder = true;
        self
    }

    /// Sets the resume token the receiver reports for a filesystem.
    #[must_use]
    pub fn resume_token(mut self, path: &str, token: impl Into<String>) -> Self {
        self.entry(path).resume_token = Some(token.into());
        self
    }

    /// Sets the per-step expected size `send_dry` reports for every step of
    /// this filesystem. Zero (the default) is indistinguishable from a
    /// failed size estimate, which most scenario tests do not care about.
    #[must_use]
    pub fn expected_size(mut self, path: &str, bytes: u64) -> Self {
        self.entry(path).expected_size = bytes;
        self
    }

    /// Makes `list_versions` fail for this filesystem on either side.
    #[must_use]
    pub fn fail_list_versions(mut self, path: &str) -> Self {
        self.entry(path).fail_list_versions = true;
        self
    }

    /// Makes `receive` fail for this filesystem without applying any
    /// version, simulating an interrupted receive that leaves no new
    /// resume token (the existing one, if any, is left untouched).
    #[must_use]
    pub fn fail_receive(mut self, path: &str) -> Self {
        self.entry(path).fail_receive = true;
        self
    }

    /// Makes `wait_for_connectivity` fail on the sender side.
    #[must_use]
    pub const fn sender_unreachable(mut self) -> Self {
        self.sender_unreachable = true;
        self
    }

    /// Makes `wait_for_connectivity` fail on the receiver side.
    #[must_use]
    pub const fn receiver_unreachable(mut self) -> Self {
        self.receiver_unreachable = true;
        self
    }

    /// Builds the fake pool.
    #[must_use]
    pub fn build(self) -> FakePool {
        FakePool {
            state: Arc::new(Mutex::new(PoolState {
                order: self.order,
                filesystems: self.filesystems,
                sender_unreachable: self.sender_unreachable,
                receiver_unreachable: self.receiver_unreachable,
            })),
        }
    }
}

/// Shared in-memory state for a sender and a receiver over the same set of
/// filesystems.
#[derive(Clone)]
pub struct FakePool {
    state: Arc<Mutex<PoolState>>,
}

impl FakePool {
    /// Returns a `Sender` view over this pool.
    #[must_use]
    pub fn sender(&self) -> Arc<dyn Sender> {
        Arc::new(FakeSender { state: Arc::clone(&self.state) })
    }

    /// Returns a `Receiver` view over this pool.
    #[must_use]
    pub fn receiver(&self) -> Arc<dyn Receiver> {
        Arc::new(FakeReceiver { state: Arc::clone(&self.state) })
    }

    /// Returns the receiver's current version list for a filesystem, sorted
    /// by insertion order (not by TXG), for assertions after a replication
    /// attempt.
    #[must_use]
    pub fn receiver_versions(&self, path: &str) -> Vec<FilesystemVersion> {
        let state = self.state.lock().expect("pool mutex poisoned");
        state
            .filesystems
            .get(path)
            .map(|fs| fs.receiver_versions.clone())
            .unwrap_or_default()
    }

    /// Returns how many times `send_completed` was observed for a
    /// filesystem.
    #[must_use]
    pub fn send_completed_count(&self, path: &str) -> usize {
        let state = self.state.lock().expect("pool mutex poisoned");
        state.filesystems.get(path).map_or(0, |fs| fs.send_completed_count)
    }

    /// Returns the resume token currently held by the receiver for a
    /// filesystem, if any.
    #[must_use]
    pub fn resume_token(&self, path: &str) -> Option<String> {
        let state = self.state.lock().expect("pool mutex poisoned");
        state.filesystems.get(path).and_then(|fs| fs.resume_token.clone())
    }
}

fn list_filesystems_response(state: &PoolState, for_receiver: bool) -> ListFilesystemsResponse {
    let filesystems = state
        .order
        .iter()
        .map(|path| {
            let fs = &state.filesystems[path];
            let is_placeholder = if for_receiver { fs.receiver_placeholder } else { fs.sender_placeholder };
            let resume_token = if for_receiver { fs.resume_token.clone() } else { None };
            EndpointFilesystem::new(path.clone(), is_placeholder, resume_token)
        })
        .collect();
    ListFilesystemsResponse::new(filesystems)
}

struct FakeSender {
    state: Arc<Mutex<PoolState>>,
}

struct FakeReceiver {
    state: Arc<Mutex<PoolState>>,
}

#[async_trait]
impl replication_endpoint::Endpoint for FakeSender {
    async fn list_filesystems(&self) -> Result<ListFilesystemsResponse, EndpointError> {
        let state = self.state.lock().expect("pool mutex poisoned");
        Ok(list_filesystems_response(&state, false))
    }

    async fn list_versions(&self, path: &str) -> Result<ListVersionsResponse, EndpointError> {
        let state = self.state.lock().expect("pool mutex poisoned");
        let Some(fs) = state.filesystems.get(path) else {
            return Ok(ListVersionsResponse::new(Vec::new()));
        };
        if fs.fail_list_versions {
            return Err(EndpointError::transport(EndpointRole::Sender, format!("{path}: simulated list failure")));
        }
        Ok(ListVersionsResponse::new(fs.sender_versions.clone()))
    }

    async fn destroy_snapshots(&self, request: DestroySnapshotsRequest) -> Result<DestroySnapshotsResponse, EndpointError> {
        let mut state = self.state.lock().expect("pool mutex poisoned");
        let mut destroyed = Vec::new();
        if let Some(fs) = state.filesystems.get_mut(request.filesystem()) {
            fs.sender_versions.retain(|version| {
                if request.names().iter().any(|name| name == version.name()) {
                    destroyed.push(version.name().to_string());
                    false
                } else {
                    true
                }
            });
        }
        Ok(DestroySnapshotsResponse::new(destroyed))
    }

    async fn wait_for_connectivity(&self) -> Result<(), EndpointError> {
        let state = self.state.lock().expect("pool mutex poisoned");
        if state.sender_unreachable {
            return Err(EndpointError::transport(EndpointRole::Sender, "simulated unreachable sender"));
        }
        Ok(())
    }
}

#[async_trait]
impl Sender for FakeSender {
    async fn send(&self, request: SendRequest) -> Result<(SendResult, Option<StreamBytes>), EndpointError> {
        let state = self.state.lock().expect("pool mutex poisoned");
        let Some(fs) = state.filesystems.get(request.filesystem()) else {
            return Err(EndpointError::protocol_violation(
                EndpointRole::Sender,
                format!("{}: unknown filesystem", request.filesystem()),
            ));
        };
        let used_resume_token = request.resume_token().is_some();
        if request.is_dry_run() {
            return Ok((SendResult::new(used_resume_token), None));
        }
        let size = usize::try_from(fs.expected_size).unwrap_or(usize::MAX).max(1);
        let payload = vec![0xAB; size];
        let stream: StreamBytes = Box::pin(InMemoryStream { cursor: io::Cursor::new(payload) });
        Ok((SendResult::new(used_resume_token), Some(stream)))
    }

    async fn send_dry(&self, request: SendDryRequest) -> Result<SendDryResponse, EndpointError> {
        let state = self.state.lock().expect("pool mutex poisoned");
        let items = request
            .items()
            .iter()
            .map(|item| {
                let size = state.filesystems.get(item.filesystem()).map_or(0, |fs| fs.expected_size);
                replication_endpoint::DryRunItem::new(size)
            })
            .collect();
        Ok(SendDryResponse::new(items))
    }

    async fn send_completed(&self, request: SendCompletedRequest) -> Result<(), EndpointError> {
        let mut state = self.state.lock().expect("pool mutex poisoned");
        if let Some(fs) = state.filesystems.get_mut(request.original().filesystem()) {
            fs.send_completed_count += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl replication_endpoint::Endpoint for FakeReceiver {
    async fn list_filesystems(&self) -> Result<ListFilesystemsResponse, EndpointError> {
        let state = self.state.lock().expect("pool mutex poisoned");
        Ok(list_filesystems_response(&state, true))
    }

    async fn list_versions(&self, path: &str) -> Result<ListVersionsResponse, EndpointError> {
        let state = self.state.lock().expect("pool mutex poisoned");
        let Some(fs) = state.filesystems.get(path) else {
            return Ok(ListVersionsResponse::new(Vec::new()));
        };
        if fs.fail_list_versions {
            return Err(EndpointError::transport(EndpointRole::Receiver, format!("{path}: simulated list failure")));
        }
        Ok(ListVersionsResponse::new(fs.receiver_versions.clone()))
    }

    async fn destroy_snapshots(&self, request: DestroySnapshotsRequest) -> Result<DestroySnapshotsResponse, EndpointError> {
        let mut state = self.state.lock().expect("pool mutex poisoned");
        let mut destroyed = Vec::new();
        if let Some(fs) = state.filesystems.get_mut(request.filesystem()) {
            fs.receiver_versions.retain(|version| {
                if request.names().iter().any(|name| name == version.name()) {
                    destroyed.push(version.name().to_string());
                    false
                } else {
                    true
                }
            });
        }
        Ok(DestroySnapshotsResponse::new(destroyed))
    }

    async fn wait_for_connectivity(&self) -> Result<(), EndpointError> {
        let state = self.state.lock().expect("pool mutex poisoned");
        if state.receiver_unreachable {
            return Err(EndpointError::transport(EndpointRole::Receiver, "simulated unreachable receiver"));
        }
        Ok(())
    }
}

#[async_trait]
impl Receiver for FakeReceiver {
    async fn receive(&self, request: ReceiveRequest, mut stream: StreamBytes) -> Result<(), EndpointError> {
        let mut drained = Vec::new();
        stream
            .read_to_end(&mut drained)
            .await
            .map_err(|error| EndpointError::transport(EndpointRole::Receiver, error.to_string()))?;

        let mut state = self.state.lock().expect("pool mutex poisoned");
        let path = request.filesystem().to_string();
        let Some(fs) = state.filesystems.get_mut(&path) else {
            return Err(EndpointError::protocol_violation(EndpointRole::Receiver, format!("{path}: unknown filesystem")));
        };

        if fs.fail_receive {
            return Err(EndpointError::transport(EndpointRole::Receiver, format!("{path}: simulated receive failure")));
        }

        if request.clear_resume_token() {
            fs.resume_token = None;
        }

        let materialized = find_version(&fs.sender_versions, request.to())
            .cloned()
            .unwrap_or_else(|| FilesystemVersion::new(&path, request.to_name(), VersionKind::Snapshot, request.to(), Txg::new(0), 0));
        if !fs.receiver_versions.iter().any(|v| v.guid() == materialized.guid()) {
            fs.receiver_versions.push(materialized);
        }
        Ok(())
    }
}

fn find_version(versions: &[FilesystemVersion], guid: Guid) -> Option<&FilesystemVersion> {
    versions.iter().find(|v| v.guid() == guid)
}

struct InMemoryStream {
    cursor: io::Cursor<Vec<u8>>,
}

impl AsyncRead for InMemoryStream {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let amount = io::Read::read(&mut this.cursor, buf.initialize_unfilled())?;
        buf.advance(amount);
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sender_and_receiver_share_state() {
        let pool = FakePoolBuilder::new()
            .sender_versions("tank/data", vec![snapshot("tank/data", "a", 1, 1)])
            .build();
        let sender = pool.sender();
        let response = sender.list_versions("tank/data").await.unwrap();
        assert_eq!(response.versions().len(), 1);
        assert!(pool.receiver_versions("tank/data").is_empty());
    }

    #[tokio::test]
    async fn receive_materializes_sender_version_by_guid() {
        let pool = FakePoolBuilder::new()
            .sender_versions("tank/data", vec![snapshot("tank/data", "a", 1, 1)])
            .expected_size("tank/data", 16)
            .build();
        let sender = pool.sender();
        let receiver = pool.receiver();

        let send_request = SendRequest::new("tank/data", None, Guid::new(1), "a", None, Default::default());
        let (result, stream) = sender.send(send_request).await.unwrap();
        assert!(!result.used_resume_token());
        let stream = stream.unwrap();

        let receive_request = ReceiveRequest::new("tank/data", Guid::new(1), "a", true, Default::default());
        receiver.receive(receive_request, stream).await.unwrap();

        let versions = pool.receiver_versions("tank/data");
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].guid(), Guid::new(1));
    }

    #[tokio::test]
    async fn send_dry_sums_per_filesystem_expected_size() {
        let pool = FakePoolBuilder::new()
            .sender_versions("tank/data", vec![snapshot("tank/data", "a", 1, 1)])
            .expected_size("tank/data", 512)
            .build();
        let sender = pool.sender();
        let request = SendDryRequest::new(
            vec![SendRequest::new("tank/data", None, Guid::new(1), "a", None, Default::default()).into_dry_run()],
            1,
        );
        let response = sender.send_dry(request).await.unwrap();
        assert_eq!(response.items()[0].expected_size(), 512);
    }
}
