//! The `Step` value object and the execution of one send→receive round-trip.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use replication_endpoint::{
    EndpointRole, FilesystemVersion, ReceiveRequest, Receiver, ReplicationOptions, Sender, SendCompletedRequest,
    SendRequest, StreamBytes,
};
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::ReplicationError;

/// One send→receive round-trip: `(parent filesystem, from-version?,
/// to-version, resume token, expected size, byte counter)`.
///
/// # Invariants
///
/// - [`Self::to`] is always a snapshot, never a bookmark; [`Step::new`]
///   panics otherwise.
/// - [`Self::from`] is absent only for an initial (full) send.
/// - The byte counter is published once by the executing task and read
///   under an acquire fence by the report surface; there is no
///   heap-allocated wrapper around it beyond the [`Arc`] itself.
#[derive(Debug)]
pub struct Step {
    parent_path: Arc<str>,
    parent_token: Arc<()>,
    from: Option<FilesystemVersion>,
    to: FilesystemVersion,
    resume_token: Option<String>,
    expected_size: u64,
    bytes_transferred: Arc<AtomicU64>,
}

impl Step {
    /// Constructs a step.
    ///
    /// `parent_token` identifies the owning [`crate::plan::Plan`] for the
    /// purposes of [`Self::is_target_equal`]; every step built while
    /// planning one filesystem should share the same token.
    ///
    /// # Panics
    ///
    /// Panics if `to` is not a snapshot: a bookmark is never a valid send
    /// target, and a plan that tries to make one is a logic bug.
    #[must_use]
    pub fn new(
        parent_path: Arc<str>,
        parent_token: Arc<()>,
        from: Option<FilesystemVersion>,
        to: FilesystemVersion,
        resume_token: Option<String>,
    ) -> Self {
        assert!(
            to.is_snapshot(),
            "step target must be a snapshot, got a bookmark ({}) in {}",
            to.name(),
            parent_path
        );
        Self {
            parent_path,
            parent_token,
            from,
            to,
            resume_token,
            expected_size: 0,
            bytes_transferred: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the owning filesystem path.
    #[must_use]
    pub fn parent_path(&self) -> &str {
        &self.parent_path
    }

    /// Returns the base version, absent for an initial (full) send.
    #[must_use]
    pub const fn from(&self) -> Option<&FilesystemVersion> {
        self.from.as_ref()
    }

    /// Returns the target version.
    #[must_use]
    pub const fn to(&self) -> &FilesystemVersion {
        &self.to
    }

    /// Returns the raw resume token string, if this step resumes a
    /// previously interrupted receive.
    #[must_use]
    pub fn resume_token(&self) -> Option<&str> {
        self.resume_token.as_deref()
    }

    /// Returns the expected size in bytes, zero if unestimated or if
    /// estimation failed.
    #[must_use]
    pub const fn expected_size(&self) -> u64 {
        self.expected_size
    }

    pub(crate) const fn set_expected_size(&mut self, value: u64) {
        self.expected_size = value;
    }

    /// Returns the bytes transferred so far, read under an acquire fence so
    /// a concurrent reader observes a monotone value.
    #[must_use]
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::Acquire)
    }

    /// Returns a cheap clone of the byte counter handle, for a report
    /// surface to poll without touching the executing task's state.
    #[must_use]
    pub fn bytes_transferred_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.bytes_transferred)
    }

    /// Reports whether two steps replicate the same (parent path,
    /// from-GUID, to-GUID) triple, the definition of idempotent-retry
    /// equality.
    ///
    /// # Panics
    ///
    /// Panics if the two steps share a parent path but were built by
    /// different plans (different `parent_token`s): pairing steps across
    /// attempts by path alone, rather than by the parent's identity, is a
    /// contract violation in the caller.
    #[must_use]
    pub fn is_target_equal(&self, other: &Self) -> bool {
        if *self.parent_path != *other.parent_path {
            return false;
        }
        assert!(
            Arc::ptr_eq(&self.parent_token, &other.parent_token),
            "contract violation: steps for path {} belong to different parent plans",
            self.parent_path
        );
        self.from.as_ref().map(FilesystemVersion::guid) == other.from.as_ref().map(FilesystemVersion::guid)
            && self.to.guid() == other.to.guid()
    }

    fn send_request(&self, options: &ReplicationOptions) -> SendRequest {
        SendRequest::new(
            &*self.parent_path,
            self.from.as_ref().map(FilesystemVersion::guid),
            self.to.guid(),
            self.to.name(),
            self.resume_token.clone(),
            options.clone(),
        )
    }

    /// Executes this step: send → receive → advance counters → notify the
    /// sender. Errors from any leg propagate unwrapped; the send stream is
    /// a local binding dropped on every exit path, closing it whether the
    /// step succeeds, the receive fails, or an error is returned early.
    pub async fn execute(
        &self,
        sender: &dyn Sender,
        receiver: &dyn Receiver,
        filesystem_bytes_replicated: &AtomicU64,
        options: &ReplicationOptions,
    ) -> Result<(), ReplicationError> {
        let send_request = self.send_request(options);
        let (send_result, stream) = sender
            .send(send_request.clone())
            .await
            .map_err(|error| ReplicationError::from_endpoint(&*self.parent_path, error))?;
        let stream = stream.ok_or_else(|| ReplicationError::ProtocolViolation {
            role: EndpointRole::Sender,
            message: format!("{}: send returned no stream for a non-dry-run request", self.parent_path),
        })?;

        let counted: StreamBytes = Box::pin(ByteCountingReader::new(stream, Arc::clone(&self.bytes_transferred)));

        let receive_request = ReceiveRequest::new(
            &*self.parent_path,
            self.to.guid(),
            self.to.name(),
            !send_result.used_resume_token(),
            options.clone(),
        );
        receiver
            .receive(receive_request, counted)
            .await
            .map_err(|error| ReplicationError::ReceiveFailed {
                path: self.parent_path.to_string(),
                message: error.to_string(),
                source: Some(Box::new(error)),
            })?;

        filesystem_bytes_replicated.fetch_add(self.bytes_transferred(), Ordering::Release);

        sender
            .send_completed(SendCompletedRequest::new(send_request))
            .await
            .map_err(|error| ReplicationError::from_endpoint(&*self.parent_path, error))?;

        Ok(())
    }
}

/// Wraps a send stream, publishing bytes read into a shared counter as they
/// are observed. The inner stream is already `Unpin` (it is a
/// `Pin<Box<dyn AsyncRead + Send + Unpin>>`), so this wrapper needs no
/// unsafe pinning.
struct ByteCountingReader {
    inner: StreamBytes,
    counter: Arc<AtomicU64>,
}

impl ByteCountingReader {
    const fn new(inner: StreamBytes, counter: Arc<AtomicU64>) -> Self {
        Self { inner, counter }
    }
}

impl AsyncRead for ByteCountingReader {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = this.inner.as_mut().poll_read(cx, buf);
        if poll.is_ready() {
            let read = buf.filled().len() - before;
            if read > 0 {
                this.counter.fetch_add(read as u64, Ordering::Release);
            }
        }
        poll
    }
}

#[cfg(test)]
mod tests {
    use replication_endpoint::{Guid, Txg, VersionKind};

    use super::*;

    fn snap(name: &str, guid: u64) -> FilesystemVersion {
        FilesystemVersion::new("tank/data", name, VersionKind::Snapshot, Guid::new(guid), Txg::new(1), 0)
    }

    fn bookmark(name: &str, guid: u64) -> FilesystemVersion {
        FilesystemVersion::new("tank/data", name, VersionKind::Bookmark, Guid::new(guid), Txg::new(1), 0)
    }

    #[test]
    #[should_panic(expected = "must be a snapshot")]
    fn new_panics_on_bookmark_target() {
        let _ = Step::new(Arc::from("tank/data"), Arc::new(()), None, bookmark("b#", 2), None);
    }

    #[test]
    fn target_equal_compares_guids_not_names() {
        let token = Arc::new(());
        let a = Step::new(
            Arc::from("tank/data"),
            Arc::clone(&token),
            Some(snap("a", 1)),
            snap("b", 2),
            None,
        );
        let b = Step::new(
            Arc::from("tank/data"),
            token,
            Some(snap("a-renamed", 1)),
            snap("b-renamed", 2),
            None,
        );
        assert!(a.is_target_equal(&b));
    }

    #[test]
    #[should_panic(expected = "different parent plans")]
    fn target_equal_panics_on_foreign_parent_with_same_path() {
        let a = Step::new(Arc::from("tank/data"), Arc::new(()), None, snap("a", 1), None);
        let b = Step::new(Arc::from("tank/data"), Arc::new(()), None, snap("a", 1), None);
        let _ = a.is_target_equal(&b);
    }

    #[test]
    fn target_equal_is_false_for_different_paths_without_panicking() {
        let a = Step::new(Arc::from("tank/data"), Arc::new(()), None, snap("a", 1), None);
        let b = Step::new(Arc::from("tank/other"), Arc::new(()), None, snap("a", 1), None);
        assert!(!a.is_target_equal(&b));
    }

    #[test]
    fn expected_size_defaults_to_zero_and_is_settable() {
        let mut step = Step::new(Arc::from("tank/data"), Arc::new(()), None, snap("a", 1), None);
        assert_eq!(step.expected_size(), 0);
        step.set_expected_size(1024);
        assert_eq!(step.expected_size(), 1024);
    }
}
