#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `replication-endpoint` defines the capability set that the replication
//! planner and step engine (in `replication-core`) consume to talk to a
//! sender and a receiver. Endpoints themselves (the ZFS/RPC plumbing that
//! actually lists snapshots or streams bytes) are out of scope here; this
//! crate only fixes the shape of the conversation.
//!
//! # Design
//!
//! - [`types`] holds the small value types shared by both sides of the
//!   conversation: [`types::Guid`], [`types::Txg`], [`types::VersionKind`],
//!   [`types::FilesystemVersion`], and [`types::EndpointFilesystem`].
//! - [`requests`] holds the request/response structs passed to the trait
//!   methods below.
//! - [`traits`] defines [`traits::Endpoint`] (shared by both sides),
//!   [`traits::Sender`], and [`traits::Receiver`] as `async_trait` trait
//!   objects, matching the "tagged capability records" shape called for by
//!   a polymorphic endpoint abstraction: no deep inheritance hierarchy, just
//!   two narrow interfaces a driver can hand to the core as `Arc<dyn Sender>`
//!   / `Arc<dyn Receiver>`.
//! - [`error`] defines [`error::EndpointError`], the error type returned by
//!   every trait method; `replication-core` maps it into its own error
//!   taxonomy.
//!
//! # Errors
//!
//! Every trait method returns `Result<_, EndpointError>`. The crate does not
//! interpret failures beyond distinguishing transport failures from
//! protocol violations (a callee returning a value it promised not to).
//!
//! # See also
//!
//! - `replication-core::planner` for the consumer of [`traits::Endpoint`].
//! - `replication-test-support` for in-memory fakes implementing these
//!   traits.

/// Error type returned by every endpoint trait method.
pub mod error;
/// Request and response value types exchanged with endpoints.
pub mod requests;
/// `Sender`/`Receiver` capability traits.
pub mod traits;
/// Shared value types: GUIDs, TXGs, filesystem versions.
pub mod types;

pub use error::{EndpointError, EndpointRole};
pub use requests::{
    DestroySnapshotsRequest, DestroySnapshotsResponse, DryRunItem, ListFilesystemsRequest,
    ListFilesystemsResponse, ListVersionsRequest, ListVersionsResponse, ReceiveRequest,
    SendCompletedRequest, SendDryRequest, SendDryResponse, SendRequest, SendResult, StreamBytes,
};
pub use traits::{Endpoint, Receiver, Sender};
pub use types::{EndpointFilesystem, FilesystemVersion, Guid, ReplicationOptions, Txg, VersionKind};
