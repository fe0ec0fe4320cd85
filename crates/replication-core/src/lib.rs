#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `replication-core` is the replication planner and step engine: given two
//! endpoints' filesystem inventories and per-filesystem version histories, it
//! derives a correct, resumable, partial-failure-tolerant sequence of
//! send/receive operations and drives them to completion while reporting
//! progress. YAML configuration parsing, the CLI surface, daemon lifecycle,
//! and the endpoints themselves (the real ZFS/RPC plumbing) are out of
//! scope; this crate only consumes the capability set defined in
//! `replication-endpoint`.
//!
//! # Design
//!
//! - [`version_algebra`] totally orders a filesystem's snapshots and
//!   bookmarks, computes the incremental path between two version lists, and
//!   classifies conflicts.
//! - [`conflict_resolver`] turns a classified conflict plus policy into
//!   either an accepted path or a terminal error, for initial replication
//!   only.
//! - [`resume_token`] decodes the receiver-reported resume token.
//! - [`step`] holds the [`step::Step`] value object and the logic that
//!   executes one send→receive round-trip.
//! - [`plan`] is the per-filesystem planning state machine,
//!   [`plan::plan_filesystem`], that consumes the three modules above plus
//!   policy to emit an ordered [`plan::Plan`].
//! - [`planner`] is the top-level coordinator: lists both endpoints in
//!   parallel, pairs filesystems by path, builds one [`plan::Plan`] per
//!   pair, and drives step execution across filesystems up to
//!   [`policy::ReplicationPolicy::filesystem_concurrency`].
//! - [`report`] exposes read-only snapshots of in-flight and completed
//!   progress for external observers.
//! - [`policy`] aggregates the policy knobs visible to the core.
//! - [`concurrency`] is the structured-concurrency primitive shared by
//!   [`plan`] and [`planner`] for running two fallible listing calls as one
//!   cancellation scope.
//! - [`error`] defines [`error::ReplicationError`], the error taxonomy
//!   returned by every fallible entry point.
//!
//! # Errors
//!
//! Every fallible public entry point returns `Result<_, error::ReplicationError>`.
//! A filesystem-level error marks that filesystem's report as failed without
//! aborting the others; a planning-phase error (listing either endpoint's
//! filesystems) aborts the whole attempt. Contract violations (a step
//! parent-identity mismatch, an internal path of length exactly one) are
//! not representable errors and panic instead, per [`error`].
//!
//! # Examples
//!
//! See `replication-core/tests/` for end-to-end scenarios built against the
//! in-memory fakes in `replication-test-support`.
//!
//! # See also
//!
//! - `replication-endpoint` for the `Sender`/`Receiver` capability traits
//!   this crate consumes.
//! - `replication-test-support` for in-memory fakes exercising the planner
//!   and step engine without a real ZFS/RPC stack.

/// Structured-concurrency primitive shared by [`plan`] and [`planner`].
pub mod concurrency;
/// Auto-resolution of conflicts detected during initial replication.
pub mod conflict_resolver;
/// The error taxonomy returned by the planner and step engine.
pub mod error;
/// The per-filesystem planning state machine.
pub mod plan;
/// The top-level cross-filesystem coordinator.
pub mod planner;
/// The policy knobs visible to the planner and step engine.
pub mod policy;
/// Read-only snapshots of in-flight and completed replication progress.
pub mod report;
/// Decoding of the receiver-reported resume token.
pub mod resume_token;
/// The `Step` value object and execution of one send→receive round-trip.
pub mod step;
/// Total ordering, incremental-path computation, and conflict detection.
pub mod version_algebra;

pub use conflict_resolver::InitialReplicationPolicy;
pub use error::ReplicationError;
pub use plan::{FilesystemPair, Plan};
pub use planner::{ConnectivityError, Planner};
pub use policy::ReplicationPolicy;
pub use report::{FilesystemReport, FilesystemStatus, ReplicationReport, StepReport};
pub use resume_token::ResumeToken;
pub use step::Step;
pub use version_algebra::{ConflictClassification, PathEdge, VersionDiff};
