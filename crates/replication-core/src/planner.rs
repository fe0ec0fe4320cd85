//! The top-level cross-filesystem coordinator.
//!
//! [`Planner`] lists both endpoints' filesystems in parallel, pairs them by
//! path, builds one [`crate::plan::Plan`] per pair via
//! [`crate::plan::plan_filesystem`], and drives step execution across
//! filesystems bounded by [`crate::policy::ReplicationPolicy::filesystem_concurrency`].
//! Within one filesystem, steps commit strictly in order; between
//! filesystems there is no ordering guarantee. A filesystem-level error
//! marks that filesystem's report as failed without aborting the others;
//! failing to list either endpoint's filesystems aborts the whole attempt.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use replication_endpoint::{EndpointFilesystem, ListFilesystemsResponse, Receiver, Sender};
use rustc_hash::FxHashMap;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::concurrency::concurrent_pair;
use crate::error::ReplicationError;
use crate::plan::{self, FilesystemPair, Plan};
use crate::policy::ReplicationPolicy;
use crate::report::{FilesystemReport, FilesystemStatus, ReplicationReport, StepReport};
use crate::step::Step;

/// Either endpoint, or both, failed a connectivity probe.
#[derive(Debug, thiserror::Error)]
pub enum ConnectivityError {
    /// Only the sender is unreachable.
    #[error("sender is not reachable: {0}")]
    Sender(String),
    /// Only the receiver is unreachable.
    #[error("receiver is not reachable: {0}")]
    Receiver(String),
    /// Both endpoints are unreachable. The message is deduplicated when
    /// both sides reported the identical cause.
    #[error("sender and receiver are not reachable: {0}")]
    Both(String),
}

struct LiveStep {
    from_name: Option<String>,
    to_name: String,
    bytes_expected: u64,
    bytes_transferred: Arc<AtomicU64>,
    resumed: bool,
}

impl LiveStep {
    fn from_step(step: &Step) -> Self {
        Self {
            from_name: step.from().map(|v| v.name().to_string()),
            to_name: step.to().name().to_string(),
            bytes_expected: step.expected_size(),
            bytes_transferred: step.bytes_transferred_handle(),
            resumed: step.resume_token().is_some(),
        }
    }

    fn report(&self) -> StepReport {
        StepReport::new(
            self.from_name.clone(),
            self.to_name.clone(),
            self.bytes_expected,
            self.bytes_transferred.load(Ordering::Acquire),
            self.resumed,
        )
    }
}

struct FilesystemState {
    path: String,
    status: Mutex<FilesystemStatus>,
    steps: Mutex<Vec<LiveStep>>,
}

impl FilesystemState {
    fn report(&self) -> FilesystemReport {
        let status = self.status.lock().expect("status mutex poisoned").clone();
        let steps = self.steps.lock().expect("steps mutex poisoned");
        FilesystemReport::new(self.path.clone(), status, steps.iter().map(LiveStep::report).collect())
    }
}

/// Top-level coordinator for one replication attempt between a sender and a
/// receiver.
///
/// A `Planner` is reusable across attempts: each call to [`Self::run`]
/// re-lists both endpoints, re-pairs filesystems, and replaces the
/// previous attempt's live progress state. Resume tokens are read live from
/// the receiver each time; nothing here persists across process restarts.
pub struct Planner {
    sender: Arc<dyn Sender>,
    receiver: Arc<dyn Receiver>,
    policy: ReplicationPolicy,
    cancellation: CancellationToken,
    filesystems: Mutex<Vec<Arc<FilesystemState>>>,
}

impl fmt::Debug for Planner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Planner").field("policy", &self.policy).finish_non_exhaustive()
    }
}

impl Planner {
    /// Builds a planner over the given sender and receiver with the given
    /// policy.
    #[must_use]
    pub fn new(sender: Arc<dyn Sender>, receiver: Arc<dyn Receiver>, policy: ReplicationPolicy) -> Self {
        Self {
            sender,
            receiver,
            policy,
            cancellation: CancellationToken::new(),
            filesystems: Mutex::new(Vec::new()),
        }
    }

    /// Returns a token that cancels an in-flight [`Self::run`]. Cancelling
    /// stops the attempt at the next suspension point; any filesystem
    /// already mid-step is marked failed rather than silently abandoned, so
    /// a subsequent attempt can observe why it stopped.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Probes both endpoints for reachability in parallel. Unlike listing,
    /// both probes always run to completion: a single-sided failure should
    /// not be reported as "both unreachable".
    pub async fn check_connectivity(&self) -> Result<(), ConnectivityError> {
        let (sender_result, receiver_result) =
            tokio::join!(self.sender.wait_for_connectivity(), self.receiver.wait_for_connectivity());
        match (sender_result, receiver_result) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(error), Ok(())) => Err(ConnectivityError::Sender(error.to_string())),
            (Ok(()), Err(error)) => Err(ConnectivityError::Receiver(error.to_string())),
            (Err(sender_error), Err(receiver_error)) => {
                let (sender_message, receiver_message) = (sender_error.to_string(), receiver_error.to_string());
                if sender_message == receiver_message {
                    Err(ConnectivityError::Both(sender_message))
                } else {
                    Err(ConnectivityError::Both(format!("sender: {sender_message}; receiver: {receiver_message}")))
                }
            }
        }
    }

    /// Returns a read-only snapshot of the most recent (or in-flight)
    /// attempt's progress. Empty before the first call to [`Self::run`].
    #[must_use]
    pub fn report(&self) -> ReplicationReport {
        let filesystems = self.filesystems.lock().expect("state mutex poisoned");
        ReplicationReport::new(filesystems.iter().map(|fs| fs.report()).collect())
    }

    /// Lists both endpoints' filesystems concurrently. Either failure is
    /// fatal for the whole attempt.
    async fn list_filesystems(&self) -> Result<(Vec<EndpointFilesystem>, Vec<EndpointFilesystem>), ReplicationError> {
        let sender = Arc::clone(&self.sender);
        let receiver = Arc::clone(&self.receiver);
        concurrent_pair(
            async move {
                sender
                    .list_filesystems()
                    .await
                    .map(ListFilesystemsResponse::into_filesystems)
                    .map_err(|error| ReplicationError::from_endpoint("listing sender filesystems", error))
            },
            async move {
                receiver
                    .list_filesystems()
                    .await
                    .map(ListFilesystemsResponse::into_filesystems)
                    .map_err(|error| ReplicationError::from_endpoint("listing receiver filesystems", error))
            },
        )
        .await
    }

    /// Runs one replication attempt to completion: lists and pairs
    /// filesystems, plans and executes each pair's steps up to
    /// `filesystem_concurrency` at a time, and returns the final report.
    ///
    /// Returns an error only when listing either endpoint's filesystems
    /// fails; per-filesystem planning and execution errors are captured in
    /// the returned report instead of aborting the attempt.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<ReplicationReport, ReplicationError> {
        let (sender_filesystems, receiver_filesystems) = self.list_filesystems().await?;
        let pairs = pair_filesystems(sender_filesystems, receiver_filesystems);

        let states: Vec<Arc<FilesystemState>> = pairs
            .iter()
            .map(|pair| {
                Arc::new(FilesystemState {
                    path: pair.path().to_string(),
                    status: Mutex::new(FilesystemStatus::Pending),
                    steps: Mutex::new(Vec::new()),
                })
            })
            .collect();
        *self.filesystems.lock().expect("state mutex poisoned") = states.clone();

        let semaphore = Arc::new(Semaphore::new(self.policy.filesystem_concurrency().get()));
        let mut join_set = JoinSet::new();
        for (pair, state) in pairs.into_iter().zip(states) {
            let sender = Arc::clone(&self.sender);
            let receiver = Arc::clone(&self.receiver);
            let policy = self.policy.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancellation = self.cancellation.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
                run_filesystem(&pair, &sender, &receiver, &policy, &state, &cancellation).await;
            });
        }
        while let Some(outcome) = join_set.join_next().await {
            outcome.expect("filesystem task panicked");
        }

        Ok(self.report())
    }
}

fn pair_filesystems(sender_filesystems: Vec<EndpointFilesystem>, receiver_filesystems: Vec<EndpointFilesystem>) -> Vec<FilesystemPair> {
    let mut receiver_by_path: FxHashMap<String, EndpointFilesystem> =
        receiver_filesystems.into_iter().map(|fs| (fs.path().to_string(), fs)).collect();
    sender_filesystems
        .into_iter()
        .map(|sender_fs| {
            let path = sender_fs.path().to_string();
            let receiver_fs = receiver_by_path.remove(&path);
            FilesystemPair::new(path, sender_fs, receiver_fs)
        })
        .collect()
}

const fn error_kind(error: &ReplicationError) -> &'static str {
    match error {
        ReplicationError::Transport { .. } => "transport",
        ReplicationError::ProtocolViolation { .. } => "protocol_violation",
        ReplicationError::Conflict { .. } => "conflict",
        ReplicationError::ResumeTokenMalformed { .. } => "resume_token_malformed",
        ReplicationError::ReceiveFailed { .. } => "receive_failed",
        ReplicationError::SizeEstimateFailed { .. } => "size_estimate_failed",
        ReplicationError::PlaceholderMismatch { .. } => "placeholder_mismatch",
    }
}

fn fail(state: &FilesystemState, error: &ReplicationError) {
    *state.status.lock().expect("status mutex poisoned") = FilesystemStatus::Failed {
        kind: error_kind(error),
        message: error.to_string(),
    };
}

#[instrument(skip(pair, sender, receiver, policy, state, cancellation), fields(path = pair.path()))]
async fn run_filesystem(
    pair: &FilesystemPair,
    sender: &Arc<dyn Sender>,
    receiver: &Arc<dyn Receiver>,
    policy: &ReplicationPolicy,
    state: &FilesystemState,
    cancellation: &CancellationToken,
) {
    let plan: Plan = tokio::select! {
        biased;
        () = cancellation.cancelled() => {
            fail(state, &ReplicationError::Transport {
                role: replication_endpoint::EndpointRole::Sender,
                message: "replication attempt cancelled before planning completed".to_string(),
                source: None,
            });
            return;
        }
        result = plan::plan_filesystem(pair, sender, receiver, policy) => {
            match result {
                Ok(plan) => plan,
                Err(error) => {
                    error!(path = pair.path(), error = %error, "filesystem plan failed");
                    fail(state, &error);
                    return;
                }
            }
        }
    };

    {
        let mut steps = state.steps.lock().expect("steps mutex poisoned");
        *steps = plan.steps().iter().map(LiveStep::from_step).collect();
    }

    if plan.is_empty() {
        info!(path = pair.path(), "no replication required");
        *state.status.lock().expect("status mutex poisoned") = FilesystemStatus::Done;
        return;
    }

    *state.status.lock().expect("status mutex poisoned") = FilesystemStatus::Running;

    let filesystem_bytes_replicated = AtomicU64::new(0);
    for step in plan.steps() {
        let outcome = tokio::select! {
            biased;
            () = cancellation.cancelled() => {
                fail(state, &ReplicationError::Transport {
                    role: replication_endpoint::EndpointRole::Sender,
                    message: "replication attempt cancelled mid-step".to_string(),
                    source: None,
                });
                return;
            }
            outcome = step.execute(sender.as_ref(), receiver.as_ref(), &filesystem_bytes_replicated, policy.replication_options()) => outcome,
        };
        if let Err(error) = outcome {
            error!(path = pair.path(), error = %error, "step execution failed");
            fail(state, &error);
            return;
        }
    }

    *state.status.lock().expect("status mutex poisoned") = FilesystemStatus::Done;
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use replication_test_support::{snapshot, FakePoolBuilder};

    use super::*;
    use crate::conflict_resolver::InitialReplicationPolicy;

    #[tokio::test]
    async fn fresh_initial_most_recent_replicates_tip_only() {
        let pool = FakePoolBuilder::new()
            .sender_versions(
                "tank/data",
                vec![
                    snapshot("tank/data", "a", 1, 1),
                    snapshot("tank/data", "b", 2, 2),
                    snapshot("tank/data", "c", 3, 3),
                ],
            )
            .build();
        let planner = Planner::new(pool.sender(), pool.receiver(), ReplicationPolicy::new(InitialReplicationPolicy::MostRecent));

        let report = planner.run().await.unwrap();
        assert_eq!(report.filesystems().len(), 1);
        let fs_report = &report.filesystems()[0];
        assert_eq!(fs_report.status(), &FilesystemStatus::Done);
        assert_eq!(fs_report.steps().len(), 1);
        assert_eq!(fs_report.steps()[0].to_name(), "c");

        let receiver_versions = pool.receiver_versions("tank/data");
        assert_eq!(receiver_versions.len(), 1);
        assert_eq!(receiver_versions[0].name(), "c");
        assert_eq!(pool.send_completed_count("tank/data"), 1);
    }

    #[tokio::test]
    async fn diverged_receiver_marks_filesystem_failed_without_aborting_others() {
        let pool = FakePoolBuilder::new()
            .sender_versions("tank/a", vec![snapshot("tank/a", "a", 1, 1), snapshot("tank/a", "b", 2, 2)])
            .receiver_versions("tank/a", vec![snapshot("tank/a", "a", 1, 1), snapshot("tank/a", "r", 99, 2)])
            .sender_versions("tank/b", vec![snapshot("tank/b", "a", 10, 1)])
            .build();
        let planner = Planner::new(
            pool.sender(),
            pool.receiver(),
            ReplicationPolicy::new(InitialReplicationPolicy::MostRecent).with_filesystem_concurrency(NonZeroUsize::new(2).unwrap()),
        );

        let report = planner.run().await.unwrap();
        let by_path = |path: &str| report.filesystems().iter().find(|fs| fs.path() == path).unwrap();

        assert!(matches!(by_path("tank/a").status(), FilesystemStatus::Failed { kind: "conflict", .. }));
        assert_eq!(by_path("tank/b").status(), &FilesystemStatus::Done);
    }

    #[tokio::test]
    async fn already_up_to_date_plans_empty() {
        let pool = FakePoolBuilder::new()
            .sender_versions("tank/data", vec![snapshot("tank/data", "a", 1, 1), snapshot("tank/data", "b", 2, 2)])
            .receiver_versions("tank/data", vec![snapshot("tank/data", "a", 1, 1), snapshot("tank/data", "b", 2, 2)])
            .build();
        let planner = Planner::new(pool.sender(), pool.receiver(), ReplicationPolicy::default());

        let report = planner.run().await.unwrap();
        assert_eq!(report.filesystems()[0].status(), &FilesystemStatus::Done);
        assert!(report.filesystems()[0].steps().is_empty());
    }

    #[tokio::test]
    async fn connectivity_check_dedups_identical_failure_messages() {
        let pool = FakePoolBuilder::new().sender_unreachable().receiver_unreachable().build();
        let planner = Planner::new(pool.sender(), pool.receiver(), ReplicationPolicy::default());
        let error = planner.check_connectivity().await.unwrap_err();
        match error {
            ConnectivityError::Both(message) => assert!(!message.contains("sender:")),
            other => panic!("expected a combined error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn connectivity_check_reports_single_sided_failure() {
        let pool = FakePoolBuilder::new().sender_unreachable().build();
        let planner = Planner::new(pool.sender(), pool.receiver(), ReplicationPolicy::default());
        let error = planner.check_connectivity().await.unwrap_err();
        assert!(matches!(error, ConnectivityError::Sender(_)));
    }

    #[tokio::test]
    async fn idempotent_rerun_yields_empty_plans() {
        let pool = FakePoolBuilder::new()
            .sender_versions(
                "tank/data",
                vec![snapshot("tank/data", "a", 1, 1), snapshot("tank/data", "b", 2, 2)],
            )
            .build();
        let planner = Planner::new(pool.sender(), pool.receiver(), ReplicationPolicy::new(InitialReplicationPolicy::All));

        let first = planner.run().await.unwrap();
        assert!(!first.filesystems()[0].steps().is_empty());

        let second = planner.run().await.unwrap();
        assert!(second.filesystems()[0].steps().is_empty());
        assert_eq!(second.filesystems()[0].status(), &FilesystemStatus::Done);
    }
}
