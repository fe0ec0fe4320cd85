//! The per-filesystem planning state machine.
//!
//! `plan_filesystem` walks the states described in the filesystem-plan
//! component design linearly: placeholder short-circuit, concurrent
//! listing, resume decision, the resume or non-resume branch, size
//! estimation, and finally a ready [`Plan`]. There is no long-lived state
//! machine object: a re-plan on retry re-runs this function from scratch
//! and produces fresh [`Step`]s.

use std::sync::Arc;

use replication_endpoint::{EndpointFilesystem, FilesystemVersion, Receiver, Sender, SendDryRequest};
use tracing::{instrument, warn};

use crate::concurrency::concurrent_pair;
use crate::conflict_resolver::{self, InitialReplicationPolicy};
use crate::error::ReplicationError;
use crate::policy::ReplicationPolicy;
use crate::resume_token;
use crate::step::Step;
use crate::version_algebra::{self, ConflictClassification, PathEdge, VersionDiff};

/// One path's sender-side descriptor (always present) and receiver-side
/// descriptor (absent for initial replication).
#[derive(Clone, Debug)]
pub struct FilesystemPair {
    path: String,
    sender: EndpointFilesystem,
    receiver: Option<EndpointFilesystem>,
}

impl FilesystemPair {
    /// Pairs a sender-side descriptor with an optional receiver-side one.
    #[must_use]
    pub fn new(path: impl Into<String>, sender: EndpointFilesystem, receiver: Option<EndpointFilesystem>) -> Self {
        Self {
            path: path.into(),
            sender,
            receiver,
        }
    }

    /// Returns the filesystem path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the sender-side descriptor.
    #[must_use]
    pub const fn sender(&self) -> &EndpointFilesystem {
        &self.sender
    }

    /// Returns the receiver-side descriptor, absent for initial replication.
    #[must_use]
    pub const fn receiver(&self) -> Option<&EndpointFilesystem> {
        self.receiver.as_ref()
    }
}

/// An ordered list of steps for one filesystem. An empty plan means the
/// filesystem is already up to date.
#[derive(Debug)]
pub struct Plan {
    path: Arc<str>,
    steps: Vec<Step>,
}

impl Plan {
    fn empty(path: impl Into<Arc<str>>) -> Self {
        Self {
            path: path.into(),
            steps: Vec::new(),
        }
    }

    /// Returns the filesystem path this plan covers.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the ordered steps.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Returns a mutable view of the ordered steps, for the step engine to
    /// execute and for size estimation to fill in.
    pub fn steps_mut(&mut self) -> &mut [Step] {
        &mut self.steps
    }

    /// Reports whether this filesystem requires no replication work.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Builds a replication plan for one paired filesystem.
///
/// # Panics
///
/// Panics if [`version_algebra::diff`] ever computes a clean path of length
/// exactly one; see that function's panic documentation.
#[instrument(skip(pair, sender, receiver, policy), fields(path = pair.path()))]
pub async fn plan_filesystem(
    pair: &FilesystemPair,
    sender: &Arc<dyn Sender>,
    receiver: &Arc<dyn Receiver>,
    policy: &ReplicationPolicy,
) -> Result<Plan, ReplicationError> {
    let path: Arc<str> = Arc::from(pair.path());

    if pair.sender().is_placeholder() {
        return match pair.receiver() {
            None => Ok(Plan::empty(path)),
            Some(receiver_fs) if receiver_fs.is_placeholder() => Ok(Plan::empty(path)),
            Some(_) => Err(ReplicationError::PlaceholderMismatch { path: path.to_string() }),
        };
    }

    let receiver_descriptor = pair.receiver().cloned();
    let skip_receiver_listing = receiver_descriptor
        .as_ref()
        .is_none_or(EndpointFilesystem::is_placeholder);

    let (mut sender_versions, mut receiver_versions) = {
        let sender = Arc::clone(sender);
        let receiver = Arc::clone(receiver);
        let list_path = pair.path().to_string();
        let sender_list_path = list_path.clone();
        let receiver_list_path = list_path.clone();
        concurrent_pair(
            async move {
                sender
                    .list_versions(&sender_list_path)
                    .await
                    .map(|response| response.into_versions())
                    .map_err(|error| ReplicationError::from_endpoint(format!("listing versions of {sender_list_path}"), error))
            },
            async move {
                if skip_receiver_listing {
                    return Ok(Vec::new());
                }
                receiver
                    .list_versions(&receiver_list_path)
                    .await
                    .map(|response| response.into_versions())
                    .map_err(|error| {
                        ReplicationError::from_endpoint(format!("listing versions of {receiver_list_path}"), error)
                    })
            },
        )
        .await?
    };
    version_algebra::sort_versions(&mut sender_versions);
    version_algebra::sort_versions(&mut receiver_versions);

    let parent_token = Arc::new(());
    let resume_raw_token = receiver_descriptor.as_ref().and_then(EndpointFilesystem::resume_token).map(str::to_string);

    let edges = if let Some(raw_token) = resume_raw_token.as_deref() {
        // resume_branch already applies one_step collapsing to the tail only;
        // applying it again here would also swallow the resume step itself.
        resume_branch(&path, raw_token, &sender_versions, policy.one_step())?
    } else {
        let diff = version_algebra::diff(&receiver_versions, &sender_versions);
        let mut edges = match diff {
            VersionDiff::Classification(ConflictClassification::MostRecentAlreadyPresent) => Vec::new(),
            VersionDiff::Classification(classification) => {
                conflict_resolver::resolve(&path, classification, receiver_versions.is_empty(), policy.conflict_resolution())?
            }
            VersionDiff::Clean(edges) => edges,
        };
        if policy.one_step() && edges.len() > 1 && edges[0].from().is_some_and(FilesystemVersion::is_snapshot) {
            let to = edges.last().expect("checked len > 1").to().clone();
            edges = vec![PathEdge::new(edges[0].from().cloned(), to)];
        }
        edges
    };

    let mut plan = Plan {
        path: Arc::clone(&path),
        steps: edges_to_steps(&path, &parent_token, edges, resume_raw_token),
    };

    estimate_sizes(&path, &mut plan, sender, policy).await;

    Ok(plan)
}

/// The receiver reported a resume token. Fabricates a first step
/// carrying the raw token, then incremental steps over the remaining
/// sender snapshots (bookmarks dropped), collapsing the tail to one step
/// when `one_step` is set and the tail has more than one step, but never
/// collapsing the resume step itself.
fn resume_branch(
    path: &Arc<str>,
    raw_token: &str,
    sorted_sender: &[FilesystemVersion],
    one_step: bool,
) -> Result<Vec<PathEdge>, ReplicationError> {
    let token = resume_token::decode(path, raw_token)?;

    let to_version = sorted_sender
        .iter()
        .find(|v| v.guid() == token.to_guid() && v.is_snapshot())
        .ok_or_else(|| ReplicationError::ResumeTokenMalformed {
            path: path.to_string(),
            raw: raw_token.to_string(),
            reason: "token's 'to' guid is not a sender snapshot".to_string(),
        })?
        .clone();

    let from_version = match token.from_guid() {
        None => None,
        Some(from_guid) => {
            let mut candidates = sorted_sender.iter().filter(|v| v.guid() == from_guid);
            let chosen = candidates
                .clone()
                .find(|v| v.is_snapshot())
                .or_else(|| candidates.next())
                .ok_or_else(|| ReplicationError::ResumeTokenMalformed {
                    path: path.to_string(),
                    raw: raw_token.to_string(),
                    reason: "token's 'from' guid is not present on the sender".to_string(),
                })?;
            Some(chosen.clone())
        }
    };

    let resume_edge = PathEdge::new(from_version, to_version.clone());

    let sender_snapshots: Vec<FilesystemVersion> = sorted_sender.iter().filter(|v| v.is_snapshot()).cloned().collect();
    let to_pos = sender_snapshots
        .iter()
        .position(|v| v.guid() == to_version.guid())
        .expect("to_version was found among sender snapshots above");
    let remaining = &sender_snapshots[to_pos..];

    let mut tail = Vec::new();
    if one_step && remaining.len() > 2 {
        let last = remaining.last().expect("checked len > 2").clone();
        tail.push(PathEdge::new(Some(remaining[0].clone()), last));
    } else {
        for pair in remaining.windows(2) {
            tail.push(PathEdge::new(Some(pair[0].clone()), pair[1].clone()));
        }
    }

    let mut edges = Vec::with_capacity(1 + tail.len());
    edges.push(resume_edge);
    edges.extend(tail);
    Ok(edges)
}

/// Builds steps from an ordered edge list. `resume_token`, if present, is
/// carried only by the first step: it fabricates the resume step, and every
/// subsequent step is a plain incremental.
fn edges_to_steps(path: &Arc<str>, parent_token: &Arc<()>, edges: Vec<PathEdge>, resume_token: Option<String>) -> Vec<Step> {
    edges
        .into_iter()
        .enumerate()
        .map(|(index, edge)| {
            let (from, to) = (edge.from().cloned(), edge.to().clone());
            let token = if index == 0 { resume_token.clone() } else { None };
            Step::new(Arc::clone(path), Arc::clone(parent_token), from, to, token)
        })
        .collect()
}

async fn estimate_sizes(path: &Arc<str>, plan: &mut Plan, sender: &Arc<dyn Sender>, policy: &ReplicationPolicy) {
    if plan.steps().is_empty() {
        return;
    }

    let requests: Vec<_> = plan
        .steps()
        .iter()
        .map(|step| {
            replication_endpoint::SendRequest::new(
                step.parent_path(),
                step.from().map(FilesystemVersion::guid),
                step.to().guid(),
                step.to().name(),
                step.resume_token().map(str::to_string),
                policy.replication_options().clone(),
            )
            .into_dry_run()
        })
        .collect();

    let request = SendDryRequest::new(requests, policy.size_estimation_concurrency().get());
    match sender.send_dry(request).await {
        Ok(response) => {
            for (step, estimate) in plan.steps_mut().iter_mut().zip(response.items()) {
                step.set_expected_size(estimate.expected_size());
            }
        }
        Err(error) => {
            let failure = ReplicationError::SizeEstimateFailed {
                path: path.to_string(),
                message: error.to_string(),
            };
            warn!(path = %path, error = %failure, "size estimation failed, continuing with zeroed expected sizes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_reports_emptiness() {
        let plan = Plan::empty(Arc::from("tank/data"));
        assert!(plan.is_empty());
        assert_eq!(plan.path(), "tank/data");
    }
}
