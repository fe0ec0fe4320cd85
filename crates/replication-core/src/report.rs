//! Read-only snapshots of in-flight and completed replication progress.

/// Snapshot of one step's progress, read out of a live [`crate::step::Step`]
/// without disturbing the executing task.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct StepReport {
    from_name: Option<String>,
    to_name: String,
    bytes_expected: u64,
    bytes_replicated: u64,
    resumed: bool,
}

impl StepReport {
    /// Builds a step report from already-extracted values.
    #[must_use]
    pub fn new(from_name: Option<String>, to_name: String, bytes_expected: u64, bytes_replicated: u64, resumed: bool) -> Self {
        Self {
            from_name,
            to_name,
            bytes_expected,
            bytes_replicated,
            resumed,
        }
    }

    /// Returns the base version's short name, absent for an initial send.
    #[must_use]
    pub fn from_name(&self) -> Option<&str> {
        self.from_name.as_deref()
    }

    /// Returns the target version's short name.
    #[must_use]
    pub fn to_name(&self) -> &str {
        &self.to_name
    }

    /// Returns the expected size in bytes, zero if unestimated.
    #[must_use]
    pub const fn bytes_expected(&self) -> u64 {
        self.bytes_expected
    }

    /// Returns the bytes replicated so far for this step.
    #[must_use]
    pub const fn bytes_replicated(&self) -> u64 {
        self.bytes_replicated
    }

    /// Reports whether this step resumed a previously interrupted receive.
    #[must_use]
    pub const fn resumed(&self) -> bool {
        self.resumed
    }
}

/// The current state of one filesystem's replication within an attempt.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum FilesystemStatus {
    /// Planned but not yet started.
    Pending,
    /// Currently executing steps.
    Running,
    /// Finished with no error; may have had an empty plan.
    Done,
    /// Failed with a machine-classifiable error kind and a human string.
    Failed {
        /// Short, machine-classifiable label, e.g. `"conflict"` or
        /// `"resume_token_malformed"`.
        kind: &'static str,
        /// Human-readable detail.
        message: String,
    },
}

/// Snapshot of one filesystem's replication progress.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct FilesystemReport {
    path: String,
    status: FilesystemStatus,
    steps: Vec<StepReport>,
}

impl FilesystemReport {
    /// Builds a filesystem report.
    #[must_use]
    pub fn new(path: impl Into<String>, status: FilesystemStatus, steps: Vec<StepReport>) -> Self {
        Self {
            path: path.into(),
            status,
            steps,
        }
    }

    /// Returns the filesystem path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the filesystem's current status.
    #[must_use]
    pub const fn status(&self) -> &FilesystemStatus {
        &self.status
    }

    /// Returns the per-step progress snapshots, in execution order.
    #[must_use]
    pub fn steps(&self) -> &[StepReport] {
        &self.steps
    }

    /// Returns the total bytes replicated across all steps so far.
    #[must_use]
    pub fn bytes_replicated(&self) -> u64 {
        self.steps.iter().map(StepReport::bytes_replicated).sum()
    }
}

/// Top-level snapshot of a replication attempt, aggregating one
/// [`FilesystemReport`] per paired filesystem.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct ReplicationReport {
    filesystems: Vec<FilesystemReport>,
}

impl ReplicationReport {
    /// Builds a report from per-filesystem snapshots.
    #[must_use]
    pub fn new(filesystems: Vec<FilesystemReport>) -> Self {
        Self { filesystems }
    }

    /// Returns the per-filesystem snapshots.
    #[must_use]
    pub fn filesystems(&self) -> &[FilesystemReport] {
        &self.filesystems
    }

    /// Returns the filesystems whose status is [`FilesystemStatus::Failed`].
    #[must_use]
    pub fn failed(&self) -> impl Iterator<Item = &FilesystemReport> {
        self.filesystems
            .iter()
            .filter(|report| matches!(report.status(), FilesystemStatus::Failed { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_replicated_sums_across_steps() {
        let report = FilesystemReport::new(
            "tank/data",
            FilesystemStatus::Done,
            vec![
                StepReport::new(None, "a".to_string(), 100, 100, false),
                StepReport::new(Some("a".to_string()), "b".to_string(), 200, 150, false),
            ],
        );
        assert_eq!(report.bytes_replicated(), 250);
    }

    #[test]
    fn failed_filters_by_status() {
        let report = ReplicationReport::new(vec![
            FilesystemReport::new("tank/ok", FilesystemStatus::Done, Vec::new()),
            FilesystemReport::new(
                "tank/bad",
                FilesystemStatus::Failed {
                    kind: "conflict",
                    message: "diverged".to_string(),
                },
                Vec::new(),
            ),
        ]);
        let failed: Vec<_> = report.failed().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].path(), "tank/bad");
    }
}
