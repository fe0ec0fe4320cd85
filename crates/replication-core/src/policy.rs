//! The policy knobs visible to the planner and step engine.

use std::num::NonZeroUsize;

use replication_endpoint::ReplicationOptions;

use crate::conflict_resolver::InitialReplicationPolicy;

const fn one() -> NonZeroUsize {
    NonZeroUsize::new(1).expect("1 is non-zero")
}

/// Aggregates every policy knob the core consumes. YAML parsing and any
/// other configuration surface that produces one of these belongs to the
/// embedding program, not to this crate.
#[derive(Clone, Debug)]
pub struct ReplicationPolicy {
    conflict_resolution: InitialReplicationPolicy,
    one_step: bool,
    filesystem_concurrency: NonZeroUsize,
    size_estimation_concurrency: NonZeroUsize,
    replication_options: ReplicationOptions,
}

impl ReplicationPolicy {
    /// Builds a policy with the given conflict-resolution behavior and the
    /// defaults for every other knob.
    #[must_use]
    pub fn new(conflict_resolution: InitialReplicationPolicy) -> Self {
        Self {
            conflict_resolution,
            ..Self::default()
        }
    }

    /// Sets whether multi-step plans collapse to a single send, returning
    /// the updated policy.
    #[must_use]
    pub const fn with_one_step(mut self, one_step: bool) -> Self {
        self.one_step = one_step;
        self
    }

    /// Sets how many filesystem plans may execute concurrently, returning
    /// the updated policy.
    #[must_use]
    pub const fn with_filesystem_concurrency(mut self, concurrency: NonZeroUsize) -> Self {
        self.filesystem_concurrency = concurrency;
        self
    }

    /// Sets the internal fan-out bound for batched dry-run size estimation,
    /// returning the updated policy.
    #[must_use]
    pub const fn with_size_estimation_concurrency(mut self, concurrency: NonZeroUsize) -> Self {
        self.size_estimation_concurrency = concurrency;
        self
    }

    /// Sets the opaque options forwarded to both endpoints, returning the
    /// updated policy.
    #[must_use]
    pub fn with_replication_options(mut self, options: ReplicationOptions) -> Self {
        self.replication_options = options;
        self
    }

    /// Returns the policy consulted when initial replication hits a
    /// `NoCommonAncestor` conflict against an empty receiver.
    #[must_use]
    pub const fn conflict_resolution(&self) -> InitialReplicationPolicy {
        self.conflict_resolution
    }

    /// Reports whether multi-step plans should collapse to a single send.
    #[must_use]
    pub const fn one_step(&self) -> bool {
        self.one_step
    }

    /// Returns the maximum number of filesystem plans that may execute
    /// concurrently.
    #[must_use]
    pub const fn filesystem_concurrency(&self) -> NonZeroUsize {
        self.filesystem_concurrency
    }

    /// Returns the internal fan-out bound for batched dry-run size
    /// estimation.
    #[must_use]
    pub const fn size_estimation_concurrency(&self) -> NonZeroUsize {
        self.size_estimation_concurrency
    }

    /// Returns the opaque options forwarded to both endpoints inside every
    /// request.
    #[must_use]
    pub const fn replication_options(&self) -> &ReplicationOptions {
        &self.replication_options
    }
}

impl Default for ReplicationPolicy {
    /// `filesystem_concurrency` defaults to 1, for strict cross-filesystem
    /// ordering; implementations may raise it.
    fn default() -> Self {
        Self {
            conflict_resolution: InitialReplicationPolicy::default(),
            one_step: false,
            filesystem_concurrency: one(),
            size_estimation_concurrency: one(),
            replication_options: ReplicationOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filesystem_concurrency_is_one() {
        let policy = ReplicationPolicy::default();
        assert_eq!(policy.filesystem_concurrency().get(), 1);
        assert!(!policy.one_step());
    }

    #[test]
    fn builder_methods_compose() {
        let policy = ReplicationPolicy::new(InitialReplicationPolicy::All)
            .with_one_step(true)
            .with_filesystem_concurrency(NonZeroUsize::new(4).unwrap());
        assert_eq!(policy.conflict_resolution(), InitialReplicationPolicy::All);
        assert!(policy.one_step());
        assert_eq!(policy.filesystem_concurrency().get(), 4);
    }
}
