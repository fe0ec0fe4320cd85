//! The error taxonomy returned by the planner and step engine.
//!
//! # Errors
//!
//! Every fallible public entry point returns `Result<_, ReplicationError>`.
//! `ContractViolation` conditions named in the taxonomy this type implements
//! (step parent-mismatch, a path of length exactly one, an empty destroy
//! batch) are not variants here: they are bugs in the driver, not reportable
//! runtime conditions, so they `panic!` at the call site instead. Nothing in
//! this crate panics on external (endpoint-reported) input.

use replication_endpoint::{EndpointError, EndpointRole};

use crate::version_algebra::ConflictClassification;

/// An error raised while planning or executing a replication.
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// An endpoint call failed at the RPC/transport layer.
    #[error("transport failure talking to the {role} endpoint: {message}")]
    Transport {
        /// Which side of the replication failed.
        role: EndpointRole,
        /// Human-readable detail, prefixed with the operation that failed.
        message: String,
        /// The underlying error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
    /// An endpoint returned a value the protocol forbids.
    #[error("{role} endpoint violated the replication protocol: {message}")]
    ProtocolViolation {
        /// Which side of the replication violated the protocol.
        role: EndpointRole,
        /// Human-readable description of the violation.
        message: String,
    },
    /// An unresolved version conflict; the whole filesystem is skipped.
    #[error("unresolved conflict replicating {path}: {classification}")]
    Conflict {
        /// The filesystem whose plan failed.
        path: String,
        /// The conflict that could not be auto-resolved.
        classification: ConflictClassification,
    },
    /// The receiver's resume token could not be decoded, or decoded to a
    /// value the plan cannot act on. Fatal for that filesystem's plan.
    #[error("malformed resume token for {path}: {reason} (raw: {raw:?})")]
    ResumeTokenMalformed {
        /// The filesystem whose resume token is malformed.
        path: String,
        /// The raw token string that failed to decode.
        raw: String,
        /// Human-readable reason it was rejected.
        reason: String,
    },
    /// A receive failed, sender-side or receiver-side. The receiver is left
    /// holding a resume token for the next attempt.
    #[error("receive failed for {path}: {message}")]
    ReceiveFailed {
        /// The filesystem whose receive failed.
        path: String,
        /// Human-readable detail.
        message: String,
        /// The underlying error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
    /// A batched dry-run size estimate failed. Never returned to a caller;
    /// constructed only to format a warning before estimates are zeroed.
    #[error("size estimate failed for {path}: {message}")]
    SizeEstimateFailed {
        /// The filesystem whose size estimate failed.
        path: String,
        /// Human-readable detail.
        message: String,
    },
    /// The sender side of a filesystem is a placeholder but the receiver
    /// side is not. Fatal for that filesystem.
    #[error("placeholder mismatch for {path}: sender is a placeholder but receiver is not")]
    PlaceholderMismatch {
        /// The filesystem with mismatched placeholder state.
        path: String,
    },
}

impl ReplicationError {
    /// Maps an [`EndpointError`] into the matching core variant, prefixing
    /// the message with `context` (typically the operation being attempted).
    pub fn from_endpoint(context: impl Into<String>, error: EndpointError) -> Self {
        let context = context.into();
        match error {
            EndpointError::Transport { role, message, source } => Self::Transport {
                role,
                message: format!("{context}: {message}"),
                source,
            },
            EndpointError::ProtocolViolation { role, message } => Self::ProtocolViolation {
                role,
                message: format!("{context}: {message}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_endpoint_prefixes_context_onto_transport_message() {
        let error = ReplicationError::from_endpoint(
            "listing sender filesystems",
            EndpointError::transport(EndpointRole::Sender, "connection reset"),
        );
        assert!(error.to_string().contains("listing sender filesystems: connection reset"));
        assert!(matches!(error, ReplicationError::Transport { role: EndpointRole::Sender, .. }));
    }

    #[test]
    fn from_endpoint_maps_protocol_violation() {
        let error = ReplicationError::from_endpoint(
            "tank/data",
            EndpointError::protocol_violation(EndpointRole::Receiver, "missing stream"),
        );
        assert!(matches!(error, ReplicationError::ProtocolViolation { role: EndpointRole::Receiver, .. }));
    }
}
