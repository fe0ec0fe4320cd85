//! The error type returned by every endpoint trait method.

use std::fmt;

/// Error returned by a [`Sender`](crate::traits::Sender) or
/// [`Receiver`](crate::traits::Receiver) call.
///
/// This is deliberately narrow: `replication-core`'s error taxonomy draws
/// the finer distinctions (`Conflict`, `ResumeTokenMalformed`, …) from
/// context, not from the endpoint. An endpoint only ever reports that the
/// call failed at the transport layer, or that it returned something the
/// protocol forbids.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// The call failed at the RPC/transport layer: connectivity, timeout,
    /// serialization. Carries the role the failing endpoint played, for
    /// diagnostics.
    #[error("{role} endpoint transport failure: {message}")]
    Transport {
        /// Which side of the replication failed.
        role: EndpointRole,
        /// Human-readable detail from the transport layer.
        message: String,
        /// The underlying I/O or RPC error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
    /// The endpoint returned a value the protocol forbids, e.g. a `nil`
    /// stream for a non-dry-run send.
    #[error("{role} endpoint violated the protocol: {message}")]
    ProtocolViolation {
        /// Which side of the replication violated the protocol.
        role: EndpointRole,
        /// Human-readable description of the violation.
        message: String,
    },
}

impl EndpointError {
    /// Builds a transport failure with no underlying source error.
    #[must_use]
    pub fn transport(role: EndpointRole, message: impl Into<String>) -> Self {
        Self::Transport {
            role,
            message: message.into(),
            source: None,
        }
    }

    /// Builds a transport failure wrapping an underlying error.
    pub fn transport_with_source(
        role: EndpointRole,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            role,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Builds a protocol violation error.
    #[must_use]
    pub fn protocol_violation(role: EndpointRole, message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            role,
            message: message.into(),
        }
    }

    /// Returns the endpoint role associated with this error.
    #[must_use]
    pub const fn role(&self) -> EndpointRole {
        match self {
            Self::Transport { role, .. } | Self::ProtocolViolation { role, .. } => *role,
        }
    }
}

/// Which side of a replication an [`EndpointError`] originated from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EndpointRole {
    /// The sender endpoint.
    Sender,
    /// The receiver endpoint.
    Receiver,
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sender => "sender",
            Self::Receiver => "receiver",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_reports_role() {
        let error = EndpointError::transport(EndpointRole::Sender, "connection reset");
        assert_eq!(error.role(), EndpointRole::Sender);
        assert!(error.to_string().contains("sender endpoint transport failure"));
    }

    #[test]
    fn protocol_violation_reports_role_and_message() {
        let error = EndpointError::protocol_violation(EndpointRole::Receiver, "missing stream");
        assert_eq!(error.role(), EndpointRole::Receiver);
        assert!(error.to_string().contains("missing stream"));
    }
}
