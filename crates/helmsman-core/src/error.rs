//! Error types for control-plane operations.
//!
//! One error enum covers the failure modes that cross crate boundaries and
//! converts to [`tonic::Status`] for gRPC responses. Local conditions (ACKs,
//! NACKs, generator warnings) are not errors; they are logged and counted
//! where they occur.

use std::time::Duration;

/// Shared error type for helmsman operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A node id that does not follow the `type~ip~id~domain` format.
    #[error("invalid node id {id:?}: {reason}")]
    InvalidNodeId {
        /// The offending node id.
        id: String,
        /// Why parsing failed.
        reason: String,
    },

    /// The first request of a stream did not carry a node identity.
    #[error("first request missing node identity")]
    MissingNode,

    /// The service registry adapter failed to answer a query.
    #[error("registry error: {message}")]
    Registry {
        /// Description of the failure.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A generated listener mixed HTTP and TCP filters in one chain.
    #[error("invalid listener {name:?}: {reason}")]
    InvalidListener {
        /// Listener name.
        name: String,
        /// Why the listener is invalid.
        reason: String,
    },

    /// A response send did not complete within the watchdog window.
    #[error("send timed out after {0:?}")]
    SendTimeout(Duration),

    /// The underlying transport failed.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },

    /// The client closed its side of the stream.
    #[error("stream closed: {reason}")]
    StreamClosed {
        /// How the closure was observed.
        reason: String,
    },
}

/// Result alias using the shared [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a registry error from any error type.
    pub fn registry<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Registry {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a registry error with a message only.
    pub fn registry_msg(message: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error from a gRPC status.
    pub fn transport(status: &tonic::Status) -> Self {
        Self::Transport {
            message: status.to_string(),
        }
    }

    /// Map to the gRPC status reported to the client.
    pub fn to_status(&self) -> tonic::Status {
        match self {
            Error::InvalidNodeId { .. } | Error::MissingNode => {
                tonic::Status::invalid_argument(self.to_string())
            }
            Error::Registry { .. } | Error::InvalidListener { .. } => {
                tonic::Status::internal(self.to_string())
            }
            Error::SendTimeout(_) => tonic::Status::deadline_exceeded(self.to_string()),
            Error::Transport { .. } | Error::StreamClosed { .. } => {
                tonic::Status::unavailable(self.to_string())
            }
        }
    }
}

impl From<Error> for tonic::Status {
    fn from(err: Error) -> Self {
        err.to_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_error_maps_to_invalid_argument() {
        let err = Error::InvalidNodeId {
            id: "garbage".to_string(),
            reason: "expected 4 '~' separated fields".to_string(),
        };
        let status: tonic::Status = err.into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[test]
    fn send_timeout_maps_to_deadline_exceeded() {
        let status: tonic::Status = Error::SendTimeout(Duration::from_secs(5)).into();
        assert_eq!(status.code(), tonic::Code::DeadlineExceeded);
    }

    #[test]
    fn registry_error_chains_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "backend down");
        let err = Error::registry("listing services", io_err);
        assert!(err.to_string().contains("listing services"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
