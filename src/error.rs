//! Error types for pmp-ipc.
//!
//! [`PmpError`] is what the public API returns. [`BindError`] and
//! [`RemoteError`] are the structured kinds produced below the command layer;
//! both are `Clone` so one failed bind can be reported to every command that
//! was waiting on it.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all pmp-ipc operations.
#[derive(Debug, Error)]
pub enum PmpError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Protocol error (invalid frame, wrong flags, unexpected handshake).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Malformed command or manager input, rejected before submission.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The handler's `prepare` hook declined to continue.
    #[error("IPC aborted during prepare")]
    AbortRequested,

    /// The destination could not be bound, or was lost mid-call.
    #[error("Binding failed: {0}")]
    BindingFailed(#[from] BindError),

    /// The command deadline elapsed before the remote side answered.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The remote side answered with a business-level refusal.
    #[error("Domain failure: {0}")]
    DomainFailure(String),

    /// A worker task panicked or was cancelled by the runtime.
    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Failure to obtain (or keep) a binding to a destination.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// No service is installed for the descriptor.
    #[error("no service installed for {0}")]
    NotInstalled(String),

    /// The platform refused the bind, or the endpoint is not what we asked for.
    #[error("bind rejected: {0}")]
    Rejected(String),

    /// The endpoint could not be reached.
    #[error("destination unreachable: {0}")]
    Unreachable(String),

    /// The endpoint went away while a command was executing on it.
    #[error("connection lost: {0}")]
    Lost(String),

    /// The task performing the bind ended without reporting a result.
    #[error("bind attempt abandoned")]
    Abandoned,
}

/// Transport-level failure of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The remote endpoint closed the connection.
    #[error("remote endpoint disconnected")]
    Disconnected,

    /// The bound facade does not expose the interface the command needs.
    #[error("bound endpoint exposes {found}, expected {expected}")]
    WrongInterface {
        /// Interface the command expected.
        expected: &'static str,
        /// Interface the binding actually exposes.
        found: &'static str,
    },

    /// The transport failed while sending or receiving.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote implementation raised an error.
    #[error("remote call failed: {0}")]
    Remote(String),

    /// Request or reply could not be encoded/decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl RemoteError {
    /// Whether the binding this error came from can no longer be used.
    pub fn invalidates_binding(&self) -> bool {
        matches!(
            self,
            RemoteError::Disconnected
                | RemoteError::Transport(_)
                | RemoteError::WrongInterface { .. }
        )
    }
}

impl From<RemoteError> for BindError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::WrongInterface { .. } => BindError::Rejected(err.to_string()),
            other => BindError::Lost(other.to_string()),
        }
    }
}

/// Result type alias using PmpError.
pub type Result<T> = std::result::Result<T, PmpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_interface_maps_to_rejected() {
        let err = RemoteError::WrongInterface {
            expected: "pmp",
            found: "app",
        };
        assert!(err.invalidates_binding());
        assert!(matches!(BindError::from(err), BindError::Rejected(_)));
    }

    #[test]
    fn test_remote_failure_keeps_binding() {
        let err = RemoteError::Remote("boom".to_string());
        assert!(!err.invalidates_binding());
        assert_eq!(
            BindError::from(err),
            BindError::Lost("remote call failed: boom".to_string())
        );
    }

    #[test]
    fn test_bind_error_converts_into_pmp_error() {
        let err: PmpError = BindError::NotInstalled("pmp".to_string()).into();
        assert!(matches!(err, PmpError::BindingFailed(_)));
        assert_eq!(
            err.to_string(),
            "Binding failed: no service installed for pmp"
        );
    }
}
