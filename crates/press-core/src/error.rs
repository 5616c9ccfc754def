//! Console errors.

#![allow(missing_docs)]

use smol_str::SmolStr;
use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors raised by the signal, connection and mold layers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    /// Bridge call failed or was rejected by the host.
    #[error("bridge error '{0}'")]
    Bridge(SmolStr),

    /// No bridge handle is attached yet.
    #[error("bridge unavailable")]
    BridgeUnavailable,

    /// Mold/job data service failure.
    #[error("service error '{0}'")]
    Service(SmolStr),

    /// Configuration error.
    #[error("invalid config '{0}'")]
    InvalidConfig(SmolStr),

    /// A required signal is missing from the bridge configuration.
    #[error("signal configuration missing: '{0}'")]
    SignalNotConfigured(SmolStr),

    /// Handshake write was not acknowledged within the retry bound.
    #[error("handshake failed after {attempts} attempts")]
    HandshakeExhausted { attempts: u32 },

    /// Requested connection state change is not allowed from the current state.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    /// Payload encoding failure.
    #[error("serialization error '{0}'")]
    Serialization(SmolStr),

    /// Unlock requested without any mould code.
    #[error("no mould code given")]
    EmptyMouldCodes,
}

impl ConsoleError {
    /// Number of retries spent before the error, when the error came from a
    /// retrying operation.
    #[must_use]
    pub fn retry_count(&self) -> Option<u32> {
        match self {
            Self::HandshakeExhausted { attempts } => Some(*attempts),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConsoleError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string().into())
    }
}

/// Reasons a mold candidate cannot be locked. `Display` is the operator-facing
/// message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoldValidationError {
    #[error("select a mold first")]
    NoSelection,

    #[error("{limit} molds are already locked on this device, the limit is reached")]
    CapacityReached { limit: usize },

    #[error("mold [{mould_code}] is already locked on this device")]
    AlreadyLocked { mould_code: SmolStr },

    #[error("make-order number and craft are required")]
    MissingOrderOrCraft,

    #[error("cross-project operation is forbidden, the device is working on project [{active_project}]")]
    CrossProject { active_project: SmolStr },
}

/// Failure of a lock confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// Rejected locally; no request was sent.
    #[error(transparent)]
    Validation(#[from] MoldValidationError),

    /// The lock request itself failed. Details were already reported by the
    /// service layer.
    #[error("lock request failed")]
    Request,
}

/// First missing field of a job selection. `Display` is the operator-facing
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JobSelectionError {
    #[error("select a team first")]
    MissingTeam,

    #[error("select an operator first")]
    MissingOperator,

    #[error("select a process first")]
    MissingProcess,
}
