//! Driver error type.

use std::error::Error;
use std::fmt;

use weft_core::EngineError;

use crate::solver::SolverError;
use crate::state::ProtocolState;

/// Errors from [`Participant`](crate::Participant), [`RoleTable`](crate::RoleTable),
/// and [`Session`](crate::Session).
#[derive(Debug, PartialEq)]
pub enum DriverError {
    /// A call was made outside the states in which it is allowed, or
    /// before a prerequisite call. The engine was not called.
    ProtocolViolation {
        /// The rejected operation.
        operation: &'static str,
        /// The participant state at the time of the call.
        state: ProtocolState,
        /// What was missing.
        reason: String,
    },
    /// The participant name has no role in the configuration.
    UnknownParticipant {
        /// The rejected name.
        name: String,
    },
    /// The mesh is not used by the participant or was never registered.
    UnknownMesh {
        /// The rejected mesh name or id.
        name: String,
    },
    /// The data was never registered with the driver.
    UnknownData {
        /// The rejected data name or id.
        name: String,
    },
    /// A value buffer does not hold `count(vertices) × width` values.
    BufferSize {
        /// Name of the data involved.
        data: String,
        /// The required length.
        expected: usize,
        /// The provided length.
        actual: usize,
    },
    /// An argument is malformed (non-finite step, wrong coordinate count,
    /// out-of-range vertex, wrong access).
    InvalidArgument {
        /// Description of the problem.
        reason: String,
    },
    /// The role table could not be read.
    Config {
        /// Description of the problem.
        reason: String,
    },
    /// The solver failed.
    Solver(SolverError),
    /// The engine rejected a call.
    Engine(EngineError),
}

impl DriverError {
    /// Whether this error reports a call-ordering violation, detected
    /// either by the driver or by the engine.
    pub fn is_protocol_violation(&self) -> bool {
        match self {
            Self::ProtocolViolation { .. } => true,
            Self::Engine(e) => e.is_protocol(),
            _ => false,
        }
    }

    pub(crate) fn violation(
        operation: &'static str,
        state: ProtocolState,
        reason: impl Into<String>,
    ) -> Self {
        Self::ProtocolViolation {
            operation,
            state,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProtocolViolation {
                operation,
                state,
                reason,
            } => write!(
                f,
                "protocol violation: {operation}() in state {state}: {reason}"
            ),
            Self::UnknownParticipant { name } => {
                write!(f, "unknown participant '{name}'")
            }
            Self::UnknownMesh { name } => write!(f, "unknown mesh '{name}'"),
            Self::UnknownData { name } => write!(f, "unknown data '{name}'"),
            Self::BufferSize {
                data,
                expected,
                actual,
            } => write!(
                f,
                "buffer for '{data}' holds {actual} values, expected {expected}"
            ),
            Self::InvalidArgument { reason } => write!(f, "invalid argument: {reason}"),
            Self::Config { reason } => write!(f, "configuration error: {reason}"),
            Self::Solver(e) => write!(f, "solver error: {e}"),
            Self::Engine(e) => write!(f, "engine error: {e}"),
        }
    }
}

impl Error for DriverError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Solver(e) => Some(e),
            Self::Engine(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EngineError> for DriverError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::UnknownParticipant { name } => Self::UnknownParticipant { name },
            EngineError::UnknownMesh { name } => Self::UnknownMesh { name },
            EngineError::UnknownData { name, .. } => Self::UnknownData { name },
            other => Self::Engine(other),
        }
    }
}

impl From<SolverError> for DriverError {
    fn from(e: SolverError) -> Self {
        Self::Solver(e)
    }
}
