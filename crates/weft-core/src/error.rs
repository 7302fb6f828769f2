//! Error type reported by coupling engines.
//!
//! Every [`CouplingEngine`](crate::CouplingEngine) operation fails with an
//! [`EngineError`]. Call-ordering mistakes get their own
//! [`EngineError::Protocol`] variant so callers can tell them apart from
//! configuration, addressing, and transport failures.

use std::error::Error;
use std::fmt;

use crate::id::{DataId, MeshId, VertexId};

/// Errors from a coupling engine.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineError {
    /// The configuration file is missing, unreadable, or invalid.
    Config {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// The participant name is not declared in the configuration.
    UnknownParticipant {
        /// The rejected name.
        name: String,
    },
    /// The mesh is not declared or not used by this participant.
    UnknownMesh {
        /// The rejected mesh name.
        name: String,
    },
    /// The data is not defined on the given mesh.
    UnknownData {
        /// The rejected data name.
        name: String,
        /// The mesh the lookup was made against.
        mesh: MeshId,
    },
    /// A mesh ID that was never handed out by this engine.
    InvalidMeshId(MeshId),
    /// A data ID that was never handed out by this engine.
    InvalidDataId(DataId),
    /// A vertex index outside the mesh.
    InvalidVertex {
        /// The offending vertex.
        vertex: VertexId,
        /// Number of vertices in the mesh.
        vertex_count: usize,
    },
    /// A scalar call on vector data, a vector call on scalar data, or
    /// positions that do not divide into the spatial dimension.
    DimensionMismatch {
        /// Name of the data or mesh involved.
        name: String,
        /// The expected number of values per vertex.
        expected: usize,
        /// The number of values per vertex implied by the call.
        actual: usize,
    },
    /// A value buffer length differs from `count(vertices) × width`.
    BufferSize {
        /// The required length.
        expected: usize,
        /// The provided length.
        actual: usize,
    },
    /// The participant tried to write data it only reads, or vice versa.
    AccessDenied {
        /// Name of the data.
        data: String,
        /// The attempted access, `"write"` or `"read"`.
        access: &'static str,
    },
    /// An operation was called out of its allowed order.
    Protocol {
        /// The operation that was rejected.
        operation: &'static str,
        /// Why it was rejected.
        reason: String,
    },
    /// Data received from the peer does not fit the local mesh.
    MeshMismatch {
        /// Name of the exchanged data.
        data: String,
        /// Local value count.
        local: usize,
        /// Received value count.
        remote: usize,
    },
    /// Communication with a peer participant failed.
    Transport {
        /// Description of the failure.
        reason: String,
    },
}

impl EngineError {
    /// Shorthand for a [`EngineError::Protocol`] error.
    pub fn protocol(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Protocol {
            operation,
            reason: reason.into(),
        }
    }

    /// Whether this error reports a call-ordering violation.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { reason } => write!(f, "configuration error: {reason}"),
            Self::UnknownParticipant { name } => {
                write!(f, "participant '{name}' is not defined in the configuration")
            }
            Self::UnknownMesh { name } => write!(f, "mesh '{name}' is not defined"),
            Self::UnknownData { name, mesh } => {
                write!(f, "data '{name}' is not defined on mesh {mesh}")
            }
            Self::InvalidMeshId(id) => write!(f, "invalid mesh id {id}"),
            Self::InvalidDataId(id) => write!(f, "invalid data id {id}"),
            Self::InvalidVertex {
                vertex,
                vertex_count,
            } => write!(
                f,
                "vertex index {vertex} out of range for mesh with {vertex_count} vertices"
            ),
            Self::DimensionMismatch {
                name,
                expected,
                actual,
            } => write!(
                f,
                "'{name}' has {expected} values per vertex, call implies {actual}"
            ),
            Self::BufferSize { expected, actual } => {
                write!(f, "buffer holds {actual} values, expected {expected}")
            }
            Self::AccessDenied { data, access } => {
                write!(f, "participant does not {access} data '{data}'")
            }
            Self::Protocol { operation, reason } => {
                write!(f, "protocol violation in {operation}(): {reason}")
            }
            Self::MeshMismatch {
                data,
                local,
                remote,
            } => write!(
                f,
                "received {remote} values for '{data}', local mesh holds {local}"
            ),
            Self::Transport { reason } => write!(f, "transport error: {reason}"),
        }
    }
}

impl Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_helper_builds_protocol_variant() {
        let e = EngineError::protocol("advance", "not initialized");
        assert!(e.is_protocol());
        assert_eq!(
            e.to_string(),
            "protocol violation in advance(): not initialized"
        );
    }

    #[test]
    fn other_variants_are_not_protocol() {
        assert!(!EngineError::InvalidMeshId(MeshId(1)).is_protocol());
        assert!(!EngineError::BufferSize {
            expected: 3,
            actual: 2
        }
        .is_protocol());
    }
}
