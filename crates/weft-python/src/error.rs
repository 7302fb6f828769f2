//! DriverError -> Python exception mapping.

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::PyErr;
use weft_core::EngineError;
use weft_driver::DriverError;

/// Which Python exception class an error surfaces as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ErrorClass {
    /// Caller input: configuration, names, buffer shapes.
    Value,
    /// Call order, engine, and transport failures.
    Runtime,
}

pub(crate) fn classify(err: &DriverError) -> ErrorClass {
    match err {
        DriverError::Config { .. }
        | DriverError::UnknownParticipant { .. }
        | DriverError::UnknownMesh { .. }
        | DriverError::UnknownData { .. }
        | DriverError::BufferSize { .. }
        | DriverError::InvalidArgument { .. } => ErrorClass::Value,
        DriverError::Engine(e) => match e {
            EngineError::Config { .. }
            | EngineError::InvalidMeshId(_)
            | EngineError::InvalidDataId(_)
            | EngineError::InvalidVertex { .. }
            | EngineError::DimensionMismatch { .. }
            | EngineError::BufferSize { .. } => ErrorClass::Value,
            _ => ErrorClass::Runtime,
        },
        DriverError::ProtocolViolation { .. } | DriverError::Solver(_) => ErrorClass::Runtime,
    }
}

/// Convert a driver error into a typed Python exception.
pub(crate) fn to_py(err: DriverError) -> PyErr {
    let message = format!("weft: {err}");
    match classify(&err) {
        ErrorClass::Value => PyValueError::new_err(message),
        ErrorClass::Runtime => PyRuntimeError::new_err(message),
    }
}

/// A `Mutex` guarding a participant was poisoned by a panic.
pub(crate) fn poisoned() -> PyErr {
    PyRuntimeError::new_err("weft: participant state is unusable after an earlier panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_driver::ProtocolState;

    #[test]
    fn caller_mistakes_are_value_errors() {
        let errs = [
            DriverError::UnknownParticipant {
                name: "SolverThree".into(),
            },
            DriverError::BufferSize {
                data: "Forces".into(),
                expected: 3,
                actual: 2,
            },
            DriverError::Config {
                reason: "missing".into(),
            },
        ];
        for e in &errs {
            assert_eq!(classify(e), ErrorClass::Value, "{e}");
        }
    }

    #[test]
    fn protocol_and_transport_are_runtime_errors() {
        let violation = DriverError::ProtocolViolation {
            operation: "advance",
            state: ProtocolState::Stepping,
            reason: "Forces not written".into(),
        };
        assert_eq!(classify(&violation), ErrorClass::Runtime);
        let engine = DriverError::Engine(EngineError::protocol("advance", "coupling is over"));
        assert_eq!(classify(&engine), ErrorClass::Runtime);
    }
}
