//! `ActionKind`: the Python face of [`weft_core::Action`].

use pyo3::prelude::*;
use weft_core::Action;

/// Coupling action a solver must perform and then report as fulfilled.
#[pyclass(eq, eq_int, from_py_object)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ActionKind {
    WriteInitialData = 0,
    WriteIterationCheckpoint = 1,
    ReadIterationCheckpoint = 2,
}

#[pymethods]
impl ActionKind {
    /// Stable kebab-case name, as used in logs.
    fn __str__(&self) -> &'static str {
        Action::from(*self).as_str()
    }
}

impl From<ActionKind> for Action {
    fn from(kind: ActionKind) -> Self {
        match kind {
            ActionKind::WriteInitialData => Action::WriteInitialData,
            ActionKind::WriteIterationCheckpoint => Action::WriteIterationCheckpoint,
            ActionKind::ReadIterationCheckpoint => Action::ReadIterationCheckpoint,
        }
    }
}
