//! SolverInterface: Python wrapper around a driver [`Participant`].
//!
//! The calls that may wait on the peer (`initialize`, `initialize_data`,
//! `advance`, `finalize`) release the GIL via `py.detach()`. All other
//! calls keep the GIL and only `try_lock` the participant, so a second
//! Python thread touching the same interface during a blocking call gets
//! an exception instead of a GIL/mutex deadlock.

use std::path::PathBuf;
use std::sync::{Mutex, TryLockError};

use numpy::{PyArray1, PyArray2, PyArrayMethods, PyReadonlyArray2, PyReadonlyArrayDyn};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use weft_core::{DataId, MeshId, ParticipantInfo, Position, VertexId};
use weft_driver::{DataAccess, DriverError, Participant, Role, RoleTable};
use weft_engine::LocalEngine;

use crate::action::ActionKind;
use crate::error::{poisoned, to_py};

struct Inner {
    participant: Participant<LocalEngine>,
    role: Option<Role>,
}

/// One coupling participant.
///
/// Mirrors the driver call sequence: `configure`, mesh and data setup,
/// `initialize`, optional initial data, `initialize_data`, the
/// `advance` loop, and `finalize`. Out-of-order calls raise
/// `RuntimeError`; bad names and buffer sizes raise `ValueError`.
#[pyclass]
pub(crate) struct SolverInterface {
    name: String,
    inner: Mutex<Inner>,
}

impl SolverInterface {
    fn with<T>(&self, f: impl FnOnce(&mut Inner) -> Result<T, DriverError>) -> PyResult<T> {
        let mut inner = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(_)) => return Err(poisoned()),
            Err(TryLockError::WouldBlock) => {
                return Err(PyRuntimeError::new_err(format!(
                    "weft: another call on participant '{}' is still running",
                    self.name
                )))
            }
        };
        f(&mut inner).map_err(to_py)
    }

    fn detached<T, F>(&self, py: Python<'_>, f: F) -> PyResult<T>
    where
        T: Send,
        F: FnOnce(&mut Inner) -> Result<T, DriverError> + Send,
    {
        py.detach(|| {
            let mut inner = self.inner.lock().map_err(|_| poisoned())?;
            f(&mut inner).map_err(to_py)
        })
    }
}

fn to_vertices(ids: &[u32]) -> Vec<VertexId> {
    ids.iter().copied().map(VertexId).collect()
}

fn access_of(role: &Role, data: &str) -> Result<DataAccess, DriverError> {
    if role.writes.iter().any(|f| f.name == data) {
        Ok(DataAccess::Write)
    } else if role.reads.iter().any(|f| f.name == data) {
        Ok(DataAccess::Read)
    } else {
        Err(DriverError::UnknownData {
            name: data.to_string(),
        })
    }
}

fn contiguous<'a>(values: &'a PyReadonlyArrayDyn<'_, f64>) -> PyResult<&'a [f64]> {
    values
        .as_slice()
        .map_err(|_| PyValueError::new_err("weft: value array must be C-contiguous float64"))
}

#[pymethods]
impl SolverInterface {
    /// Create a participant.
    ///
    /// Args:
    ///     participant_name: Name as declared in the coupling configuration.
    ///     rank: Rank of this process within the participant (default 0).
    ///     size: Process count of the participant (default 1).
    #[new]
    #[pyo3(signature = (participant_name, rank=0, size=1))]
    fn new(participant_name: String, rank: u32, size: u32) -> PyResult<Self> {
        let info = ParticipantInfo::new(participant_name.as_str(), rank, size)
            .map_err(|e| to_py(e.into()))?;
        Ok(Self {
            inner: Mutex::new(Inner {
                participant: Participant::new(participant_name.as_str(), LocalEngine::new(info)),
                role: None,
            }),
            name: participant_name,
        })
    }

    /// Load the coupling configuration.
    ///
    /// The participant's role is looked up before the engine is touched, so
    /// an undeclared participant raises `ValueError` without side effects.
    fn configure(&self, config_path: PathBuf) -> PyResult<()> {
        self.with(|inner| {
            let roles = RoleTable::from_path(&config_path)?;
            let role = roles.role(inner.participant.name())?.clone();
            inner.participant.configure(&config_path)?;
            inner.role = Some(role);
            Ok(())
        })
    }

    /// Spatial dimension of the coupling (0 before `configure`).
    fn get_dimensions(&self) -> PyResult<usize> {
        self.with(|inner| Ok(inner.participant.dimensions()))
    }

    /// Id of a mesh provided by this participant.
    fn get_mesh_id(&self, mesh_name: &str) -> PyResult<u32> {
        self.with(|inner| inner.participant.register_mesh(mesh_name).map(|m| m.0))
    }

    /// Add vertices to a mesh.
    ///
    /// Args:
    ///     mesh_id: Id from `get_mesh_id`.
    ///     positions: float64 array of shape `(n, dimensions)`.
    ///
    /// Returns:
    ///     uint32 array of the `n` new vertex ids.
    fn set_mesh_vertices<'py>(
        &self,
        py: Python<'py>,
        mesh_id: u32,
        positions: PyReadonlyArray2<'py, f64>,
    ) -> PyResult<Bound<'py, PyArray1<u32>>> {
        let points: Vec<Position> = positions
            .as_array()
            .rows()
            .into_iter()
            .map(|row| row.iter().copied().collect())
            .collect();
        let ids = self.with(|inner| inner.participant.set_vertices(MeshId(mesh_id), &points))?;
        let raw: Vec<u32> = ids.into_iter().map(|v| v.0).collect();
        Ok(PyArray1::from_vec(py, raw))
    }

    /// Number of vertices set on a mesh.
    fn get_mesh_vertex_size(&self, mesh_id: u32) -> PyResult<usize> {
        self.with(|inner| inner.participant.mesh_vertex_count(MeshId(mesh_id)))
    }

    /// Positions of the given vertices as a `(n, dimensions)` array.
    fn get_mesh_vertices<'py>(
        &self,
        py: Python<'py>,
        mesh_id: u32,
        vertex_ids: Vec<u32>,
    ) -> PyResult<Bound<'py, PyArray2<f64>>> {
        let ids = to_vertices(&vertex_ids);
        let (out, dims) = self.with(|inner| {
            let dims = inner.participant.dimensions();
            let mut out = vec![0.0; ids.len() * dims];
            inner
                .participant
                .mesh_vertices(MeshId(mesh_id), &ids, &mut out)?;
            Ok((out, dims))
        })?;
        PyArray1::from_vec(py, out).reshape([ids.len(), dims])
    }

    /// Id of a data field on a mesh. Whether the participant writes or reads
    /// it comes from the configuration.
    fn get_data_id(&self, data_name: &str, mesh_id: u32) -> PyResult<u32> {
        self.with(|inner| {
            let access = match &inner.role {
                Some(role) => access_of(role, data_name)?,
                // Not configured yet; the driver rejects the call either way.
                None => DataAccess::Read,
            };
            inner
                .participant
                .register_data(data_name, MeshId(mesh_id), access)
                .map(|d| d.0)
        })
    }

    /// Connect to the peer and set up the first window. Returns the maximum
    /// allowed time step. Releases the GIL.
    fn initialize(&self, py: Python<'_>) -> PyResult<f64> {
        self.detached(py, |inner| inner.participant.initialize())
    }

    /// Exchange initial data. Releases the GIL.
    fn initialize_data(&self, py: Python<'_>) -> PyResult<()> {
        self.detached(py, |inner| inner.participant.initialize_data())
    }

    /// Whether the engine asks for `action` now.
    fn is_action_required(&self, action: ActionKind) -> PyResult<bool> {
        self.with(|inner| inner.participant.is_action_required(action.into()))
    }

    /// Report a required action as done.
    fn fulfilled_action(&self, action: ActionKind) -> PyResult<()> {
        self.with(|inner| inner.participant.fulfilled_action(action.into()))
    }

    /// Whether the time-stepping loop should continue.
    fn is_coupling_ongoing(&self) -> PyResult<bool> {
        self.with(|inner| inner.participant.is_coupling_ongoing())
    }

    /// Whether new data arrived with the last exchange.
    fn is_read_data_available(&self) -> PyResult<bool> {
        self.with(|inner| inner.participant.is_read_data_available())
    }

    /// Whether the last `advance` completed a time window.
    fn is_time_window_complete(&self) -> PyResult<bool> {
        self.with(|inner| inner.participant.is_time_window_complete())
    }

    /// Write `dimensions` values per vertex, flattened or shaped
    /// `(n, dimensions)`.
    fn write_block_vector_data(
        &self,
        data_id: u32,
        vertex_ids: Vec<u32>,
        values: PyReadonlyArrayDyn<'_, f64>,
    ) -> PyResult<()> {
        let slice = contiguous(&values)?;
        let ids = to_vertices(&vertex_ids);
        self.with(|inner| {
            inner
                .participant
                .write_block_vector_data(DataId(data_id), &ids, slice)
        })
    }

    /// Read `dimensions` values per vertex into a new `(n, dimensions)`
    /// array.
    fn read_block_vector_data<'py>(
        &self,
        py: Python<'py>,
        data_id: u32,
        vertex_ids: Vec<u32>,
    ) -> PyResult<Bound<'py, PyArray2<f64>>> {
        let ids = to_vertices(&vertex_ids);
        let (out, dims) = self.with(|inner| {
            let dims = inner.participant.dimensions();
            let mut out = vec![0.0; ids.len() * dims];
            inner
                .participant
                .read_block_vector_data(DataId(data_id), &ids, &mut out)?;
            Ok((out, dims))
        })?;
        PyArray1::from_vec(py, out).reshape([ids.len(), dims])
    }

    /// Write one value per vertex.
    fn write_block_scalar_data(
        &self,
        data_id: u32,
        vertex_ids: Vec<u32>,
        values: PyReadonlyArrayDyn<'_, f64>,
    ) -> PyResult<()> {
        let slice = contiguous(&values)?;
        let ids = to_vertices(&vertex_ids);
        self.with(|inner| {
            inner
                .participant
                .write_block_scalar_data(DataId(data_id), &ids, slice)
        })
    }

    /// Read one value per vertex into a new 1-D array.
    fn read_block_scalar_data<'py>(
        &self,
        py: Python<'py>,
        data_id: u32,
        vertex_ids: Vec<u32>,
    ) -> PyResult<Bound<'py, PyArray1<f64>>> {
        let ids = to_vertices(&vertex_ids);
        let out = self.with(|inner| {
            let mut out = vec![0.0; ids.len()];
            inner
                .participant
                .read_block_scalar_data(DataId(data_id), &ids, &mut out)?;
            Ok(out)
        })?;
        Ok(PyArray1::from_vec(py, out))
    }

    /// Advance by `dt` and exchange data when a window completes. Returns
    /// the maximum allowed next time step. Releases the GIL.
    fn advance(&self, py: Python<'_>, dt: f64) -> PyResult<f64> {
        self.detached(py, |inner| inner.participant.advance(dt))
    }

    /// Close the coupling. Allowed once, after the loop ends. Releases the
    /// GIL.
    fn finalize(&self, py: Python<'_>) -> PyResult<()> {
        self.detached(py, |inner| inner.participant.finalize())
    }

    /// Participant name.
    #[getter]
    fn participant_name(&self) -> &str {
        &self.name
    }

    /// Current protocol state, e.g. `"stepping"`.
    #[getter]
    fn state(&self) -> PyResult<&'static str> {
        self.with(|inner| Ok(inner.participant.state().as_str()))
    }

    fn __repr__(&self) -> String {
        let state = self
            .with(|inner| Ok(inner.participant.state().as_str()))
            .unwrap_or("busy");
        format!("SolverInterface(participant='{}', state={state})", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::DataKind;
    use weft_driver::FieldSpec;

    fn role() -> Role {
        Role {
            name: "SolverOne".into(),
            mesh: "MeshOne".into(),
            writes: vec![FieldSpec {
                name: "Forces".into(),
                kind: DataKind::Vector,
            }],
            reads: vec![FieldSpec {
                name: "Velocities".into(),
                kind: DataKind::Vector,
            }],
        }
    }

    #[test]
    fn access_follows_role() {
        let r = role();
        assert_eq!(access_of(&r, "Forces").unwrap(), DataAccess::Write);
        assert_eq!(access_of(&r, "Velocities").unwrap(), DataAccess::Read);
        assert!(matches!(
            access_of(&r, "Pressure"),
            Err(DriverError::UnknownData { ref name }) if name == "Pressure"
        ));
    }
}
