//! A peerless, scripted [`CouplingEngine`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use weft_core::{
    Action, ActionSet, CouplingEngine, DataId, DataKind, EngineError, MeshId, VertexId,
};

/// A state-changing engine call, as recorded by [`ScriptedEngine`].
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Configure,
    SetMeshVertices { mesh: MeshId, count: usize },
    Initialize,
    InitializeData,
    FulfilledAction(Action),
    Write(String),
    Read(String),
    Advance(f64),
    Finalize,
}

/// Shared, cloneable call log. Survives the engine it was taken from.
#[derive(Clone, Debug, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn push(&self, call: Call) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    /// Snapshot of the recorded calls.
    pub fn calls(&self) -> Vec<Call> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

struct ScriptedData {
    name: String,
    mesh: MeshId,
    kind: DataKind,
}

/// In-memory coupling engine without a peer.
///
/// - The run lasts `windows` time windows of `window_size` (default 2 × 1.0).
/// - `requiring_initial_data` makes `initialize` require
///   [`Action::WriteInitialData`].
/// - `with_checkpoints(n)` makes the scheme implicit: every window needs
///   a [`Action::WriteIterationCheckpoint`] and its first `n` iterations
///   are rejected with [`Action::ReadIterationCheckpoint`].
/// - `with_loopback(from, to)` copies the values written to `from` into
///   the values read from `to` on every exchange, making read data
///   available.
pub struct ScriptedEngine {
    dimensions: usize,
    /// Mesh name and flattened vertex positions.
    meshes: Vec<(String, Vec<f64>)>,
    data: Vec<ScriptedData>,
    loopbacks: Vec<(String, String)>,
    configure_error: Option<EngineError>,
    windows: u32,
    window_size: f64,
    initial_data: bool,
    rejections: Option<u32>,

    configured: bool,
    initialized: bool,
    finalized: bool,
    required: ActionSet,
    completed: u32,
    iteration: u32,
    window_complete: bool,
    read_available: bool,
    written: HashMap<DataId, Vec<f64>>,
    received: HashMap<DataId, Vec<f64>>,
    log: CallLog,
}

impl ScriptedEngine {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            meshes: Vec::new(),
            data: Vec::new(),
            loopbacks: Vec::new(),
            configure_error: None,
            windows: 2,
            window_size: 1.0,
            initial_data: false,
            rejections: None,
            configured: false,
            initialized: false,
            finalized: false,
            required: ActionSet::empty(),
            completed: 0,
            iteration: 0,
            window_complete: false,
            read_available: false,
            written: HashMap::new(),
            received: HashMap::new(),
            log: CallLog::default(),
        }
    }

    pub fn with_mesh(mut self, name: &str) -> Self {
        self.meshes.push((name.to_string(), Vec::new()));
        self
    }

    /// Panics if `mesh` was not added first.
    pub fn with_data(mut self, name: &str, mesh: &str, kind: DataKind) -> Self {
        let mesh = self
            .meshes
            .iter()
            .position(|(m, _)| m == mesh)
            .expect("with_mesh must come before with_data");
        self.data.push(ScriptedData {
            name: name.to_string(),
            mesh: MeshId(mesh as u32),
            kind,
        });
        self
    }

    pub fn with_windows(mut self, windows: u32) -> Self {
        self.windows = windows;
        self
    }

    pub fn with_window_size(mut self, dt: f64) -> Self {
        self.window_size = dt;
        self
    }

    pub fn requiring_initial_data(mut self) -> Self {
        self.initial_data = true;
        self
    }

    pub fn with_checkpoints(mut self, rejections_per_window: u32) -> Self {
        self.rejections = Some(rejections_per_window);
        self
    }

    pub fn with_loopback(mut self, from: &str, to: &str) -> Self {
        self.loopbacks.push((from.to_string(), to.to_string()));
        self
    }

    /// Make `configure` fail with `error`.
    pub fn failing_configure(mut self, error: EngineError) -> Self {
        self.configure_error = Some(error);
        self
    }

    /// Handle on the call log.
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    /// Snapshot of the recorded calls.
    pub fn calls(&self) -> Vec<Call> {
        self.log.calls()
    }

    /// Completed time windows.
    pub fn completed_windows(&self) -> u32 {
        self.completed
    }

    fn data(&self, id: DataId) -> Result<&ScriptedData, EngineError> {
        self.data
            .get(id.0 as usize)
            .ok_or(EngineError::InvalidDataId(id))
    }

    fn vertex_count(&self, mesh: MeshId) -> usize {
        self.meshes
            .get(mesh.0 as usize)
            .map_or(0, |m| m.1.len() / self.dimensions.max(1))
    }

    fn check(
        &self,
        id: DataId,
        kind: DataKind,
        vertices: &[VertexId],
        len: usize,
    ) -> Result<usize, EngineError> {
        let d = self.data(id)?;
        if d.kind != kind {
            return Err(EngineError::DimensionMismatch {
                name: d.name.clone(),
                expected: d.kind.width(self.dimensions),
                actual: kind.width(self.dimensions),
            });
        }
        let width = kind.width(self.dimensions);
        if len != vertices.len() * width {
            return Err(EngineError::BufferSize {
                expected: vertices.len() * width,
                actual: len,
            });
        }
        let count = self.vertex_count(d.mesh);
        if let Some(v) = vertices.iter().find(|v| v.index() >= count) {
            return Err(EngineError::InvalidVertex {
                vertex: *v,
                vertex_count: count,
            });
        }
        Ok(width)
    }

    fn write(
        &mut self,
        id: DataId,
        kind: DataKind,
        vertices: &[VertexId],
        values: &[f64],
    ) -> Result<(), EngineError> {
        let width = self.check(id, kind, vertices, values.len())?;
        let d = self.data(id)?;
        let size = self.vertex_count(d.mesh) * width;
        self.log.push(Call::Write(d.name.clone()));
        let stored = self.written.entry(id).or_insert_with(|| vec![0.0; size]);
        for (v, chunk) in vertices.iter().zip(values.chunks(width.max(1))) {
            let at = v.index() * width;
            stored[at..at + width].copy_from_slice(chunk);
        }
        Ok(())
    }

    fn read(
        &self,
        id: DataId,
        kind: DataKind,
        vertices: &[VertexId],
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        let width = self.check(id, kind, vertices, out.len())?;
        self.log.push(Call::Read(self.data(id)?.name.clone()));
        let source = self.received.get(&id);
        for (v, chunk) in vertices.iter().zip(out.chunks_mut(width.max(1))) {
            let at = v.index() * width;
            match source.and_then(|s| s.get(at..at + width)) {
                Some(values) => chunk.copy_from_slice(values),
                None => chunk.fill(0.0),
            }
        }
        Ok(())
    }

    fn exchange(&mut self) {
        for (from, to) in &self.loopbacks {
            let from = self.data.iter().position(|d| &d.name == from);
            let to = self.data.iter().position(|d| &d.name == to);
            if let (Some(from), Some(to)) = (from, to) {
                let values = self
                    .written
                    .get(&DataId(from as u32))
                    .cloned()
                    .unwrap_or_default();
                self.received.insert(DataId(to as u32), values);
            }
        }
        self.read_available = !self.loopbacks.is_empty();
    }

    fn ongoing(&self) -> bool {
        self.completed < self.windows
    }
}

impl CouplingEngine for ScriptedEngine {
    fn configure(&mut self, _config_path: &Path) -> Result<(), EngineError> {
        self.log.push(Call::Configure);
        if let Some(e) = &self.configure_error {
            return Err(e.clone());
        }
        if self.configured {
            return Err(EngineError::protocol("configure", "already configured"));
        }
        self.configured = true;
        Ok(())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn mesh_id(&self, name: &str) -> Result<MeshId, EngineError> {
        self.meshes
            .iter()
            .position(|(m, _)| m == name)
            .map(|i| MeshId(i as u32))
            .ok_or_else(|| EngineError::UnknownMesh {
                name: name.to_string(),
            })
    }

    fn data_id(&self, name: &str, mesh: MeshId) -> Result<DataId, EngineError> {
        self.data
            .iter()
            .position(|d| d.name == name && d.mesh == mesh)
            .map(|i| DataId(i as u32))
            .ok_or_else(|| EngineError::UnknownData {
                name: name.to_string(),
                mesh,
            })
    }

    fn set_mesh_vertices(
        &mut self,
        mesh: MeshId,
        positions: &[f64],
    ) -> Result<Vec<VertexId>, EngineError> {
        if positions.len() % self.dimensions != 0 {
            return Err(EngineError::DimensionMismatch {
                name: format!("mesh {mesh}"),
                expected: self.dimensions,
                actual: positions.len() % self.dimensions,
            });
        }
        let entry = self
            .meshes
            .get_mut(mesh.0 as usize)
            .ok_or(EngineError::InvalidMeshId(mesh))?;
        let count = positions.len() / self.dimensions;
        let first = entry.1.len() / self.dimensions;
        entry.1.extend_from_slice(positions);
        self.log.push(Call::SetMeshVertices { mesh, count });
        Ok((first..first + count).map(|i| VertexId(i as u32)).collect())
    }

    fn mesh_vertex_count(&self, mesh: MeshId) -> Result<usize, EngineError> {
        if self.meshes.get(mesh.0 as usize).is_none() {
            return Err(EngineError::InvalidMeshId(mesh));
        }
        Ok(self.vertex_count(mesh))
    }

    fn mesh_vertices(
        &self,
        mesh: MeshId,
        vertices: &[VertexId],
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        let count = self.mesh_vertex_count(mesh)?;
        let dims = self.dimensions;
        if out.len() != vertices.len() * dims {
            return Err(EngineError::BufferSize {
                expected: vertices.len() * dims,
                actual: out.len(),
            });
        }
        let positions = &self.meshes[mesh.0 as usize].1;
        for (v, chunk) in vertices.iter().zip(out.chunks_exact_mut(dims)) {
            if v.index() >= count {
                return Err(EngineError::InvalidVertex {
                    vertex: *v,
                    vertex_count: count,
                });
            }
            let start = v.index() * dims;
            chunk.copy_from_slice(&positions[start..start + dims]);
        }
        Ok(())
    }

    fn initialize(&mut self) -> Result<f64, EngineError> {
        self.log.push(Call::Initialize);
        if !self.configured || self.initialized {
            return Err(EngineError::protocol("initialize", "not configured or already initialized"));
        }
        self.initialized = true;
        if self.initial_data {
            self.required.insert(Action::WriteInitialData);
        }
        if self.rejections.is_some() {
            self.required.insert(Action::WriteIterationCheckpoint);
        }
        Ok(self.window_size)
    }

    fn initialize_data(&mut self) -> Result<(), EngineError> {
        self.log.push(Call::InitializeData);
        if self.required.contains(Action::WriteInitialData) {
            return Err(EngineError::protocol(
                "initialize_data",
                "write-initial-data not fulfilled",
            ));
        }
        if self.initial_data {
            self.exchange();
        }
        Ok(())
    }

    fn is_action_required(&self, action: Action) -> bool {
        self.required.contains(action)
    }

    fn fulfilled_action(&mut self, action: Action) -> Result<(), EngineError> {
        self.log.push(Call::FulfilledAction(action));
        if !self.required.remove(action) {
            return Err(EngineError::protocol(
                "fulfilled_action",
                format!("{action} is not required"),
            ));
        }
        Ok(())
    }

    fn is_coupling_ongoing(&self) -> bool {
        self.initialized && !self.finalized && self.ongoing()
    }

    fn is_read_data_available(&self) -> bool {
        self.read_available
    }

    fn is_write_data_required(&self, _dt: f64) -> bool {
        true
    }

    fn is_time_window_complete(&self) -> bool {
        self.window_complete
    }

    fn write_block_vector_data(
        &mut self,
        data: DataId,
        vertices: &[VertexId],
        values: &[f64],
    ) -> Result<(), EngineError> {
        self.write(data, DataKind::Vector, vertices, values)
    }

    fn read_block_vector_data(
        &self,
        data: DataId,
        vertices: &[VertexId],
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        self.read(data, DataKind::Vector, vertices, out)
    }

    fn write_block_scalar_data(
        &mut self,
        data: DataId,
        vertices: &[VertexId],
        values: &[f64],
    ) -> Result<(), EngineError> {
        self.write(data, DataKind::Scalar, vertices, values)
    }

    fn read_block_scalar_data(
        &self,
        data: DataId,
        vertices: &[VertexId],
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        self.read(data, DataKind::Scalar, vertices, out)
    }

    fn advance(&mut self, dt: f64) -> Result<f64, EngineError> {
        self.log.push(Call::Advance(dt));
        if !self.initialized || self.finalized || !self.ongoing() {
            return Err(EngineError::protocol("advance", "coupling is not running"));
        }
        if !self.required.is_empty() {
            return Err(EngineError::protocol(
                "advance",
                format!("pending actions {}", self.required),
            ));
        }
        self.iteration += 1;
        self.exchange();
        match self.rejections {
            Some(n) if self.iteration <= n => {
                self.window_complete = false;
                self.required.insert(Action::ReadIterationCheckpoint);
            }
            implicit => {
                self.window_complete = true;
                self.iteration = 0;
                self.completed += 1;
                if implicit.is_some() && self.ongoing() {
                    self.required.insert(Action::WriteIterationCheckpoint);
                }
            }
        }
        Ok(self.window_size)
    }

    fn finalize(&mut self) -> Result<(), EngineError> {
        self.log.push(Call::Finalize);
        if self.finalized {
            return Err(EngineError::protocol("finalize", "already finalized"));
        }
        self.finalized = true;
        Ok(())
    }
}
