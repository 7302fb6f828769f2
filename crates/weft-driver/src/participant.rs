//! [`Participant`]: a protocol-checking wrapper around a coupling engine.

use std::path::Path;

use indexmap::IndexMap;
use weft_core::{Action, ActionSet, CouplingEngine, DataId, MeshId, Position, VertexId};

use crate::error::DriverError;
use crate::state::ProtocolState;

/// Whether the participant produces or consumes a registered data field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataAccess {
    /// Written by this participant before each exchange.
    Write,
    /// Read by this participant after each exchange.
    Read,
}

impl DataAccess {
    fn as_str(self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Read => "read",
        }
    }
}

struct MeshEntry {
    name: String,
    vertices: usize,
}

struct DataEntry {
    name: String,
    mesh: MeshId,
    access: DataAccess,
    /// Written since the last `advance`.
    written: bool,
    /// New values arrived and have not been read yet.
    unread: bool,
}

/// One coupled participant, driving a [`CouplingEngine`] through the
/// coupling protocol.
///
/// Every call is checked against the [`ProtocolState`] machine before the
/// engine sees it. Out-of-order calls fail with
/// [`DriverError::ProtocolViolation`] and leave both the driver and the
/// engine untouched. Value buffers are checked against
/// `count(vertices) × width` at the same point.
///
/// Beyond plain ordering the driver enforces that:
///
/// - `fulfilled_action(a)` follows a `true` from `is_action_required(a)`
///   since the last `advance`;
/// - `initialize_data` runs once, after `fulfilled_action(write-initial-data)`
///   when that action was required;
/// - `advance` is only called once every required checkpoint action is
///   fulfilled, every written field has fresh values when the engine is about
///   to exchange, and every read field was read after the last exchange;
/// - `finalize` runs once, after the engine reported the end of the run.
pub struct Participant<E: CouplingEngine> {
    name: String,
    engine: E,
    state: ProtocolState,
    dimensions: usize,
    meshes: IndexMap<MeshId, MeshEntry>,
    data: IndexMap<DataId, DataEntry>,
    initial_data_required: bool,
    initialize_data_called: bool,
    /// Actions for which `is_action_required` returned `true` since the
    /// last `advance`.
    acknowledged: ActionSet,
    advances: u64,
}

impl<E: CouplingEngine> Participant<E> {
    /// Wrap an unconfigured engine.
    pub fn new(name: impl Into<String>, engine: E) -> Self {
        Self {
            name: name.into(),
            engine,
            state: ProtocolState::Unconfigured,
            dimensions: 0,
            meshes: IndexMap::new(),
            data: IndexMap::new(),
            initial_data_required: false,
            initialize_data_called: false,
            acknowledged: ActionSet::empty(),
            advances: 0,
        }
    }

    /// Participant name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current protocol state.
    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Spatial dimension, known after `configure`.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of successful `advance` calls.
    pub fn advances(&self) -> u64 {
        self.advances
    }

    fn transition(&mut self, to: ProtocolState) {
        if self.state != to {
            tracing::debug!(
                participant = %self.name,
                from = %self.state,
                to = %to,
                "protocol state change"
            );
            self.state = to;
        }
    }

    fn violation(&self, operation: &'static str, reason: impl Into<String>) -> DriverError {
        DriverError::violation(operation, self.state, reason)
    }

    /// Reject calls outside `initialize() .. finalize()`.
    fn require_coupled(&self, operation: &'static str) -> Result<(), DriverError> {
        match self.state {
            s if s.is_coupled() => Ok(()),
            ProtocolState::Terminated => Err(self.violation(operation, "finalize() was called")),
            _ => Err(self.violation(operation, "initialize() has not been called")),
        }
    }

    /// Enter the stepping loop, or confirm we are in it.
    fn enter_loop(&mut self, operation: &'static str) -> Result<(), DriverError> {
        match self.state {
            ProtocolState::Stepping => Ok(()),
            ProtocolState::Initialized if !self.initial_data_required => {
                self.transition(ProtocolState::Stepping);
                Ok(())
            }
            ProtocolState::Initialized => Err(self.violation(
                operation,
                "write-initial-data is required: write the initial values, \
                 call fulfilled_action(write-initial-data) and initialize_data() first",
            )),
            ProtocolState::InitialDataWritten => {
                Err(self.violation(operation, "initialize_data() has not been called"))
            }
            ProtocolState::Done => Err(self.violation(operation, "the coupled run has ended")),
            ProtocolState::Terminated => Err(self.violation(operation, "finalize() was called")),
            _ => Err(self.violation(operation, "initialize() has not been called")),
        }
    }

    fn mark_unread(&mut self) {
        if self.engine.is_read_data_available() {
            for d in self.data.values_mut() {
                if d.access == DataAccess::Read {
                    d.unread = true;
                }
            }
        }
    }

    // ── Setup ──────────────────────────────────────────────────────

    /// Read the coupling configuration.
    pub fn configure(&mut self, config_path: &Path) -> Result<(), DriverError> {
        const OP: &str = "configure";
        if self.state != ProtocolState::Unconfigured {
            return Err(self.violation(OP, "already configured"));
        }
        self.engine.configure(config_path)?;
        self.dimensions = self.engine.dimensions();
        tracing::info!(
            participant = %self.name,
            path = %config_path.display(),
            dimensions = self.dimensions,
            "configured"
        );
        self.transition(ProtocolState::Configured);
        Ok(())
    }

    /// Resolve a mesh this participant provides.
    pub fn register_mesh(&mut self, name: &str) -> Result<MeshId, DriverError> {
        const OP: &str = "register_mesh";
        if !matches!(
            self.state,
            ProtocolState::Configured | ProtocolState::MeshReady
        ) {
            return Err(self.violation(
                OP,
                "meshes are registered between configure() and initialize()",
            ));
        }
        let id = self.engine.mesh_id(name)?;
        self.meshes.entry(id).or_insert_with(|| MeshEntry {
            name: name.to_string(),
            vertices: 0,
        });
        Ok(id)
    }

    /// Append vertices to a registered mesh. Each position must hold
    /// `dimensions()` coordinates.
    pub fn set_vertices(
        &mut self,
        mesh: MeshId,
        positions: &[Position],
    ) -> Result<Vec<VertexId>, DriverError> {
        const OP: &str = "set_vertices";
        if !matches!(
            self.state,
            ProtocolState::Configured | ProtocolState::MeshReady
        ) {
            return Err(self.violation(
                OP,
                "vertices are set between configure() and initialize()",
            ));
        }
        if !self.meshes.contains_key(&mesh) {
            return Err(DriverError::UnknownMesh {
                name: mesh.to_string(),
            });
        }
        if positions.is_empty() {
            return Err(DriverError::InvalidArgument {
                reason: "no vertex positions given".into(),
            });
        }
        let dims = self.dimensions;
        if let Some(bad) = positions.iter().find(|p| p.len() != dims) {
            return Err(DriverError::InvalidArgument {
                reason: format!(
                    "position with {} coordinates in a {dims}-dimensional problem",
                    bad.len()
                ),
            });
        }
        let flat: Vec<f64> = positions.iter().flatten().copied().collect();
        let ids = self.engine.set_mesh_vertices(mesh, &flat)?;
        if let Some(m) = self.meshes.get_mut(&mesh) {
            m.vertices += ids.len();
        }
        self.transition(ProtocolState::MeshReady);
        Ok(ids)
    }

    fn require_mesh_readable(&self, operation: &'static str) -> Result<(), DriverError> {
        match self.state {
            ProtocolState::Unconfigured => {
                Err(self.violation(operation, "configure() has not been called"))
            }
            ProtocolState::Terminated => Err(self.violation(operation, "finalize() was called")),
            _ => Ok(()),
        }
    }

    /// Number of vertices set on a registered mesh.
    pub fn mesh_vertex_count(&self, mesh: MeshId) -> Result<usize, DriverError> {
        self.require_mesh_readable("mesh_vertex_count")?;
        if !self.meshes.contains_key(&mesh) {
            return Err(DriverError::UnknownMesh {
                name: mesh.to_string(),
            });
        }
        Ok(self.engine.mesh_vertex_count(mesh)?)
    }

    /// Copy the positions of `vertices` into `out`, `dimensions()`
    /// coordinates per vertex.
    pub fn mesh_vertices(
        &self,
        mesh: MeshId,
        vertices: &[VertexId],
        out: &mut [f64],
    ) -> Result<(), DriverError> {
        self.require_mesh_readable("mesh_vertices")?;
        let entry = self.meshes.get(&mesh).ok_or_else(|| DriverError::UnknownMesh {
            name: mesh.to_string(),
        })?;
        let expected = vertices.len() * self.dimensions;
        if out.len() != expected {
            return Err(DriverError::BufferSize {
                data: entry.name.clone(),
                expected,
                actual: out.len(),
            });
        }
        if let Some(v) = vertices.iter().find(|v| v.index() >= entry.vertices) {
            return Err(DriverError::InvalidArgument {
                reason: format!(
                    "vertex {v} out of range for mesh '{}' with {} vertices",
                    entry.name, entry.vertices
                ),
            });
        }
        self.engine.mesh_vertices(mesh, vertices, out)?;
        Ok(())
    }

    /// Resolve a data field on a registered mesh and declare how this
    /// participant uses it.
    ///
    /// Registering the same field again with the same access returns the
    /// same id.
    pub fn register_data(
        &mut self,
        name: &str,
        mesh: MeshId,
        access: DataAccess,
    ) -> Result<DataId, DriverError> {
        const OP: &str = "register_data";
        if matches!(
            self.state,
            ProtocolState::Unconfigured | ProtocolState::Done | ProtocolState::Terminated
        ) {
            return Err(self.violation(
                OP,
                "data is registered between configure() and the end of the run",
            ));
        }
        if !self.meshes.contains_key(&mesh) {
            return Err(DriverError::UnknownMesh {
                name: mesh.to_string(),
            });
        }
        let id = self.engine.data_id(name, mesh)?;
        if let Some(existing) = self.data.get(&id) {
            if existing.access != access {
                return Err(DriverError::InvalidArgument {
                    reason: format!(
                        "data '{name}' is already registered for {}",
                        existing.access.as_str()
                    ),
                });
            }
            return Ok(id);
        }
        self.data.insert(
            id,
            DataEntry {
                name: name.to_string(),
                mesh,
                access,
                written: false,
                unread: false,
            },
        );
        Ok(id)
    }

    // ── Initialization ─────────────────────────────────────────────

    /// Connect to the peers. Returns the maximum length of the first step.
    pub fn initialize(&mut self) -> Result<f64, DriverError> {
        const OP: &str = "initialize";
        match self.state {
            ProtocolState::MeshReady => {}
            ProtocolState::Configured => {
                return Err(self.violation(OP, "no mesh has vertices; call set_vertices() first"))
            }
            ProtocolState::Unconfigured => {
                return Err(self.violation(OP, "configure() has not been called"))
            }
            _ => return Err(self.violation(OP, "already initialized")),
        }
        let dt = self.engine.initialize()?;
        self.initial_data_required = self.engine.is_action_required(Action::WriteInitialData);
        self.transition(ProtocolState::Initialized);
        self.mark_unread();
        tracing::info!(
            participant = %self.name,
            dt,
            initial_data = self.initial_data_required,
            "initialized"
        );
        Ok(dt)
    }

    /// Whether the engine requires `action`. A `true` answer permits the
    /// matching `fulfilled_action` until the next `advance`.
    pub fn is_action_required(&mut self, action: Action) -> Result<bool, DriverError> {
        self.require_coupled("is_action_required")?;
        let required = self.engine.is_action_required(action);
        if required {
            self.acknowledged.insert(action);
        }
        Ok(required)
    }

    /// Acknowledge that `action` was performed.
    pub fn fulfilled_action(&mut self, action: Action) -> Result<(), DriverError> {
        const OP: &str = "fulfilled_action";
        self.require_coupled(OP)?;
        if !self.acknowledged.contains(action) {
            return Err(self.violation(
                OP,
                format!(
                    "is_action_required({action}) has not returned true since the last advance()"
                ),
            ));
        }
        match action {
            Action::WriteInitialData => {
                if self.state != ProtocolState::Initialized {
                    return Err(self.violation(
                        OP,
                        "initial data is fulfilled between initialize() and initialize_data()",
                    ));
                }
            }
            Action::WriteIterationCheckpoint | Action::ReadIterationCheckpoint => {
                self.enter_loop(OP)?;
            }
        }
        self.engine.fulfilled_action(action)?;
        self.acknowledged.remove(action);
        tracing::debug!(participant = %self.name, %action, "action fulfilled");
        if action == Action::WriteInitialData {
            self.transition(ProtocolState::InitialDataWritten);
        }
        Ok(())
    }

    /// Exchange initial data with the peers.
    pub fn initialize_data(&mut self) -> Result<(), DriverError> {
        const OP: &str = "initialize_data";
        match self.state {
            ProtocolState::Initialized if self.initial_data_required => {
                return Err(self.violation(
                    OP,
                    "write-initial-data is required: call fulfilled_action(write-initial-data) first",
                ))
            }
            ProtocolState::Initialized | ProtocolState::InitialDataWritten => {}
            ProtocolState::Stepping | ProtocolState::Done if self.initialize_data_called => {
                return Err(self.violation(OP, "already called"))
            }
            ProtocolState::Stepping | ProtocolState::Done => {
                return Err(self.violation(OP, "must precede the time-stepping loop"))
            }
            ProtocolState::Terminated => {
                return Err(self.violation(OP, "finalize() was called"))
            }
            _ => return Err(self.violation(OP, "initialize() has not been called")),
        }
        self.engine.initialize_data()?;
        self.initialize_data_called = true;
        // Initial values do not count as the first step's write.
        for d in self.data.values_mut() {
            d.written = false;
        }
        self.transition(ProtocolState::Stepping);
        self.mark_unread();
        Ok(())
    }

    // ── Stepping ───────────────────────────────────────────────────

    /// Whether the coupled run continues. The first `false` moves the
    /// participant to [`ProtocolState::Done`].
    pub fn is_coupling_ongoing(&mut self) -> Result<bool, DriverError> {
        if self.state == ProtocolState::Done {
            return Ok(false);
        }
        self.enter_loop("is_coupling_ongoing")?;
        let ongoing = self.engine.is_coupling_ongoing();
        if !ongoing {
            tracing::info!(participant = %self.name, advances = self.advances, "coupling done");
            self.transition(ProtocolState::Done);
        }
        Ok(ongoing)
    }

    /// Whether the last exchange delivered new values for read data.
    pub fn is_read_data_available(&self) -> Result<bool, DriverError> {
        self.require_coupled("is_read_data_available")?;
        Ok(self.engine.is_read_data_available())
    }

    /// Whether the last `advance` completed a coupling time window.
    pub fn is_time_window_complete(&self) -> Result<bool, DriverError> {
        self.require_coupled("is_time_window_complete")?;
        Ok(self.engine.is_time_window_complete())
    }

    /// Check a block access before it reaches the engine.
    fn check_block(
        &self,
        operation: &'static str,
        data: DataId,
        access: DataAccess,
        vertices: &[VertexId],
        len: usize,
        width: usize,
    ) -> Result<(), DriverError> {
        let entry = self.data.get(&data).ok_or_else(|| DriverError::UnknownData {
            name: data.to_string(),
        })?;
        if entry.access != access {
            return Err(DriverError::InvalidArgument {
                reason: format!(
                    "{operation}: data '{}' is registered for {}",
                    entry.name,
                    entry.access.as_str()
                ),
            });
        }
        let expected = vertices.len() * width;
        if len != expected {
            return Err(DriverError::BufferSize {
                data: entry.name.clone(),
                expected,
                actual: len,
            });
        }
        let (mesh_name, count) = self
            .meshes
            .get(&entry.mesh)
            .map_or(("", 0), |m| (m.name.as_str(), m.vertices));
        if let Some(v) = vertices.iter().find(|v| v.index() >= count) {
            return Err(DriverError::InvalidArgument {
                reason: format!(
                    "vertex {v} out of range for mesh '{mesh_name}' with {count} vertices"
                ),
            });
        }
        Ok(())
    }

    fn check_write_state(&self, operation: &'static str) -> Result<(), DriverError> {
        match self.state {
            ProtocolState::Initialized
            | ProtocolState::InitialDataWritten
            | ProtocolState::Stepping => Ok(()),
            ProtocolState::Done => Err(self.violation(operation, "the coupled run has ended")),
            _ => self.require_coupled(operation),
        }
    }

    fn record_write(&mut self, data: DataId) {
        if let Some(d) = self.data.get_mut(&data) {
            d.written = true;
        }
    }

    fn record_read(&mut self, data: DataId) {
        if let Some(d) = self.data.get_mut(&data) {
            d.unread = false;
        }
    }

    /// Write `dimensions()` values per vertex.
    pub fn write_block_vector_data(
        &mut self,
        data: DataId,
        vertices: &[VertexId],
        values: &[f64],
    ) -> Result<(), DriverError> {
        const OP: &str = "write_block_vector_data";
        self.check_write_state(OP)?;
        self.check_block(OP, data, DataAccess::Write, vertices, values.len(), self.dimensions)?;
        self.engine.write_block_vector_data(data, vertices, values)?;
        self.record_write(data);
        Ok(())
    }

    /// Read `dimensions()` values per vertex into `out`.
    pub fn read_block_vector_data(
        &mut self,
        data: DataId,
        vertices: &[VertexId],
        out: &mut [f64],
    ) -> Result<(), DriverError> {
        const OP: &str = "read_block_vector_data";
        self.require_coupled(OP)?;
        self.check_block(OP, data, DataAccess::Read, vertices, out.len(), self.dimensions)?;
        self.engine.read_block_vector_data(data, vertices, out)?;
        self.record_read(data);
        Ok(())
    }

    /// Write one value per vertex.
    pub fn write_block_scalar_data(
        &mut self,
        data: DataId,
        vertices: &[VertexId],
        values: &[f64],
    ) -> Result<(), DriverError> {
        const OP: &str = "write_block_scalar_data";
        self.check_write_state(OP)?;
        self.check_block(OP, data, DataAccess::Write, vertices, values.len(), 1)?;
        self.engine.write_block_scalar_data(data, vertices, values)?;
        self.record_write(data);
        Ok(())
    }

    /// Read one value per vertex into `out`.
    pub fn read_block_scalar_data(
        &mut self,
        data: DataId,
        vertices: &[VertexId],
        out: &mut [f64],
    ) -> Result<(), DriverError> {
        const OP: &str = "read_block_scalar_data";
        self.require_coupled(OP)?;
        self.check_block(OP, data, DataAccess::Read, vertices, out.len(), 1)?;
        self.engine.read_block_scalar_data(data, vertices, out)?;
        self.record_read(data);
        Ok(())
    }

    /// Commit a step of length `dt`. Returns the maximum length of the
    /// next step.
    pub fn advance(&mut self, dt: f64) -> Result<f64, DriverError> {
        const OP: &str = "advance";
        self.enter_loop(OP)?;
        if !dt.is_finite() || dt <= 0.0 {
            return Err(DriverError::InvalidArgument {
                reason: format!("step length {dt} is not a positive finite number"),
            });
        }
        for action in [Action::WriteIterationCheckpoint, Action::ReadIterationCheckpoint] {
            if self.engine.is_action_required(action) {
                return Err(self.violation(
                    OP,
                    format!("{action} is required; call fulfilled_action({action}) first"),
                ));
            }
        }
        if self.engine.is_write_data_required(dt) {
            let stale: Vec<&str> = self
                .data
                .values()
                .filter(|d| d.access == DataAccess::Write && !d.written)
                .map(|d| d.name.as_str())
                .collect();
            if !stale.is_empty() {
                return Err(self.violation(
                    OP,
                    format!("{} not written since the last advance()", stale.join(", ")),
                ));
            }
        }
        let unread: Vec<&str> = self
            .data
            .values()
            .filter(|d| d.unread)
            .map(|d| d.name.as_str())
            .collect();
        if !unread.is_empty() {
            return Err(self.violation(
                OP,
                format!("{} not read since the last exchange", unread.join(", ")),
            ));
        }

        let next = self.engine.advance(dt)?;
        self.advances += 1;
        self.acknowledged.clear();
        for d in self.data.values_mut() {
            d.written = false;
        }
        self.mark_unread();
        tracing::debug!(
            participant = %self.name,
            dt,
            next,
            advances = self.advances,
            "advanced"
        );
        Ok(next)
    }

    /// Close the coupling. Valid once, after `is_coupling_ongoing()`
    /// returned `false` or when the engine already reports the run as over.
    pub fn finalize(&mut self) -> Result<(), DriverError> {
        const OP: &str = "finalize";
        match self.state {
            ProtocolState::Done => {}
            ProtocolState::Terminated => return Err(self.violation(OP, "already called")),
            ProtocolState::Initialized
            | ProtocolState::InitialDataWritten
            | ProtocolState::Stepping
                if !self.engine.is_coupling_ongoing() =>
            {
                self.transition(ProtocolState::Done);
            }
            ProtocolState::Initialized
            | ProtocolState::InitialDataWritten
            | ProtocolState::Stepping => {
                return Err(self.violation(OP, "the coupled run is still ongoing"))
            }
            _ => return Err(self.violation(OP, "initialize() has not been called")),
        }
        let result = self.engine.finalize();
        self.transition(ProtocolState::Terminated);
        result?;
        tracing::info!(participant = %self.name, advances = self.advances, "finalized");
        Ok(())
    }
}

impl<E: CouplingEngine> Drop for Participant<E> {
    fn drop(&mut self) {
        if self.state.is_coupled() {
            tracing::warn!(
                participant = %self.name,
                state = %self.state,
                "participant dropped without finalize()"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;
    use weft_core::DataKind;
    use weft_test_utils::{Call, ScriptedEngine};

    const CONFIG: &str = "unused.toml";

    fn engine() -> ScriptedEngine {
        ScriptedEngine::new(3)
            .with_mesh("MeshOne")
            .with_data("Forces", "MeshOne", DataKind::Vector)
            .with_data("Velocities", "MeshOne", DataKind::Vector)
            .with_data("Temperature", "MeshOne", DataKind::Scalar)
            .with_windows(2)
    }

    struct Ready {
        p: Participant<ScriptedEngine>,
        ids: Vec<VertexId>,
        forces: DataId,
        velocities: DataId,
    }

    fn ready(engine: ScriptedEngine) -> Ready {
        let mut p = Participant::new("SolverOne", engine);
        p.configure(Path::new(CONFIG)).unwrap();
        let mesh = p.register_mesh("MeshOne").unwrap();
        let ids = p.set_vertices(mesh, &[smallvec![0.0, 0.0, 0.0]]).unwrap();
        let forces = p.register_data("Forces", mesh, DataAccess::Write).unwrap();
        let velocities = p.register_data("Velocities", mesh, DataAccess::Read).unwrap();
        Ready {
            p,
            ids,
            forces,
            velocities,
        }
    }

    #[test]
    fn full_sequence_reaches_terminated() {
        let Ready {
            mut p,
            ids,
            forces,
            velocities,
        } = ready(engine());
        let mut dt = p.initialize().unwrap();
        p.initialize_data().unwrap();
        let mut out = [0.0; 3];
        while p.is_coupling_ongoing().unwrap() {
            p.write_block_vector_data(forces, &ids, &[1.0, 2.0, 3.0]).unwrap();
            dt = p.advance(dt).unwrap();
            p.read_block_vector_data(velocities, &ids, &mut out).unwrap();
        }
        assert_eq!(p.state(), ProtocolState::Done);
        p.finalize().unwrap();
        assert_eq!(p.state(), ProtocolState::Terminated);
        assert_eq!(p.advances(), 2);
    }

    #[test]
    fn calls_before_configure_are_violations() {
        let mut p = Participant::new("SolverOne", engine());
        assert!(p.register_mesh("MeshOne").unwrap_err().is_protocol_violation());
        assert!(p.initialize().unwrap_err().is_protocol_violation());
        assert!(p.advance(1.0).unwrap_err().is_protocol_violation());
        assert!(p.finalize().unwrap_err().is_protocol_violation());
        assert!(p.engine().calls().is_empty());
    }

    #[test]
    fn initialize_requires_vertices() {
        let mut p = Participant::new("SolverOne", engine());
        p.configure(Path::new(CONFIG)).unwrap();
        p.register_mesh("MeshOne").unwrap();
        let err = p.initialize().unwrap_err();
        assert!(err.is_protocol_violation());
        assert!(!p.engine().calls().contains(&Call::Initialize));
    }

    #[test]
    fn position_dimension_is_checked() {
        let mut p = Participant::new("SolverOne", engine());
        p.configure(Path::new(CONFIG)).unwrap();
        let mesh = p.register_mesh("MeshOne").unwrap();
        let err = p.set_vertices(mesh, &[smallvec![0.0, 0.0]]).unwrap_err();
        assert!(matches!(err, DriverError::InvalidArgument { .. }));
        assert_eq!(p.state(), ProtocolState::Configured);
    }

    #[test]
    fn advance_before_required_write_is_violation() {
        let Ready { mut p, .. } = ready(engine());
        let dt = p.initialize().unwrap();
        p.initialize_data().unwrap();
        let err = p.advance(dt).unwrap_err();
        assert!(err.is_protocol_violation());
        assert!(err.to_string().contains("Forces"));
        assert!(!p.engine().calls().iter().any(|c| matches!(c, Call::Advance(_))));
    }

    #[test]
    fn initial_data_write_does_not_cover_first_step() {
        let Ready {
            mut p, ids, forces, ..
        } = ready(engine().requiring_initial_data());
        let dt = p.initialize().unwrap();
        assert!(p.is_action_required(Action::WriteInitialData).unwrap());
        p.write_block_vector_data(forces, &ids, &[0.5; 3]).unwrap();
        p.fulfilled_action(Action::WriteInitialData).unwrap();
        p.initialize_data().unwrap();
        assert!(p.is_coupling_ongoing().unwrap());
        let err = p.advance(dt).unwrap_err();
        assert!(err.is_protocol_violation());
        assert!(err.to_string().contains("Forces"));
        assert!(!p.engine().calls().iter().any(|c| matches!(c, Call::Advance(_))));

        p.write_block_vector_data(forces, &ids, &[1.0; 3]).unwrap();
        p.advance(dt).unwrap();
    }

    #[test]
    fn unread_data_blocks_advance() {
        let Ready {
            mut p, ids, forces, ..
        } = ready(engine().with_loopback("Forces", "Velocities"));
        let dt = p.initialize().unwrap();
        p.initialize_data().unwrap();
        p.is_coupling_ongoing().unwrap();
        p.write_block_vector_data(forces, &ids, &[1.0; 3]).unwrap();
        p.advance(dt).unwrap();
        p.write_block_vector_data(forces, &ids, &[1.0; 3]).unwrap();
        let err = p.advance(dt).unwrap_err();
        assert!(err.to_string().contains("Velocities not read"));
    }

    #[test]
    fn buffer_size_is_checked_before_engine() {
        let Ready {
            mut p, ids, forces, ..
        } = ready(engine());
        p.initialize().unwrap();
        let err = p.write_block_vector_data(forces, &ids, &[1.0, 2.0]).unwrap_err();
        assert_eq!(
            err,
            DriverError::BufferSize {
                data: "Forces".into(),
                expected: 3,
                actual: 2
            }
        );
        assert!(!p.engine().calls().iter().any(|c| matches!(c, Call::Write(_))));
    }

    #[test]
    fn access_direction_is_checked() {
        let Ready {
            mut p,
            ids,
            velocities,
            ..
        } = ready(engine());
        p.initialize().unwrap();
        let err = p
            .write_block_vector_data(velocities, &ids, &[0.0; 3])
            .unwrap_err();
        assert!(matches!(err, DriverError::InvalidArgument { .. }));
    }

    #[test]
    fn out_of_range_vertex_is_rejected() {
        let Ready { mut p, forces, .. } = ready(engine());
        p.initialize().unwrap();
        let err = p
            .write_block_vector_data(forces, &[VertexId(1)], &[0.0; 3])
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn fulfilling_without_positive_query_is_violation() {
        let Ready { mut p, .. } = ready(engine().requiring_initial_data());
        p.initialize().unwrap();
        let err = p.fulfilled_action(Action::WriteInitialData).unwrap_err();
        assert!(err.is_protocol_violation());
        assert!(!p
            .engine()
            .calls()
            .contains(&Call::FulfilledAction(Action::WriteInitialData)));
    }

    #[test]
    fn initial_data_must_be_fulfilled_before_initialize_data() {
        let Ready {
            mut p, ids, forces, ..
        } = ready(engine().requiring_initial_data());
        p.initialize().unwrap();
        assert!(p.initialize_data().unwrap_err().is_protocol_violation());
        assert!(p.is_action_required(Action::WriteInitialData).unwrap());
        p.write_block_vector_data(forces, &ids, &[0.1; 3]).unwrap();
        p.fulfilled_action(Action::WriteInitialData).unwrap();
        assert_eq!(p.state(), ProtocolState::InitialDataWritten);
        p.initialize_data().unwrap();
        assert!(p.initialize_data().unwrap_err().is_protocol_violation());

        let calls = p.engine().calls();
        let fulfilled = calls
            .iter()
            .position(|c| *c == Call::FulfilledAction(Action::WriteInitialData))
            .unwrap();
        let init = calls.iter().position(|c| *c == Call::InitializeData).unwrap();
        assert!(fulfilled < init);
    }

    #[test]
    fn no_initial_data_means_no_fulfil() {
        let Ready { mut p, .. } = ready(engine());
        p.initialize().unwrap();
        assert!(!p.is_action_required(Action::WriteInitialData).unwrap());
        assert!(p
            .fulfilled_action(Action::WriteInitialData)
            .unwrap_err()
            .is_protocol_violation());
        p.initialize_data().unwrap();
        assert!(!p
            .engine()
            .calls()
            .iter()
            .any(|c| matches!(c, Call::FulfilledAction(_))));
    }

    #[test]
    fn checkpoint_must_be_fulfilled_before_advance() {
        let Ready {
            mut p, ids, forces, ..
        } = ready(engine().with_checkpoints(1));
        let dt = p.initialize().unwrap();
        p.initialize_data().unwrap();
        p.write_block_vector_data(forces, &ids, &[1.0; 3]).unwrap();
        let err = p.advance(dt).unwrap_err();
        assert!(err.to_string().contains("write-iteration-checkpoint"));
        assert!(p.is_action_required(Action::WriteIterationCheckpoint).unwrap());
        p.fulfilled_action(Action::WriteIterationCheckpoint).unwrap();
        p.advance(dt).unwrap();
        assert!(p.is_action_required(Action::ReadIterationCheckpoint).unwrap());
    }

    #[test]
    fn initialize_data_after_loop_start_is_violation() {
        let Ready { mut p, .. } = ready(engine());
        p.initialize().unwrap();
        p.is_coupling_ongoing().unwrap();
        assert_eq!(p.state(), ProtocolState::Stepping);
        let err = p.initialize_data().unwrap_err();
        assert!(err.to_string().contains("must precede"));
    }

    #[test]
    fn finalize_only_after_done_and_once() {
        let Ready {
            mut p, ids, forces, ..
        } = ready(engine().with_windows(1));
        let dt = p.initialize().unwrap();
        p.initialize_data().unwrap();
        assert!(p.finalize().unwrap_err().is_protocol_violation());
        p.write_block_vector_data(forces, &ids, &[1.0; 3]).unwrap();
        p.advance(dt).unwrap();
        assert!(!p.is_coupling_ongoing().unwrap());
        assert!(!p.is_coupling_ongoing().unwrap());
        assert!(p.advance(dt).unwrap_err().is_protocol_violation());
        p.finalize().unwrap();
        let err = p.finalize().unwrap_err();
        assert!(err.to_string().contains("already called"));
        let finalizes = p
            .engine()
            .calls()
            .iter()
            .filter(|c| **c == Call::Finalize)
            .count();
        assert_eq!(finalizes, 1);
    }

    #[test]
    fn finalize_after_initial_data_when_run_is_empty() {
        let Ready {
            mut p, ids, forces, ..
        } = ready(engine().requiring_initial_data().with_windows(0));
        p.initialize().unwrap();
        assert!(p.is_action_required(Action::WriteInitialData).unwrap());
        p.write_block_vector_data(forces, &ids, &[0.0; 3]).unwrap();
        p.fulfilled_action(Action::WriteInitialData).unwrap();
        assert_eq!(p.state(), ProtocolState::InitialDataWritten);
        p.finalize().unwrap();
        assert_eq!(p.state(), ProtocolState::Terminated);
        assert!(p.engine().calls().contains(&Call::Finalize));
    }

    #[test]
    fn finalize_after_initial_data_while_ongoing_is_violation() {
        let Ready {
            mut p, ids, forces, ..
        } = ready(engine().requiring_initial_data());
        p.initialize().unwrap();
        assert!(p.is_action_required(Action::WriteInitialData).unwrap());
        p.write_block_vector_data(forces, &ids, &[0.0; 3]).unwrap();
        p.fulfilled_action(Action::WriteInitialData).unwrap();
        let err = p.finalize().unwrap_err();
        assert!(err.to_string().contains("still ongoing"));
        assert_eq!(p.state(), ProtocolState::InitialDataWritten);
    }

    #[test]
    fn mesh_vertices_round_trip_positions() {
        let mut p = Participant::new("SolverOne", engine());
        p.configure(Path::new(CONFIG)).unwrap();
        let mesh = p.register_mesh("MeshOne").unwrap();
        assert_eq!(p.mesh_vertex_count(mesh).unwrap(), 0);
        let ids = p
            .set_vertices(mesh, &[smallvec![0.0, 1.0, 2.0], smallvec![3.0, 4.0, 5.0]])
            .unwrap();
        assert_eq!(p.mesh_vertex_count(mesh).unwrap(), 2);

        let mut out = [0.0; 3];
        p.mesh_vertices(mesh, &ids[1..], &mut out).unwrap();
        assert_eq!(out, [3.0, 4.0, 5.0]);

        assert!(matches!(
            p.mesh_vertices(mesh, &ids, &mut out),
            Err(DriverError::BufferSize { expected: 6, actual: 3, .. })
        ));
        let err = p
            .mesh_vertices(mesh, &[VertexId(2)], &mut out)
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(matches!(
            p.mesh_vertex_count(MeshId(7)),
            Err(DriverError::UnknownMesh { .. })
        ));
    }

    #[test]
    fn mesh_vertices_before_configure_is_violation() {
        let p = Participant::new("SolverOne", engine());
        assert!(p
            .mesh_vertex_count(MeshId(0))
            .unwrap_err()
            .is_protocol_violation());
        let mut out = [0.0; 3];
        assert!(p
            .mesh_vertices(MeshId(0), &[VertexId(0)], &mut out)
            .unwrap_err()
            .is_protocol_violation());
    }

    #[test]
    fn non_positive_step_is_invalid() {
        let Ready {
            mut p, ids, forces, ..
        } = ready(engine());
        p.initialize().unwrap();
        p.write_block_vector_data(forces, &ids, &[1.0; 3]).unwrap();
        for dt in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                p.advance(dt),
                Err(DriverError::InvalidArgument { .. })
            ));
        }
    }

    #[test]
    fn reregistering_data_returns_same_id() {
        let Ready { mut p, forces, .. } = ready(engine());
        let mesh = p.register_mesh("MeshOne").unwrap();
        assert_eq!(
            p.register_data("Forces", mesh, DataAccess::Write).unwrap(),
            forces
        );
        assert!(matches!(
            p.register_data("Forces", mesh, DataAccess::Read),
            Err(DriverError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn scalar_width_is_one() {
        let Ready { mut p, ids, .. } = ready(engine());
        let mesh = p.register_mesh("MeshOne").unwrap();
        let t = p
            .register_data("Temperature", mesh, DataAccess::Write)
            .unwrap();
        p.initialize().unwrap();
        p.write_block_scalar_data(t, &ids, &[300.0]).unwrap();
        assert!(matches!(
            p.write_block_scalar_data(t, &ids, &[300.0, 1.0]),
            Err(DriverError::BufferSize { expected: 1, .. })
        ));
    }
}
