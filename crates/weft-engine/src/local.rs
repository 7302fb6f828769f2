//! [`LocalEngine`]: the in-tree [`CouplingEngine`] implementation.

use std::path::Path;

use weft_core::{
    Action, CouplingEngine, DataId, DataKind, EngineError, MeshId, ParticipantInfo, VertexId,
};
use weft_transport::{Channel, LocalNetwork, TcpChannel};

use crate::config::{CouplingConfig, SchemeConfig, TransportKind};
use crate::mesh::{Access, MeshStore};
use crate::metrics::CouplingMetrics;
use crate::scheme::{transport_error, CouplingScheme, Role};

struct Setup {
    coupling: SchemeConfig,
    store: MeshStore,
    scheme: CouplingScheme,
}

/// Coupling engine for one participant of a two-participant scheme.
///
/// Reads the TOML configuration described in [`crate::config`], keeps the
/// participant's mesh and data in memory, and talks to the peer over a
/// [`LocalChannel`](weft_transport::LocalChannel) or a [`TcpChannel`].
///
/// Only single-process participants (`size == 1`) are supported.
pub struct LocalEngine {
    info: ParticipantInfo,
    network: LocalNetwork,
    setup: Option<Setup>,
}

impl LocalEngine {
    /// Engine for `info`, using [`LocalNetwork::global`] for local transport.
    pub fn new(info: ParticipantInfo) -> Self {
        Self::with_network(info, LocalNetwork::global().clone())
    }

    /// Engine for `info`, using a caller-provided network for local
    /// transport. Participants must share a network to find each other.
    pub fn with_network(info: ParticipantInfo, network: LocalNetwork) -> Self {
        Self {
            info,
            network,
            setup: None,
        }
    }

    /// Configure from an already parsed configuration.
    pub fn configure_with(&mut self, config: CouplingConfig) -> Result<(), EngineError> {
        if self.setup.is_some() {
            return Err(EngineError::protocol("configure", "already configured"));
        }
        if self.info.size() != 1 {
            return Err(EngineError::Config {
                reason: format!(
                    "participant '{}' has {} processes; only single-process participants are supported",
                    self.info.name(),
                    self.info.size()
                ),
            });
        }
        config.validate()?;

        let name = self.info.name();
        let participant =
            config
                .participant(name)
                .ok_or_else(|| EngineError::UnknownParticipant {
                    name: name.to_string(),
                })?;
        let coupling = config
            .coupling_of(name)
            .ok_or_else(|| EngineError::Config {
                reason: format!("participant '{name}' takes part in no coupling"),
            })?
            .clone();
        let mesh_config = config.mesh(&participant.mesh).ok_or_else(|| {
            EngineError::UnknownMesh {
                name: participant.mesh.clone(),
            }
        })?;

        let mut store = MeshStore::new(config.dimensions);
        let mesh = store.add_mesh(&mesh_config.name);
        for data in &mesh_config.data {
            let kind = config
                .data(data)
                .map(|d| DataKind::from(d.kind))
                .unwrap_or_default();
            let access = if participant.writes.contains(data) {
                Access::Write
            } else if participant.reads.contains(data) {
                Access::Read
            } else {
                Access::None
            };
            store.add_field(data, mesh, kind, access);
        }
        let scheme = CouplingScheme::new(&coupling, name, &store)?;
        tracing::info!(
            participant = %self.info,
            mesh = %mesh_config.name,
            peer = scheme.peer(),
            scheme = %coupling.scheme,
            "configured"
        );
        self.setup = Some(Setup {
            coupling,
            store,
            scheme,
        });
        Ok(())
    }

    /// The participant this engine serves.
    pub fn participant(&self) -> &ParticipantInfo {
        &self.info
    }

    /// Counters for the run so far.
    pub fn metrics(&self) -> CouplingMetrics {
        self.setup
            .as_ref()
            .map(|s| s.scheme.metrics().clone())
            .unwrap_or_default()
    }

    /// Simulated time reached by the last `advance`.
    pub fn time(&self) -> f64 {
        self.setup.as_ref().map_or(0.0, |s| s.scheme.time())
    }

    /// Current (1-based) time window.
    pub fn window(&self) -> u32 {
        self.setup.as_ref().map_or(0, |s| s.scheme.window())
    }

    fn setup(&self, operation: &'static str) -> Result<&Setup, EngineError> {
        self.setup
            .as_ref()
            .ok_or_else(|| EngineError::protocol(operation, "configure() has not been called"))
    }

    fn setup_mut(&mut self, operation: &'static str) -> Result<&mut Setup, EngineError> {
        self.setup
            .as_mut()
            .ok_or_else(|| EngineError::protocol(operation, "configure() has not been called"))
    }

    fn connect(&self, setup: &Setup) -> Result<Box<dyn Channel>, EngineError> {
        let transport = &setup.coupling.transport;
        let timeout = transport.connect_timeout();
        let local = self.info.name();
        let peer = setup.scheme.peer();
        let mut channel: Box<dyn Channel> = match transport.kind {
            TransportKind::Local => {
                let channel = self
                    .network
                    .connect(local, peer, timeout)
                    .map_err(transport_error)?;
                Box::new(channel)
            }
            TransportKind::Tcp => {
                let accepts = match &transport.acceptor {
                    Some(acceptor) => acceptor == local,
                    None => setup.scheme.role() == Role::First,
                };
                let channel = if accepts {
                    TcpChannel::accept(local, peer, &transport.address, timeout)
                } else {
                    TcpChannel::connect(local, peer, &transport.address, timeout)
                }
                .map_err(transport_error)?;
                Box::new(channel)
            }
        };
        channel
            .set_recv_timeout(transport.exchange_timeout())
            .map_err(transport_error)?;
        Ok(channel)
    }

    fn check_not_finalized(&self, operation: &'static str) -> Result<&Setup, EngineError> {
        let setup = self.setup(operation)?;
        if setup.scheme.is_finalized() {
            return Err(EngineError::protocol(operation, "already finalized"));
        }
        Ok(setup)
    }
}

impl CouplingEngine for LocalEngine {
    fn configure(&mut self, config_path: &Path) -> Result<(), EngineError> {
        if self.setup.is_some() {
            return Err(EngineError::protocol("configure", "already configured"));
        }
        let config = CouplingConfig::from_path(config_path)?;
        self.configure_with(config)
    }

    fn dimensions(&self) -> usize {
        self.setup.as_ref().map_or(0, |s| s.store.dimensions())
    }

    fn mesh_id(&self, name: &str) -> Result<MeshId, EngineError> {
        self.setup("mesh_id")?.store.mesh_id(name)
    }

    fn data_id(&self, name: &str, mesh: MeshId) -> Result<DataId, EngineError> {
        self.setup("data_id")?.store.data_id(name, mesh)
    }

    fn set_mesh_vertices(
        &mut self,
        mesh: MeshId,
        positions: &[f64],
    ) -> Result<Vec<VertexId>, EngineError> {
        self.setup_mut("set_mesh_vertices")?
            .store
            .set_vertices(mesh, positions)
    }

    fn mesh_vertex_count(&self, mesh: MeshId) -> Result<usize, EngineError> {
        self.setup("mesh_vertex_count")?.store.vertex_count(mesh)
    }

    fn mesh_vertices(
        &self,
        mesh: MeshId,
        vertices: &[VertexId],
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        self.setup("mesh_vertices")?
            .store
            .positions(mesh, vertices, out)
    }

    fn initialize(&mut self) -> Result<f64, EngineError> {
        let setup = self.check_not_finalized("initialize")?;
        if setup.scheme.is_initialized() {
            return Err(EngineError::protocol("initialize", "already initialized"));
        }
        let channel = self.connect(setup)?;
        let setup = self.setup_mut("initialize")?;
        setup.store.lock();
        setup.scheme.initialize(channel, &mut setup.store)
    }

    fn initialize_data(&mut self) -> Result<(), EngineError> {
        self.check_not_finalized("initialize_data")?;
        let setup = self.setup_mut("initialize_data")?;
        setup.scheme.initialize_data(&mut setup.store)
    }

    fn is_action_required(&self, action: Action) -> bool {
        self.setup
            .as_ref()
            .is_some_and(|s| s.scheme.is_action_required(action))
    }

    fn fulfilled_action(&mut self, action: Action) -> Result<(), EngineError> {
        self.setup_mut("fulfilled_action")?
            .scheme
            .fulfilled_action(action)
    }

    fn is_coupling_ongoing(&self) -> bool {
        self.setup
            .as_ref()
            .is_some_and(|s| !s.scheme.is_finalized() && s.scheme.is_ongoing())
    }

    fn is_read_data_available(&self) -> bool {
        self.setup
            .as_ref()
            .is_some_and(|s| s.scheme.is_read_data_available())
    }

    fn is_write_data_required(&self, dt: f64) -> bool {
        self.setup
            .as_ref()
            .is_some_and(|s| s.scheme.is_write_data_required(dt))
    }

    fn is_time_window_complete(&self) -> bool {
        self.setup
            .as_ref()
            .is_some_and(|s| s.scheme.is_time_window_complete())
    }

    fn write_block_vector_data(
        &mut self,
        data: DataId,
        vertices: &[VertexId],
        values: &[f64],
    ) -> Result<(), EngineError> {
        const OP: &str = "write_block_vector_data";
        self.check_not_finalized(OP)?;
        self.setup_mut(OP)?
            .store
            .write(OP, data, DataKind::Vector, vertices, values)
    }

    fn read_block_vector_data(
        &self,
        data: DataId,
        vertices: &[VertexId],
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        const OP: &str = "read_block_vector_data";
        self.check_not_finalized(OP)?
            .store
            .read(OP, data, DataKind::Vector, vertices, out)
    }

    fn write_block_scalar_data(
        &mut self,
        data: DataId,
        vertices: &[VertexId],
        values: &[f64],
    ) -> Result<(), EngineError> {
        const OP: &str = "write_block_scalar_data";
        self.check_not_finalized(OP)?;
        self.setup_mut(OP)?
            .store
            .write(OP, data, DataKind::Scalar, vertices, values)
    }

    fn read_block_scalar_data(
        &self,
        data: DataId,
        vertices: &[VertexId],
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        const OP: &str = "read_block_scalar_data";
        self.check_not_finalized(OP)?
            .store
            .read(OP, data, DataKind::Scalar, vertices, out)
    }

    fn advance(&mut self, dt: f64) -> Result<f64, EngineError> {
        let setup = self.setup_mut("advance")?;
        setup.scheme.advance(&mut setup.store, dt)
    }

    fn finalize(&mut self) -> Result<(), EngineError> {
        self.setup_mut("finalize")?.scheme.finalize()
    }
}
