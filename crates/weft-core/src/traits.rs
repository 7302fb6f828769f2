//! The engine handle boundary.

use std::path::Path;

use crate::action::Action;
use crate::error::EngineError;
use crate::id::{DataId, MeshId, VertexId};

/// The operations a participant consumes from a coupling engine.
///
/// Implementations own the coupling state; participants see it only
/// through action queries and the results of `initialize` and `advance`.
/// An engine is driven by a single thread of control: every method takes
/// `&self` or `&mut self` on one handle and none may be called
/// concurrently for the same participant. `initialize`,
/// `initialize_data`, `advance`, and `finalize` may block until peer
/// participants reach the matching call.
///
/// Value buffers passed to the block read/write methods are laid out
/// vertex-major: the values of `vertices[i]` occupy
/// `values[i * width .. (i + 1) * width]`.
pub trait CouplingEngine: Send {
    /// Read the configuration file and set up the participant.
    fn configure(&mut self, config_path: &Path) -> Result<(), EngineError>;

    /// Spatial dimension of the coupled problem (2 or 3).
    fn dimensions(&self) -> usize;

    /// Resolve a mesh used by this participant.
    fn mesh_id(&self, name: &str) -> Result<MeshId, EngineError>;

    /// Resolve a data field defined on `mesh`.
    fn data_id(&self, name: &str, mesh: MeshId) -> Result<DataId, EngineError>;

    /// Append vertices to a mesh.
    ///
    /// `positions` holds `dimensions()` coordinates per vertex. Returns the
    /// engine-assigned index of each new vertex, in input order.
    fn set_mesh_vertices(
        &mut self,
        mesh: MeshId,
        positions: &[f64],
    ) -> Result<Vec<VertexId>, EngineError>;

    /// Number of vertices currently registered on a mesh.
    fn mesh_vertex_count(&self, mesh: MeshId) -> Result<usize, EngineError>;

    /// Copy the coordinates of `vertices` into `out`.
    fn mesh_vertices(
        &self,
        mesh: MeshId,
        vertices: &[VertexId],
        out: &mut [f64],
    ) -> Result<(), EngineError>;

    /// Connect to peers and set up the coupling state.
    ///
    /// Returns the maximum admissible length of the first time step.
    fn initialize(&mut self) -> Result<f64, EngineError>;

    /// Exchange initial data values.
    fn initialize_data(&mut self) -> Result<(), EngineError>;

    /// Whether the engine currently requires `action`.
    fn is_action_required(&self, action: Action) -> bool;

    /// Acknowledge that a required action was performed.
    fn fulfilled_action(&mut self, action: Action) -> Result<(), EngineError>;

    /// Whether the coupled run has further time steps.
    fn is_coupling_ongoing(&self) -> bool;

    /// Whether the last `initialize`, `initialize_data`, or `advance`
    /// delivered new values for the data this participant reads.
    fn is_read_data_available(&self) -> bool;

    /// Whether advancing by `dt` will exchange data, so that written
    /// values must be current before the call.
    fn is_write_data_required(&self, dt: f64) -> bool;

    /// Whether the last `advance` completed a coupling time window.
    fn is_time_window_complete(&self) -> bool;

    /// Write vector values for the given vertices.
    fn write_block_vector_data(
        &mut self,
        data: DataId,
        vertices: &[VertexId],
        values: &[f64],
    ) -> Result<(), EngineError>;

    /// Read vector values for the given vertices into `out`.
    fn read_block_vector_data(
        &self,
        data: DataId,
        vertices: &[VertexId],
        out: &mut [f64],
    ) -> Result<(), EngineError>;

    /// Write one scalar per vertex.
    fn write_block_scalar_data(
        &mut self,
        data: DataId,
        vertices: &[VertexId],
        values: &[f64],
    ) -> Result<(), EngineError>;

    /// Read one scalar per vertex into `out`.
    fn read_block_scalar_data(
        &self,
        data: DataId,
        vertices: &[VertexId],
        out: &mut [f64],
    ) -> Result<(), EngineError>;

    /// Commit the step of length `dt`, exchange data if the time window is
    /// complete, and return the next admissible step length.
    fn advance(&mut self, dt: f64) -> Result<f64, EngineError>;

    /// Release engine resources and close connections to peers.
    fn finalize(&mut self) -> Result<(), EngineError>;
}
