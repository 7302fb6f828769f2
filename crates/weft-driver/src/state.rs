//! The participant lifecycle.

use std::fmt;

/// Where a [`Participant`](crate::Participant) is in the coupling
/// protocol.
///
/// ```text
/// Unconfigured ─configure→ Configured ─register_mesh, set_vertices→ MeshReady
///   ─initialize→ Initialized ─[write + fulfilled_action(write-initial-data)]→
///   InitialDataWritten ─initialize_data→ Stepping ⟲ advance
///   ─is_coupling_ongoing() == false→ Done ─finalize→ Terminated
/// ```
///
/// When no initial data is required, `Initialized` moves to `Stepping` on
/// `initialize_data` or on the first stepping-loop call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProtocolState {
    /// Created, no configuration read yet.
    Unconfigured,
    /// Configuration read; meshes may be registered.
    Configured,
    /// At least one mesh has vertices.
    MeshReady,
    /// `initialize` returned; initial data may be written.
    Initialized,
    /// Initial data written and acknowledged.
    InitialDataWritten,
    /// Inside the time-stepping loop.
    Stepping,
    /// The engine reported the end of the coupled run.
    Done,
    /// `finalize` was called.
    Terminated,
}

impl ProtocolState {
    /// Lower-case name used in log and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Configured => "configured",
            Self::MeshReady => "mesh-ready",
            Self::Initialized => "initialized",
            Self::InitialDataWritten => "initial-data-written",
            Self::Stepping => "stepping",
            Self::Done => "done",
            Self::Terminated => "terminated",
        }
    }

    /// Whether `initialize` has returned and `finalize` has not.
    pub fn is_coupled(self) -> bool {
        matches!(
            self,
            Self::Initialized | Self::InitialDataWritten | Self::Stepping | Self::Done
        )
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
