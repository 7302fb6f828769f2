//! Strongly-typed identifiers and the [`Position`] type alias.

use smallvec::SmallVec;
use std::fmt;

/// Identifies a mesh registered with the coupling engine.
///
/// Mesh IDs are assigned by the engine at configuration time and stay
/// stable for the whole run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u32);

impl fmt::Display for MeshId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for MeshId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a data field attached to a mesh.
///
/// Resolved from a `(mesh, name)` pair; unique across all meshes of a
/// participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataId(pub u32);

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for DataId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Engine-assigned index of a vertex within one mesh.
///
/// Returned by `set_mesh_vertices` and used to address per-vertex data.
/// Indices are sequential in registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(pub u32);

impl VertexId {
    /// The vertex index as a `usize` offset.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for VertexId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// A vertex position.
///
/// Uses `SmallVec<[f64; 3]>` so that 2D and 3D coordinates never touch
/// the heap.
pub type Position = SmallVec<[f64; 3]>;
