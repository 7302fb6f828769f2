//! Mesh vertices and data values held by one participant.

use indexmap::IndexMap;
use weft_core::{DataId, DataKind, EngineError, MeshId, VertexId};

/// How the local participant may touch a data field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Access {
    Write,
    Read,
    /// Carried by the mesh but neither written nor read here.
    None,
}

#[derive(Debug)]
struct Mesh {
    positions: Vec<f64>,
}

/// A data field on one of the local meshes.
#[derive(Debug)]
pub(crate) struct Field {
    pub(crate) name: String,
    pub(crate) mesh: MeshId,
    pub(crate) kind: DataKind,
    pub(crate) access: Access,
    pub(crate) values: Vec<f64>,
}

/// Vertices and values of the local meshes.
///
/// Vertices can be added until [`lock`](MeshStore::lock); values exist
/// only afterwards.
#[derive(Debug)]
pub(crate) struct MeshStore {
    dimensions: usize,
    meshes: IndexMap<String, Mesh>,
    fields: Vec<Field>,
    locked: bool,
}

impl MeshStore {
    pub(crate) fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            meshes: IndexMap::new(),
            fields: Vec::new(),
            locked: false,
        }
    }

    pub(crate) fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub(crate) fn add_mesh(&mut self, name: &str) -> MeshId {
        let (index, _) = self.meshes.insert_full(
            name.to_string(),
            Mesh {
                positions: Vec::new(),
            },
        );
        MeshId(index as u32)
    }

    pub(crate) fn add_field(
        &mut self,
        name: &str,
        mesh: MeshId,
        kind: DataKind,
        access: Access,
    ) -> DataId {
        self.fields.push(Field {
            name: name.to_string(),
            mesh,
            kind,
            access,
            values: Vec::new(),
        });
        DataId((self.fields.len() - 1) as u32)
    }

    pub(crate) fn mesh_id(&self, name: &str) -> Result<MeshId, EngineError> {
        self.meshes
            .get_index_of(name)
            .map(|i| MeshId(i as u32))
            .ok_or_else(|| EngineError::UnknownMesh {
                name: name.to_string(),
            })
    }

    pub(crate) fn mesh_name(&self, mesh: MeshId) -> Result<&str, EngineError> {
        self.meshes
            .get_index(mesh.0 as usize)
            .map(|(name, _)| name.as_str())
            .ok_or(EngineError::InvalidMeshId(mesh))
    }

    pub(crate) fn data_id(&self, name: &str, mesh: MeshId) -> Result<DataId, EngineError> {
        self.mesh(mesh)?;
        self.fields
            .iter()
            .position(|f| f.name == name && f.mesh == mesh)
            .map(|i| DataId(i as u32))
            .ok_or_else(|| EngineError::UnknownData {
                name: name.to_string(),
                mesh,
            })
    }

    /// The field called `name`, on whichever local mesh carries it.
    pub(crate) fn field_by_name(&self, name: &str) -> Option<DataId> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .map(|i| DataId(i as u32))
    }

    pub(crate) fn field(&self, data: DataId) -> Result<&Field, EngineError> {
        self.fields
            .get(data.0 as usize)
            .ok_or(EngineError::InvalidDataId(data))
    }

    fn mesh(&self, mesh: MeshId) -> Result<&Mesh, EngineError> {
        self.meshes
            .get_index(mesh.0 as usize)
            .map(|(_, m)| m)
            .ok_or(EngineError::InvalidMeshId(mesh))
    }

    pub(crate) fn vertex_count(&self, mesh: MeshId) -> Result<usize, EngineError> {
        Ok(self.mesh(mesh)?.positions.len() / self.dimensions)
    }

    pub(crate) fn set_vertices(
        &mut self,
        mesh: MeshId,
        positions: &[f64],
    ) -> Result<Vec<VertexId>, EngineError> {
        if self.locked {
            return Err(EngineError::protocol(
                "set_mesh_vertices",
                "meshes are locked once initialize() has been called",
            ));
        }
        let dims = self.dimensions;
        let name = self.mesh_name(mesh)?.to_string();
        if positions.len() % dims != 0 {
            return Err(EngineError::DimensionMismatch {
                name,
                expected: dims,
                actual: positions.len() % dims,
            });
        }
        let first = self.vertex_count(mesh)?;
        let added = positions.len() / dims;
        let last = first + added;
        if u32::try_from(last).is_err() {
            return Err(EngineError::Config {
                reason: format!("mesh '{name}' would exceed u32::MAX vertices"),
            });
        }
        if let Some((_, m)) = self.meshes.get_index_mut(mesh.0 as usize) {
            m.positions.extend_from_slice(positions);
        }
        tracing::debug!(mesh = %name, added, total = last, "vertices registered");
        Ok((first..last).map(|i| VertexId(i as u32)).collect())
    }

    pub(crate) fn positions(
        &self,
        mesh: MeshId,
        vertices: &[VertexId],
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        let dims = self.dimensions;
        let m = self.mesh(mesh)?;
        let count = m.positions.len() / dims;
        check_len(vertices.len() * dims, out.len())?;
        check_vertices(vertices, count)?;
        for (chunk, v) in out.chunks_exact_mut(dims).zip(vertices) {
            let at = v.index() * dims;
            chunk.copy_from_slice(&m.positions[at..at + dims]);
        }
        Ok(())
    }

    /// Freeze the meshes and allocate zeroed values for every field.
    pub(crate) fn lock(&mut self) {
        self.locked = true;
        let dims = self.dimensions;
        for field in &mut self.fields {
            let count = self
                .meshes
                .get_index(field.mesh.0 as usize)
                .map_or(0, |(_, m)| m.positions.len() / dims);
            field.values = vec![0.0; count * field.kind.width(dims)];
        }
    }

    /// Copy caller values into a field the participant writes.
    ///
    /// Every check runs before the first value is stored.
    pub(crate) fn write(
        &mut self,
        operation: &'static str,
        data: DataId,
        kind: DataKind,
        vertices: &[VertexId],
        values: &[f64],
    ) -> Result<(), EngineError> {
        let width = self.check_access(operation, data, kind, Access::Write)?;
        check_len(vertices.len() * width, values.len())?;
        let field = &mut self.fields[data.0 as usize];
        check_vertices(vertices, field.values.len() / width)?;
        for (chunk, v) in values.chunks_exact(width).zip(vertices) {
            let at = v.index() * width;
            field.values[at..at + width].copy_from_slice(chunk);
        }
        Ok(())
    }

    /// Copy values of a field the participant reads into `out`.
    pub(crate) fn read(
        &self,
        operation: &'static str,
        data: DataId,
        kind: DataKind,
        vertices: &[VertexId],
        out: &mut [f64],
    ) -> Result<(), EngineError> {
        let width = self.check_access(operation, data, kind, Access::Read)?;
        check_len(vertices.len() * width, out.len())?;
        let field = &self.fields[data.0 as usize];
        check_vertices(vertices, field.values.len() / width)?;
        for (chunk, v) in out.chunks_exact_mut(width).zip(vertices) {
            let at = v.index() * width;
            chunk.copy_from_slice(&field.values[at..at + width]);
        }
        Ok(())
    }

    fn check_access(
        &self,
        operation: &'static str,
        data: DataId,
        kind: DataKind,
        access: Access,
    ) -> Result<usize, EngineError> {
        if !self.locked {
            return Err(EngineError::protocol(
                operation,
                "data values exist only after initialize()",
            ));
        }
        let field = self.field(data)?;
        if field.access != access {
            return Err(EngineError::AccessDenied {
                data: field.name.clone(),
                access: match access {
                    Access::Write => "write",
                    _ => "read",
                },
            });
        }
        let width = field.kind.width(self.dimensions);
        if field.kind != kind {
            return Err(EngineError::DimensionMismatch {
                name: field.name.clone(),
                expected: width,
                actual: kind.width(self.dimensions),
            });
        }
        Ok(width)
    }

    pub(crate) fn values(&self, data: DataId) -> &[f64] {
        self.fields
            .get(data.0 as usize)
            .map(|f| f.values.as_slice())
            .unwrap_or(&[])
    }

    /// Replace a field's values with data received from the peer.
    pub(crate) fn replace_values(
        &mut self,
        data: DataId,
        values: Vec<f64>,
    ) -> Result<(), EngineError> {
        let field = self
            .fields
            .get_mut(data.0 as usize)
            .ok_or(EngineError::InvalidDataId(data))?;
        if field.values.len() != values.len() {
            return Err(EngineError::MeshMismatch {
                data: field.name.clone(),
                local: field.values.len(),
                remote: values.len(),
            });
        }
        field.values = values;
        Ok(())
    }
}

fn check_len(expected: usize, actual: usize) -> Result<(), EngineError> {
    if expected == actual {
        Ok(())
    } else {
        Err(EngineError::BufferSize { expected, actual })
    }
}

fn check_vertices(vertices: &[VertexId], vertex_count: usize) -> Result<(), EngineError> {
    match vertices.iter().find(|v| v.index() >= vertex_count) {
        Some(&vertex) => Err(EngineError::InvalidVertex {
            vertex,
            vertex_count,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn store() -> (MeshStore, MeshId, DataId, DataId) {
        let mut s = MeshStore::new(2);
        let mesh = s.add_mesh("MeshOne");
        let forces = s.add_field("Forces", mesh, DataKind::Vector, Access::Write);
        let pressure = s.add_field("Pressure", mesh, DataKind::Scalar, Access::Read);
        (s, mesh, forces, pressure)
    }

    #[test]
    fn vertices_get_sequential_ids() {
        let (mut s, mesh, _, _) = store();
        let a = s.set_vertices(mesh, &[0.0, 0.0, 1.0, 0.0]).unwrap();
        let b = s.set_vertices(mesh, &[2.0, 0.0]).unwrap();
        assert_eq!(a, vec![VertexId(0), VertexId(1)]);
        assert_eq!(b, vec![VertexId(2)]);
        assert_eq!(s.vertex_count(mesh).unwrap(), 3);

        let mut out = [0.0; 2];
        s.positions(mesh, &[VertexId(1)], &mut out).unwrap();
        assert_eq!(out, [1.0, 0.0]);
    }

    #[test]
    fn ragged_positions_rejected() {
        let (mut s, mesh, _, _) = store();
        assert!(matches!(
            s.set_vertices(mesh, &[0.0, 1.0, 2.0]),
            Err(EngineError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn mesh_locks_at_lock() {
        let (mut s, mesh, _, _) = store();
        s.set_vertices(mesh, &[0.0, 0.0]).unwrap();
        s.lock();
        let err = s.set_vertices(mesh, &[1.0, 1.0]).unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn write_before_lock_is_protocol_error() {
        let (mut s, mesh, forces, _) = store();
        let ids = s.set_vertices(mesh, &[0.0, 0.0]).unwrap();
        let err = s
            .write("write_block_vector_data", forces, DataKind::Vector, &ids, &[1.0, 2.0])
            .unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn write_checks_everything_before_storing() {
        let (mut s, mesh, forces, _) = store();
        let ids = s.set_vertices(mesh, &[0.0, 0.0, 1.0, 1.0]).unwrap();
        s.lock();
        let w = "write_block_vector_data";

        assert_eq!(
            s.write(w, forces, DataKind::Vector, &ids, &[1.0; 3]),
            Err(EngineError::BufferSize {
                expected: 4,
                actual: 3
            })
        );
        assert!(matches!(
            s.write(w, forces, DataKind::Vector, &[VertexId(0), VertexId(9)], &[1.0; 4]),
            Err(EngineError::InvalidVertex { .. })
        ));
        assert!(matches!(
            s.write(w, forces, DataKind::Scalar, &ids, &[1.0; 2]),
            Err(EngineError::DimensionMismatch { .. })
        ));
        assert_eq!(s.values(forces), &[0.0; 4]);

        s.write(w, forces, DataKind::Vector, &[VertexId(1)], &[5.0, 6.0])
            .unwrap();
        assert_eq!(s.values(forces), &[0.0, 0.0, 5.0, 6.0]);
    }

    #[test]
    fn access_is_enforced() {
        let (mut s, mesh, forces, pressure) = store();
        let ids = s.set_vertices(mesh, &[0.0, 0.0]).unwrap();
        s.lock();
        let mut out = [0.0; 2];
        assert!(matches!(
            s.read("read_block_vector_data", forces, DataKind::Vector, &ids, &mut out),
            Err(EngineError::AccessDenied { access: "read", .. })
        ));
        assert!(matches!(
            s.write("write_block_scalar_data", pressure, DataKind::Scalar, &ids, &[1.0]),
            Err(EngineError::AccessDenied { access: "write", .. })
        ));
    }

    #[test]
    fn received_values_must_match_length() {
        let (mut s, mesh, _, pressure) = store();
        let ids = s.set_vertices(mesh, &[0.0, 0.0, 1.0, 1.0]).unwrap();
        s.lock();
        assert!(matches!(
            s.replace_values(pressure, vec![1.0]),
            Err(EngineError::MeshMismatch { local: 2, remote: 1, .. })
        ));
        s.replace_values(pressure, vec![3.0, 4.0]).unwrap();
        let mut out = [0.0; 2];
        s.read("read_block_scalar_data", pressure, DataKind::Scalar, &ids, &mut out)
            .unwrap();
        assert_eq!(out, [3.0, 4.0]);
    }

    #[test]
    fn lookups_report_unknown_names() {
        let (s, mesh, _, _) = store();
        assert_eq!(s.mesh_id("MeshOne").unwrap(), mesh);
        assert!(matches!(
            s.mesh_id("MeshTwo"),
            Err(EngineError::UnknownMesh { .. })
        ));
        assert!(matches!(
            s.data_id("Velocities", mesh),
            Err(EngineError::UnknownData { .. })
        ));
        assert!(matches!(
            s.data_id("Forces", MeshId(7)),
            Err(EngineError::InvalidMeshId(MeshId(7)))
        ));
        assert_eq!(s.field_by_name("Pressure"), Some(DataId(1)));
    }

    fn locked(vertices: usize) -> (MeshStore, DataId, DataId) {
        let (mut s, mesh, forces, pressure) = store();
        s.set_vertices(mesh, &vec![0.0; vertices * 2]).unwrap();
        s.lock();
        (s, forces, pressure)
    }

    proptest! {
        #[test]
        fn write_stores_only_when_every_vertex_is_in_range(
            indices in prop::collection::vec(0u32..8, 1..6),
        ) {
            let (mut s, forces, _) = locked(4);
            let ids: Vec<VertexId> = indices.iter().copied().map(VertexId).collect();
            let values: Vec<f64> = (0..ids.len() * 2).map(|i| i as f64 + 1.0).collect();
            let result = s.write("write_block_vector_data", forces, DataKind::Vector, &ids, &values);
            if indices.iter().any(|i| *i >= 4) {
                let out_of_range = matches!(result, Err(EngineError::InvalidVertex { vertex_count: 4, .. }));
                prop_assert!(out_of_range);
                prop_assert!(s.values(forces).iter().all(|v| *v == 0.0));
            } else {
                prop_assert!(result.is_ok());
                let last = ids.len() - 1;
                let at = ids[last].index() * 2;
                prop_assert_eq!(&s.values(forces)[at..at + 2], &values[last * 2..]);
            }
        }

        #[test]
        fn read_rejects_any_other_length(count in 1usize..=4, len in 0usize..12) {
            prop_assume!(len != count);
            let (s, _, pressure) = locked(4);
            let ids: Vec<VertexId> = (0..count as u32).map(VertexId).collect();
            let mut out = vec![0.0; len];
            prop_assert_eq!(
                s.read("read_block_scalar_data", pressure, DataKind::Scalar, &ids, &mut out),
                Err(EngineError::BufferSize { expected: count, actual: len })
            );
        }
    }
}
