//! Participant roles read from the coupling configuration.
//!
//! Only the `[[data]]` and `[[participant]]` tables are read; the rest of
//! the file belongs to the engine.
//!
//! ```toml
//! [[data]]
//! name = "Forces"            # kind defaults to "vector"
//!
//! [[participant]]
//! name = "SolverOne"
//! mesh = "MeshOne"
//! writes = ["Forces"]
//! reads = ["Velocities"]
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use weft_core::DataKind;

use crate::error::DriverError;

#[derive(Deserialize)]
struct RoleFile {
    #[serde(default)]
    data: Vec<DataEntry>,
    #[serde(default)]
    participant: Vec<ParticipantEntry>,
}

#[derive(Deserialize)]
struct DataEntry {
    name: String,
    #[serde(default)]
    kind: KindEntry,
}

#[derive(Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum KindEntry {
    Scalar,
    #[default]
    Vector,
}

#[derive(Deserialize)]
struct ParticipantEntry {
    name: String,
    mesh: String,
    #[serde(default)]
    writes: Vec<String>,
    #[serde(default)]
    reads: Vec<String>,
}

/// A data field a participant writes or reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    /// Data name.
    pub name: String,
    /// Scalar or vector.
    pub kind: DataKind,
}

/// What one participant does in the coupled run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Role {
    /// Participant name.
    pub name: String,
    /// The mesh the participant provides.
    pub mesh: String,
    /// Fields the participant produces.
    pub writes: Vec<FieldSpec>,
    /// Fields the participant consumes.
    pub reads: Vec<FieldSpec>,
}

/// Participant name to [`Role`], in declaration order.
#[derive(Clone, Debug, Default)]
pub struct RoleTable {
    roles: IndexMap<String, Role>,
}

impl RoleTable {
    /// Read the roles from a configuration file.
    pub fn from_path(path: &Path) -> Result<Self, DriverError> {
        let text = fs::read_to_string(path).map_err(|e| DriverError::Config {
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::from_toml_str(&text)
    }

    /// Read the roles from configuration text.
    pub fn from_toml_str(text: &str) -> Result<Self, DriverError> {
        let file: RoleFile = toml::from_str(text).map_err(|e| DriverError::Config {
            reason: e.to_string(),
        })?;
        let kinds: HashMap<&str, DataKind> = file
            .data
            .iter()
            .map(|d| {
                let kind = match d.kind {
                    KindEntry::Scalar => DataKind::Scalar,
                    KindEntry::Vector => DataKind::Vector,
                };
                (d.name.as_str(), kind)
            })
            .collect();
        let spec = |participant: &str, name: &String| -> Result<FieldSpec, DriverError> {
            let kind = kinds.get(name.as_str()).ok_or_else(|| DriverError::Config {
                reason: format!("participant '{participant}' uses undeclared data '{name}'"),
            })?;
            Ok(FieldSpec {
                name: name.clone(),
                kind: *kind,
            })
        };

        let mut roles = IndexMap::new();
        for p in &file.participant {
            let role = Role {
                name: p.name.clone(),
                mesh: p.mesh.clone(),
                writes: p
                    .writes
                    .iter()
                    .map(|n| spec(&p.name, n))
                    .collect::<Result<_, _>>()?,
                reads: p
                    .reads
                    .iter()
                    .map(|n| spec(&p.name, n))
                    .collect::<Result<_, _>>()?,
            };
            if roles.insert(p.name.clone(), role).is_some() {
                return Err(DriverError::Config {
                    reason: format!("participant '{}' is declared twice", p.name),
                });
            }
        }
        Ok(Self { roles })
    }

    /// The role of `name`.
    pub fn role(&self, name: &str) -> Result<&Role, DriverError> {
        self.roles
            .get(name)
            .ok_or_else(|| DriverError::UnknownParticipant {
                name: name.to_string(),
            })
    }

    /// Declared participant names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    /// Number of declared participants.
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Whether no participant is declared.
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
