//! Weft: a coupling participant protocol driver for multi-physics
//! co-simulation.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Weft sub-crates. For most users, adding `weft` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! Run one side of a two-participant coupling; start the peer the same way
//! with its own name.
//!
//! ```rust,no_run
//! use std::path::Path;
//! use weft::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Path::new("coupling.toml");
//! let roles = RoleTable::from_path(config)?;
//! let role = roles.role("SolverOne")?.clone();
//!
//! let engine = LocalEngine::new(ParticipantInfo::serial("SolverOne")?);
//! let mut participant = Participant::new("SolverOne", engine);
//! let mut solver = PowerSolver::for_role(&role, 1, 0.0);
//! let positions = vec![Position::from_slice(&[0.0, 0.0, 0.0])];
//! let report = Session::new(role, config, positions).run(&mut participant, &mut solver)?;
//! println!("{} windows in {} advances", report.windows, report.advances);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `weft-core` | IDs, actions, the engine trait and error |
//! | [`transport`] | `weft-transport` | Wire codec, in-process and TCP channels |
//! | [`engine`] | `weft-engine` | Reference engine and its configuration |
//! | [`driver`] | `weft-driver` | Protocol-checking participant, roles, sessions |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`weft-core`).
///
/// Contains the [`types::Action`] enum, typed identifiers, and the
/// [`types::CouplingEngine`] trait every engine implements.
pub use weft_core as types;

/// Peer channels and the wire codec (`weft-transport`).
pub use weft_transport as transport;

/// The reference coupling engine (`weft-engine`).
///
/// [`engine::LocalEngine`] runs serial or parallel, explicit or implicit
/// schemes between two participants, configured by
/// [`engine::CouplingConfig`].
pub use weft_engine as engine;

/// Participant-side protocol enforcement (`weft-driver`).
///
/// [`driver::Participant`] checks call order, [`driver::RoleTable`] maps
/// participants to fields, [`driver::Session`] runs a [`driver::Solver`].
pub use weft_driver as driver;

/// Common imports for typical Weft usage.
///
/// ```rust
/// use weft::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use weft_core::{
        Action, CouplingEngine, DataId, DataKind, EngineError, MeshId, ParticipantInfo, Position,
        VertexId,
    };

    // Engine
    pub use weft_engine::{CouplingConfig, CouplingMetrics, LocalEngine};

    // Driver
    pub use weft_driver::{
        DataAccess, DriverError, FieldBuffer, FieldBuffers, Participant, PowerSolver,
        ProtocolState, Role, RoleTable, Session, SessionReport, Solver, SolverError,
    };
}
