//! Participant-side protocol driver for Weft coupling engines.
//!
//! A coupled simulation participant must call its coupling engine in a
//! fixed order: configure, register meshes and vertices, initialize,
//! optionally write initial data, initialize data, step until the engine
//! ends the run, finalize. [`Participant`] wraps any
//! [`CouplingEngine`](weft_core::CouplingEngine) and enforces that order
//! with the [`ProtocolState`] machine, turning misuse into
//! [`DriverError::ProtocolViolation`] before the engine is reached.
//!
//! On top of that, [`RoleTable`] maps participant names to the fields they
//! write and read, and [`Session`] runs any [`Solver`] through the whole
//! sequence, taking and restoring iteration checkpoints as the engine
//! requests.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod buffer;
pub mod error;
pub mod participant;
pub mod role;
pub mod session;
pub mod solver;
pub mod state;

pub use buffer::{FieldBuffer, FieldBuffers};
pub use error::DriverError;
pub use participant::{DataAccess, Participant};
pub use role::{FieldSpec, Role, RoleTable};
pub use session::{Session, SessionReport};
pub use solver::{PowerSolver, PowerState, Solver, SolverError};
pub use state::ProtocolState;
