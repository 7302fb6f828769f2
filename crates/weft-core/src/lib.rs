//! Core types and traits for the Weft coupling framework.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by every participant-side component: typed
//! identifiers, the closed set of engine-issued actions, participant
//! identity, the engine error type, and the [`CouplingEngine`] trait that
//! forms the boundary between a solver and the coupling engine.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod action;
pub mod data;
pub mod error;
pub mod id;
pub mod participant;
pub mod traits;

pub use action::{Action, ActionSet, ParseActionError};
pub use data::DataKind;
pub use error::EngineError;
pub use id::{DataId, MeshId, Position, VertexId};
pub use participant::ParticipantInfo;
pub use traits::CouplingEngine;
