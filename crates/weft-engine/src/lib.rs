//! Reference coupling engine for Weft participants.
//!
//! [`LocalEngine`] implements [`weft_core::CouplingEngine`] for one
//! participant of a two-participant coupling scheme described by a TOML
//! file ([`CouplingConfig`]). It supports serial and parallel schemes,
//! explicit and implicit, with sub-cycling inside a time window, initial
//! data exchange, and iteration checkpoints. Peers are reached over
//! in-process channels or TCP (see [`weft_transport`]).
//!
//! Mesh mapping is not performed: both participants must register their
//! coupled vertices in the same order.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod local;
pub(crate) mod mesh;
pub mod metrics;
pub(crate) mod scheme;

pub use config::{ConfigError, CouplingConfig, SchemeKind, TransportKind};
pub use local::LocalEngine;
pub use metrics::CouplingMetrics;
