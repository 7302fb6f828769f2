//! Test utilities for Weft development.
//!
//! Provides [`ScriptedEngine`], an in-memory [`CouplingEngine`] with no
//! peer: its coupling behavior (number of windows, initial data,
//! implicit iterations) is set up front with builder methods, and every
//! state-changing call is recorded in a [`Call`] log that tests inspect
//! for ordering.
//!
//! [`CouplingEngine`]: weft_core::CouplingEngine

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod scripted;

pub use scripted::{Call, CallLog, ScriptedEngine};
